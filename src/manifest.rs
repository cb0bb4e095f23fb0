//! Manifest model: the server's authoritative view of the files it manages.
//!
//! A [`FileManifest`] is a snapshot. It is fetched wholesale, never patched,
//! and the client's copy shares nothing with the server's.

use crate::error::{Result, SyncError};
use crate::path::{manifest_key, normalize_managed_path, resolve_under};
use std::collections::btree_map::{self, BTreeMap};
use std::collections::BTreeSet;
use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

/// One file the server manages, named by its root-relative path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ManagedFileRef {
    path: String,
}

impl ManagedFileRef {
    pub fn new(path: &str) -> Result<Self> {
        Ok(Self {
            path: normalize_managed_path(path)?,
        })
    }

    /// Normalized, `/`-separated path relative to the sync root.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The managed directory this file belongs to (its first component).
    /// Files directly under the root have none.
    pub fn directory(&self) -> Option<&str> {
        self.path.split_once('/').map(|(dir, _)| dir)
    }

    pub fn resolve(&self, root: &Path) -> Result<PathBuf> {
        resolve_under(root, &self.path)
    }

    pub(crate) fn key(&self) -> String {
        manifest_key(&self.path)
    }
}

impl fmt::Display for ManagedFileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// Size and content identity of a managed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub size: u64,
    /// Hex-encoded BLAKE3 of the file content
    pub hash: String,
}

impl FileMetadata {
    /// Hash a local file. Runs on the blocking pool.
    pub async fn from_file(path: &Path) -> io::Result<Self> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::from_file_blocking(&path))
            .await
            .map_err(io::Error::other)?
    }

    pub fn from_file_blocking(path: &Path) -> io::Result<Self> {
        let mut file = File::open(path)?;
        let mut hasher = blake3::Hasher::new();
        let size = io::copy(&mut file, &mut hasher)?;
        Ok(Self {
            size,
            hash: hex::encode(hasher.finalize().as_bytes()),
        })
    }

    pub fn from_bytes(data: &[u8]) -> Self {
        Self {
            size: data.len() as u64,
            hash: hex::encode(blake3::hash(data).as_bytes()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub target: ManagedFileRef,
    pub metadata: FileMetadata,
}

/// Files known to the server at the moment of the request, keyed by
/// case-folded path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileManifest {
    entries: BTreeMap<String, ManifestEntry>,
}

impl FileManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file. Two paths that differ only in case collide.
    pub fn insert(&mut self, target: ManagedFileRef, metadata: FileMetadata) -> Result<()> {
        match self.entries.entry(target.key()) {
            btree_map::Entry::Occupied(_) => Err(SyncError::DuplicatePath(target.path)),
            btree_map::Entry::Vacant(slot) => {
                slot.insert(ManifestEntry { target, metadata });
                Ok(())
            }
        }
    }

    pub fn get(&self, path: &str) -> Option<&ManifestEntry> {
        let normalized = normalize_managed_path(path).ok()?;
        self.entries.get(&manifest_key(&normalized))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.values()
    }

    /// Distinct managed directories that hold at least one file.
    pub fn directories(&self) -> Vec<String> {
        self.entries
            .values()
            .filter_map(|e| e.target.directory())
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn meta(size: u64, hash: &str) -> FileMetadata {
        FileMetadata {
            size,
            hash: hash.to_string(),
        }
    }

    #[test]
    fn test_managed_file_ref_directory() {
        let target = ManagedFileRef::new("mods/sub/foo.jar").unwrap();
        assert_eq!(target.directory(), Some("mods"));
        assert_eq!(ManagedFileRef::new("root.txt").unwrap().directory(), None);
    }

    #[test]
    fn test_insert_and_lookup_case_insensitive() {
        let mut manifest = FileManifest::new();
        manifest
            .insert(ManagedFileRef::new("Mods/Foo.jar").unwrap(), meta(1024, "abc"))
            .unwrap();

        assert!(manifest.contains("mods/foo.jar"));
        assert!(manifest.contains("MODS\\FOO.JAR"));
        let entry = manifest.get("mods/foo.jar").unwrap();
        // Original casing is kept for resolving the local file
        assert_eq!(entry.target.path(), "Mods/Foo.jar");
        assert_eq!(entry.metadata.size, 1024);
    }

    #[test]
    fn test_duplicate_path_rejected() {
        let mut manifest = FileManifest::new();
        manifest
            .insert(ManagedFileRef::new("mods/a.jar").unwrap(), meta(1, "x"))
            .unwrap();
        let err = manifest
            .insert(ManagedFileRef::new("MODS/A.jar").unwrap(), meta(2, "y"))
            .unwrap_err();
        assert!(matches!(err, SyncError::DuplicatePath(p) if p == "MODS/A.jar"));
        assert_eq!(manifest.len(), 1);
    }

    #[test]
    fn test_directories() {
        let mut manifest = FileManifest::new();
        for p in ["mods/a.jar", "config/a.cfg", "mods/b.jar", "readme.txt"] {
            manifest
                .insert(ManagedFileRef::new(p).unwrap(), meta(0, ""))
                .unwrap();
        }
        assert_eq!(manifest.directories(), vec!["config", "mods"]);
    }

    #[tokio::test]
    async fn test_metadata_from_file() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("data.bin");
        std::fs::write(&file, b"hello world").unwrap();

        let from_disk = FileMetadata::from_file(&file).await.unwrap();
        assert_eq!(from_disk, FileMetadata::from_bytes(b"hello world"));
        assert_eq!(from_disk.size, 11);
        assert_eq!(from_disk.hash.len(), 64);
    }
}
