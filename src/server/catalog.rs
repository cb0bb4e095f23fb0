//! The server's managed file set.

use crate::error::{Result, SyncError};
use crate::manifest::{FileManifest, FileMetadata, ManagedFileRef};
use crate::path::normalize_managed_path;
use std::path::{Component, Path, PathBuf};

/// Snapshot of the managed directories under `root`, built once at startup.
#[derive(Debug, Clone)]
pub struct Catalog {
    root: PathBuf,
    directories: Vec<String>,
    manifest: FileManifest,
}

impl Catalog {
    pub fn new(root: impl Into<PathBuf>, directories: Vec<String>, manifest: FileManifest) -> Self {
        Self {
            root: root.into(),
            directories,
            manifest,
        }
    }

    /// Walk every managed directory and hash the files found.
    /// Runs on the blocking pool.
    pub async fn scan(root: &Path, directories: &[String]) -> Result<Self> {
        let root = root.to_path_buf();
        let directories = directories.to_vec();
        tokio::task::spawn_blocking(move || Self::scan_blocking(&root, &directories))
            .await
            .map_err(|e| SyncError::Config(format!("scan task failed: {}", e)))?
    }

    pub fn scan_blocking(root: &Path, directories: &[String]) -> Result<Self> {
        let mut manifest = FileManifest::new();
        let mut managed = Vec::with_capacity(directories.len());

        for dir in directories {
            let dir = normalize_managed_path(dir)?;
            let dir_path = root.join(&dir);
            managed.push(dir);

            if !dir_path.is_dir() {
                tracing::warn!("Managed directory {} does not exist", dir_path.display());
                continue;
            }

            let walker = ignore::WalkBuilder::new(&dir_path)
                .hidden(false)
                .ignore(false)
                .git_ignore(false)
                .git_global(false)
                .git_exclude(false)
                .parents(false)
                .follow_links(false)
                .build();

            for entry in walker {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        tracing::warn!("Skipping unreadable entry: {}", e);
                        continue;
                    }
                };
                if !entry.file_type().is_some_and(|t| t.is_file()) {
                    continue;
                }

                let Some(relative) = relative_wire_path(root, entry.path()) else {
                    tracing::warn!("Skipping non UTF-8 path {}", entry.path().display());
                    continue;
                };
                let target = ManagedFileRef::new(&relative)?;
                let metadata = FileMetadata::from_file_blocking(entry.path())
                    .map_err(|e| SyncError::local_io(entry.path(), e))?;

                if let Err(e) = manifest.insert(target, metadata) {
                    tracing::warn!("Skipping {}: {}", relative, e);
                }
            }
        }

        tracing::info!(
            "Managing {} files in {} directories",
            manifest.len(),
            managed.len()
        );
        Ok(Self::new(root, managed, manifest))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self) -> &FileManifest {
        &self.manifest
    }

    pub fn directories(&self) -> &[String] {
        &self.directories
    }

    /// File count as sent on the wire
    pub fn file_count(&self) -> i32 {
        i32::try_from(self.manifest.len()).unwrap_or(i32::MAX)
    }

    /// Local path of a managed file, or `None` if the server does not manage it.
    pub fn locate(&self, target: &ManagedFileRef) -> Option<PathBuf> {
        let entry = self.manifest.get(target.path())?;
        entry.target.resolve(&self.root).ok()
    }
}

/// `/`-joined path of `path` relative to `root`
fn relative_wire_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            _ => return None,
        }
    }
    Some(parts.join("/"))
}
