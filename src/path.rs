//! Managed path handling.
//!
//! Paths travel on the wire as root-relative, `/`-separated strings. They are
//! only turned into filesystem paths at the edge, under a root that the path
//! may not escape.

use crate::error::{Result, SyncError};
use crate::manifest::ManagedFileRef;
use std::path::{Component, Path, PathBuf};

/// Normalize a root-relative managed path.
///
/// Backslashes become `/`, `.` and empty components are dropped. Absolute
/// paths, drive prefixes and `..` are rejected.
pub fn normalize_managed_path(raw: &str) -> Result<String> {
    let unified = raw.replace('\\', "/");

    if unified.starts_with('/') {
        return Err(SyncError::InvalidPath(format!(
            "absolute paths not allowed: {}",
            raw
        )));
    }

    let mut parts: Vec<&str> = Vec::new();
    for part in unified.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                return Err(SyncError::InvalidPath(format!(
                    "path traversal not allowed: {}",
                    raw
                )))
            }
            p if p.contains(':') => {
                return Err(SyncError::InvalidPath(format!(
                    "drive prefixes not allowed: {}",
                    raw
                )))
            }
            p => parts.push(p),
        }
    }

    if parts.is_empty() {
        return Err(SyncError::InvalidPath(format!("empty path: {:?}", raw)));
    }

    Ok(parts.join("/"))
}

/// Key used for manifest lookups. Case-folded so that `Mods/Foo.jar` and
/// `mods/foo.jar` name the same file on case-insensitive filesystems.
pub fn manifest_key(normalized: &str) -> String {
    normalized.to_lowercase()
}

/// Join a managed path onto `root`, refusing anything that would land outside.
pub fn resolve_under(root: &Path, relative: &str) -> Result<PathBuf> {
    let normalized = normalize_managed_path(relative)?;
    let full = root.join(&normalized);

    if !lexical_normalize(&full).starts_with(lexical_normalize(root)) {
        return Err(SyncError::InvalidPath(format!(
            "path escapes root directory: {}",
            relative
        )));
    }

    Ok(full)
}

/// Normalize a path without requiring it to exist (unlike canonicalize)
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir => {}
            c => normalized.push(c),
        }
    }
    normalized
}

/// Maps a managed file onto the local filesystem.
pub trait PathResolver: Send + Sync {
    fn resolve(&self, target: &ManagedFileRef) -> Result<PathBuf>;
}

/// Resolves managed files relative to a fixed local root directory.
#[derive(Debug, Clone)]
pub struct RootResolver {
    root: PathBuf,
}

impl RootResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl PathResolver for RootResolver {
    fn resolve(&self, target: &ManagedFileRef) -> Result<PathBuf> {
        resolve_under(&self.root, target.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_separators() {
        assert_eq!(
            normalize_managed_path("mods\\sub\\foo.jar").unwrap(),
            "mods/sub/foo.jar"
        );
        assert_eq!(
            normalize_managed_path("./config//a.cfg").unwrap(),
            "config/a.cfg"
        );
    }

    #[test]
    fn test_normalize_rejects_escapes() {
        assert!(normalize_managed_path("../etc/passwd").is_err());
        assert!(normalize_managed_path("mods/../../x").is_err());
        assert!(normalize_managed_path("/abs/path").is_err());
        assert!(normalize_managed_path("C:\\Windows").is_err());
        assert!(normalize_managed_path("").is_err());
        assert!(normalize_managed_path("./").is_err());
    }

    #[test]
    fn test_manifest_key_case_folds() {
        assert_eq!(manifest_key("Mods/Foo.JAR"), "mods/foo.jar");
    }

    #[test]
    fn test_root_resolver() {
        let resolver = RootResolver::new("/srv/game");
        let target = ManagedFileRef::new("mods/foo.jar").unwrap();
        assert_eq!(
            resolver.resolve(&target).unwrap(),
            PathBuf::from("/srv/game/mods/foo.jar")
        );
    }
}
