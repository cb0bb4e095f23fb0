//! Compare a fetched manifest against the local file set.

use crate::action::ActionEntry;
use crate::error::Result;
use crate::manifest::{FileManifest, FileMetadata, ManifestEntry};
use crate::path::PathResolver;
use std::io;

/// One action per manifest entry, in manifest order.
///
/// A file is up to date when it exists locally with the same size and
/// content hash. Everything else is scheduled for update.
pub async fn plan(manifest: &FileManifest, resolver: &dyn PathResolver) -> Result<Vec<ActionEntry>> {
    let mut actions = Vec::with_capacity(manifest.len());
    for entry in manifest.iter() {
        let action = if is_current(entry, resolver).await? {
            ActionEntry::ignore(entry.target.clone())
        } else {
            ActionEntry::update(entry.target.clone())
        };
        actions.push(action);
    }
    Ok(actions)
}

async fn is_current(entry: &ManifestEntry, resolver: &dyn PathResolver) -> Result<bool> {
    let local = resolver.resolve(&entry.target)?;

    // Size check first; hashing is only needed when sizes agree
    match tokio::fs::metadata(&local).await {
        Ok(meta) if meta.is_file() && meta.len() == entry.metadata.size => {}
        Ok(_) => return Ok(false),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => {
            tracing::debug!("Cannot stat {}: {}", local.display(), e);
            return Ok(false);
        }
    }

    match FileMetadata::from_file(&local).await {
        Ok(meta) => Ok(meta == entry.metadata),
        Err(e) => {
            tracing::debug!("Cannot hash {}: {}", local.display(), e);
            Ok(false)
        }
    }
}
