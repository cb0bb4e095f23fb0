//! Client side of serversync.
//!
//! [`Requests`] speaks the protocol, [`Transfer`] moves file bodies and
//! [`reconcile::plan`] decides what needs moving. [`sync_all`] strings them
//! together for a full pull.

pub mod reconcile;
pub mod requests;
pub mod transfer;

pub use requests::{Requests, FILE_COUNT_UNKNOWN};
pub use transfer::Transfer;

use crate::action::ActionProgress;
use crate::error::Result;
use tokio::io::{AsyncRead, AsyncWrite};

/// Outcome of a full pull
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Files fetched from the server
    pub updated: usize,
    /// Files already up to date
    pub skipped: usize,
    /// Paths whose update failed
    pub failed: Vec<String>,
    pub bytes_transferred: u64,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Fetch the manifest, then update every file that differs locally.
///
/// Local files are compared under the same resolver the transfers write to.
/// A failed manifest fetch is an error: without it nothing can be said about
/// the local state. Individual file failures are collected in the report.
/// Once the connection becomes unusable the remaining files are marked failed
/// without further requests.
pub async fn sync_all<R, W, F>(
    requests: &mut Requests<R, W>,
    mut sink: F,
) -> Result<SyncReport>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    F: FnMut(&ActionProgress),
{
    let manifest = requests.get_manifest().await?;
    tracing::info!("Server manages {} files", manifest.len());

    let actions = reconcile::plan(&manifest, requests.resolver()).await?;
    let mut report = SyncReport::default();

    for action in &actions {
        if !action.needs_transfer() {
            report.skipped += 1;
            continue;
        }
        if !requests.is_usable() {
            report.failed.push(action.target.path().to_string());
            continue;
        }

        match requests.try_update_file(action, &mut sink).await {
            Ok(bytes) => {
                tracing::info!("Updated {}", action.target);
                report.updated += 1;
                report.bytes_transferred += bytes;
            }
            Err(e) => {
                tracing::warn!("Failed to update {}: {}", action.target, e);
                report.failed.push(action.target.path().to_string());
            }
        }
    }

    Ok(report)
}
