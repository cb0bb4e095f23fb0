//! Server mode sync - pulls the managed file set from a remote server.

use crate::action::ActionProgress;
use crate::client::{sync_all, Requests, SyncReport};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::path::RootResolver;
use crate::transport::ServerSession;

/// Sync from remote server to the local root (pull)
pub async fn sync_pull<F>(config: &ClientConfig, sink: F) -> Result<SyncReport>
where
    F: FnMut(&ActionProgress),
{
    let session = ServerSession::connect_tcp(&config.server).await?;
    let (reader, writer) = session.split();

    let resolver = RootResolver::new(&config.root);
    let mut requests = Requests::new(reader, writer, resolver, config.transfer());

    let directories = requests.get_managed_directories().await;
    tracing::debug!("Server manages directories: {:?}", directories);

    sync_all(&mut requests, sink).await
}
