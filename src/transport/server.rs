//! Server session - establishes the connection to a remote serversync peer.
//!
//! Provides buffered read/write halves. Protocol handling is done by `Requests`.

use crate::error::{Result, SyncError};
use tokio::io::{BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// Manages one connection to a serversync server
pub struct ServerSession {
    stream: TcpStream,
}

impl ServerSession {
    /// Connect to a server over TCP
    pub async fn connect_tcp(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| SyncError::connection("connecting to server", e))?;
        // Requests are tiny and flushed individually; don't let Nagle sit on them
        stream
            .set_nodelay(true)
            .map_err(|e| SyncError::connection("configuring socket", e))?;
        tracing::debug!("Connected to {}", addr);
        Ok(Self { stream })
    }

    /// Split into reader/writer for protocol handling
    pub fn split(self) -> (BufReader<OwnedReadHalf>, BufWriter<OwnedWriteHalf>) {
        let (r, w) = self.stream.into_split();
        (BufReader::new(r), BufWriter::new(w))
    }
}
