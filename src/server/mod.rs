//! Server mode - answers sync requests for the files it manages.
//!
//! One task per connection. Connections share nothing but the read-only
//! [`Catalog`], so a slow or broken client never affects another.

pub mod catalog;

pub use catalog::Catalog;

use crate::config::{ServerConfig, DATA_CHUNK_SIZE};
use crate::error::{Result, SyncError};
use crate::manifest::ManagedFileRef;
use crate::wire::{self, DirectoryList, RecordType, ServerMessage};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{self, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpListener;

/// Main server entry point
pub async fn run_server(config: &ServerConfig) -> Result<()> {
    let catalog = Arc::new(Catalog::scan(&config.root, &config.directories).await?);
    let listener = TcpListener::bind(&config.bind)
        .await
        .map_err(|e| SyncError::connection("binding listener", e))?;
    tracing::info!("Listening on {}", config.bind);
    serve_tcp(listener, catalog).await
}

/// Accept connections forever, serving each on its own task.
///
/// A failed accept never stops the loop; see [`accept_retry_delay`].
pub async fn serve_tcp(listener: TcpListener, catalog: Arc<Catalog>) -> Result<()> {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                let delay = accept_retry_delay(&e);
                tracing::warn!("Failed to accept connection: {} (retrying in {:?})", e, delay);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                continue;
            }
        };
        tracing::debug!("Client connected from {}", peer);

        let catalog = Arc::clone(&catalog);
        tokio::spawn(async move {
            let (r, w) = stream.into_split();
            match serve(&catalog, BufReader::new(r), BufWriter::new(w)).await {
                Ok(()) => tracing::debug!("Client {} disconnected", peer),
                Err(e) => tracing::warn!("Connection with {} ended: {}", peer, e),
            }
        });
    }
}

/// How long to pause after a failed accept.
///
/// Errors that belong to a single aborted handshake are retried at once.
/// Anything else, typically running out of file descriptors, backs off so the
/// loop does not spin while resources are exhausted.
pub fn accept_retry_delay(err: &io::Error) -> Duration {
    match err.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::Interrupted
        | io::ErrorKind::WouldBlock => Duration::ZERO,
        _ => Duration::from_millis(100),
    }
}

/// Answer requests on one connection until the client hangs up.
pub async fn serve<R, W>(catalog: &Catalog, mut reader: R, mut writer: W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    while let Some(msg) = wire::read_message(&mut reader).await? {
        tracing::debug!("Handling {}", msg.as_str());
        match msg {
            ServerMessage::GetManifest => {
                wire::write_frame(&mut writer, &catalog.manifest().encode()?).await?;
            }
            ServerMessage::GetManagedDirectories => {
                let list = DirectoryList {
                    directories: catalog.directories().to_vec(),
                };
                wire::write_frame(&mut writer, &list.encode()?).await?;
            }
            ServerMessage::GetNumberOfManagedFiles => {
                wire::write_i32(&mut writer, catalog.file_count()).await?;
            }
            ServerMessage::UpdateFile => {
                let payload = wire::read_record(&mut reader, RecordType::FileRef).await?;
                let target = ManagedFileRef::decode(payload)?;
                send_file(catalog, &target, &mut writer).await?;
            }
        }
    }
    Ok(())
}

async fn send_file<W: AsyncWrite + Unpin>(
    catalog: &Catalog,
    target: &ManagedFileRef,
    writer: &mut W,
) -> Result<()> {
    let opened = match catalog.locate(target) {
        Some(path) => open_managed(&path).await,
        None => None,
    };

    let Some((file, len)) = opened else {
        tracing::debug!("Client asked for unmanaged file {}", target);
        return wire::write_bool(writer, false).await;
    };

    wire::write_bool(writer, true).await?;
    wire::write_file_len(writer, len).await?;
    stream_body(file, len, writer).await?;
    writer
        .flush()
        .await
        .map_err(|e| SyncError::connection("flushing file body", e))
}

async fn open_managed(path: &Path) -> Option<(File, u64)> {
    let file = match File::open(path).await {
        Ok(file) => file,
        Err(e) => {
            tracing::warn!("Cannot open managed file {}: {}", path.display(), e);
            return None;
        }
    };
    match file.metadata().await {
        Ok(meta) => Some((file, meta.len())),
        Err(e) => {
            tracing::warn!("Cannot stat managed file {}: {}", path.display(), e);
            None
        }
    }
}

/// Send exactly `len` bytes. The length is already on the wire, so a file that
/// shrank underneath us leaves no way to recover the stream.
async fn stream_body<W: AsyncWrite + Unpin>(file: File, len: u64, writer: &mut W) -> Result<()> {
    let mut reader = file.take(len);
    let mut buf = vec![0u8; DATA_CHUNK_SIZE];
    let mut sent = 0u64;

    loop {
        let n = reader
            .read(&mut buf)
            .await
            .map_err(|e| SyncError::local_io("managed file", e))?;
        if n == 0 {
            break;
        }
        writer
            .write_all(&buf[..n])
            .await
            .map_err(|e| SyncError::connection("writing file body", e))?;
        sent += n as u64;
    }

    if sent != len {
        return Err(SyncError::connection(
            "writing file body",
            io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("file shrank to {} of {} bytes", sent, len),
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{FileManifest, FileMetadata};

    fn catalog(root: &Path) -> Catalog {
        Catalog::scan_blocking(root, &["mods".into()]).unwrap()
    }

    #[tokio::test]
    async fn test_serve_answers_each_request() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("mods")).unwrap();
        std::fs::write(tmp.path().join("mods/a.jar"), b"abcdef").unwrap();
        let catalog = catalog(tmp.path());

        let (client, server) = tokio::io::duplex(4096);
        let (sr, sw) = tokio::io::split(server);
        let handle = tokio::spawn(async move { serve(&catalog, sr, sw).await });

        let (mut cr, mut cw) = tokio::io::split(client);

        wire::write_message(&mut cw, ServerMessage::GetNumberOfManagedFiles)
            .await
            .unwrap();
        assert_eq!(wire::read_i32(&mut cr).await.unwrap(), 1);

        wire::write_message(&mut cw, ServerMessage::GetManifest)
            .await
            .unwrap();
        let payload = wire::read_record(&mut cr, RecordType::Manifest).await.unwrap();
        let manifest = FileManifest::decode(payload).unwrap();
        assert_eq!(
            manifest.get("mods/a.jar").unwrap().metadata,
            FileMetadata::from_bytes(b"abcdef")
        );

        wire::write_message(&mut cw, ServerMessage::GetManagedDirectories)
            .await
            .unwrap();
        let payload = wire::read_record(&mut cr, RecordType::DirectoryList)
            .await
            .unwrap();
        assert_eq!(DirectoryList::decode(payload).unwrap().directories, vec!["mods"]);

        wire::write_message(&mut cw, ServerMessage::UpdateFile)
            .await
            .unwrap();
        wire::write_frame(&mut cw, &ManagedFileRef::new("mods/a.jar").unwrap().encode().unwrap())
            .await
            .unwrap();
        assert!(wire::read_bool(&mut cr).await.unwrap());
        assert_eq!(wire::read_file_len(&mut cr).await.unwrap(), 6);
        let mut body = [0u8; 6];
        cr.read_exact(&mut body).await.unwrap();
        assert_eq!(&body, b"abcdef");

        wire::write_message(&mut cw, ServerMessage::UpdateFile)
            .await
            .unwrap();
        wire::write_frame(&mut cw, &ManagedFileRef::new("mods/nope.jar").unwrap().encode().unwrap())
            .await
            .unwrap();
        assert!(!wire::read_bool(&mut cr).await.unwrap());

        drop(cw);
        drop(cr);
        handle.await.unwrap().unwrap();
    }

    #[test]
    fn test_accept_errors_keep_the_server_running() {
        let aborted = io::Error::from(io::ErrorKind::ConnectionAborted);
        assert_eq!(accept_retry_delay(&aborted), Duration::ZERO);

        // EMFILE: back off, do not give up
        let exhausted = io::Error::from_raw_os_error(24);
        assert_eq!(accept_retry_delay(&exhausted), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_serve_rejects_unknown_request() {
        let tmp = tempfile::TempDir::new().unwrap();
        let catalog = catalog(tmp.path());

        let (mut client, server) = tokio::io::duplex(256);
        client.write_u16(8).await.unwrap();
        client.write_all(b"GET_CONF").await.unwrap();

        let (sr, sw) = tokio::io::split(server);
        let err = serve(&catalog, sr, sw).await.unwrap_err();
        assert!(matches!(err, SyncError::Decode(_)));
    }
}
