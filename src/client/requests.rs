//! Protocol client: one request at a time over a shared connection.
//!
//! # Connection discipline
//!
//! The protocol has no request ids, so a response is matched to its request
//! purely by order. Exactly one operation may touch the stream between its
//! first write and its last read. Every operation here takes `&mut self`,
//! which makes that a compile-time property of a single [`Requests`]; for
//! concurrent transfers open one connection and one [`Requests`] per task.
//!
//! After a connection or decode failure the byte stream can no longer be
//! trusted. The instance then refuses further requests with
//! [`SyncError::Unusable`] instead of reading misaligned bytes; drop it and
//! reconnect. No operation retries on its own.

use crate::action::{ActionEntry, ActionProgress};
use crate::client::transfer::Transfer;
use crate::config::TransferConfig;
use crate::error::{Result, SyncError};
use crate::manifest::FileManifest;
use crate::path::PathResolver;
use crate::wire::{self, DirectoryList, RecordType, ServerMessage};
use std::path::Path;
use tokio::io::{AsyncRead, AsyncWrite};

/// Sentinel returned by [`Requests::get_number_of_managed_files`] on failure.
pub const FILE_COUNT_UNKNOWN: i32 = -1;

pub struct Requests<R, W> {
    reader: R,
    writer: W,
    resolver: Box<dyn PathResolver>,
    transfer: Transfer,
    broken: bool,
}

impl<R, W> Requests<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(
        reader: R,
        writer: W,
        resolver: impl PathResolver + 'static,
        config: TransferConfig,
    ) -> Self {
        Self {
            reader,
            writer,
            resolver: Box::new(resolver),
            transfer: Transfer::new(config),
            broken: false,
        }
    }

    /// False once a failure has left the stream in an unknown state.
    pub fn is_usable(&self) -> bool {
        !self.broken
    }

    /// Where this client places managed files locally.
    pub fn resolver(&self) -> &dyn PathResolver {
        self.resolver.as_ref()
    }

    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }

    /// The manifest of files present on the server.
    ///
    /// A failure means the sync state is unknown, not that nothing needs syncing.
    pub async fn get_manifest(&mut self) -> Result<FileManifest> {
        tracing::debug!("Requesting file manifest");
        self.ensure_usable()?;
        let result = self.exchange_manifest().await;
        self.settle(result, "file manifest")
    }

    /// Directories the server manages, or an empty list on any failure.
    ///
    /// Use [`Requests::try_get_managed_directories`] to tell a failure apart
    /// from a server that manages nothing.
    pub async fn get_managed_directories(&mut self) -> Vec<String> {
        self.try_get_managed_directories()
            .await
            .unwrap_or_default()
    }

    pub async fn try_get_managed_directories(&mut self) -> Result<Vec<String>> {
        tracing::debug!("Requesting managed directories");
        self.ensure_usable()?;
        let result = self.exchange_directories().await;
        self.settle(result, "managed directories")
    }

    /// Number of files the server manages, or [`FILE_COUNT_UNKNOWN`] on failure.
    pub async fn get_number_of_managed_files(&mut self) -> i32 {
        match self.try_get_number_of_managed_files().await {
            Ok(count) => count,
            Err(_) => FILE_COUNT_UNKNOWN,
        }
    }

    /// Like [`Requests::get_number_of_managed_files`], with the error kept.
    /// A negative count from the server is a decode error.
    pub async fn try_get_number_of_managed_files(&mut self) -> Result<i32> {
        tracing::debug!("Requesting number of managed files");
        self.ensure_usable()?;
        let result = self.exchange_file_count().await;
        self.settle(result, "number of managed files")
    }

    /// Download the server's copy of `entry.target`, reporting progress to `sink`.
    ///
    /// Returns true once the file is in place. On false the local target may
    /// be stale; request it again rather than trusting it.
    pub async fn update_file<F>(&mut self, entry: &ActionEntry, sink: F) -> bool
    where
        F: FnMut(&ActionProgress),
    {
        self.try_update_file(entry, sink).await.is_ok()
    }

    /// Like [`Requests::update_file`], returning the bytes received or the
    /// reason for failure. The sink is never called when the server does not
    /// have the file.
    pub async fn try_update_file<F>(&mut self, entry: &ActionEntry, mut sink: F) -> Result<u64>
    where
        F: FnMut(&ActionProgress),
    {
        self.ensure_usable()?;
        let dest = self.resolver.resolve(&entry.target)?;

        let result = self.exchange_update(entry, &dest, &mut sink).await;
        if let Err(SyncError::RemoteAbsence { path }) = &result {
            tracing::error!("File does not exist on the server: {}", path);
        }
        self.settle(result, "file update")
    }

    async fn exchange_manifest(&mut self) -> Result<FileManifest> {
        wire::write_message(&mut self.writer, ServerMessage::GetManifest).await?;
        let payload = wire::read_record(&mut self.reader, RecordType::Manifest).await?;
        FileManifest::decode(payload)
    }

    async fn exchange_directories(&mut self) -> Result<Vec<String>> {
        wire::write_message(&mut self.writer, ServerMessage::GetManagedDirectories).await?;
        let payload = wire::read_record(&mut self.reader, RecordType::DirectoryList).await?;
        Ok(DirectoryList::decode(payload)?.directories)
    }

    async fn exchange_file_count(&mut self) -> Result<i32> {
        wire::write_message(&mut self.writer, ServerMessage::GetNumberOfManagedFiles).await?;
        let count = wire::read_i32(&mut self.reader).await?;
        if count < 0 {
            return Err(SyncError::Decode(format!("negative file count {}", count)));
        }
        Ok(count)
    }

    async fn exchange_update<F>(
        &mut self,
        entry: &ActionEntry,
        dest: &Path,
        sink: &mut F,
    ) -> Result<u64>
    where
        F: FnMut(&ActionProgress),
    {
        // Encode first so a path that does not fit leaves the stream untouched
        let file_ref = entry.target.encode()?;
        wire::write_message(&mut self.writer, ServerMessage::UpdateFile).await?;
        wire::write_frame(&mut self.writer, &file_ref).await?;

        if !wire::read_bool(&mut self.reader).await? {
            return Err(SyncError::RemoteAbsence {
                path: entry.target.path().to_string(),
            });
        }

        self.transfer
            .receive(&mut self.reader, entry, dest, sink)
            .await
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.broken {
            tracing::debug!("Refusing request on a broken connection");
            return Err(SyncError::Unusable);
        }
        Ok(())
    }

    /// Log a failed step and retire the connection if the stream is now suspect.
    fn settle<T>(&mut self, result: Result<T>, what: &str) -> Result<T> {
        if let Err(e) = &result {
            tracing::debug!("Request for {} failed: {}", what, e);
            if e.poisons_connection() {
                self.broken = true;
            }
        }
        result
    }
}
