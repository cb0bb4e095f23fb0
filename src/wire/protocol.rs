//! Wire format for the serversync request/response exchange.
//!
//! Wire format: all multi-byte integers are big-endian.
//! Strings are length-prefixed (u16 len + UTF-8).
//! Request discriminator: string token, flushed on its own.
//! Structured records: len:u32 | type:u8 | payload, payload starts with a u16
//! format version.

use crate::error::{Result, SyncError};
use crate::manifest::{FileManifest, FileMetadata, ManagedFileRef};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Version carried by every structured record
pub const FORMAT_VERSION: u16 = 1;

/// Maximum frame size (64MB) - prevents OOM from malicious/corrupted frames
pub const MAX_FRAME_SIZE: u32 = 64 * 1024 * 1024;

/// Longest discriminator token we accept
const MAX_TOKEN_LEN: usize = 64;

// =============================================================================
// Request discriminators
// =============================================================================

/// The closed set of requests a client may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMessage {
    GetManifest,
    GetManagedDirectories,
    GetNumberOfManagedFiles,
    UpdateFile,
}

impl ServerMessage {
    pub const ALL: [ServerMessage; 4] = [
        Self::GetManifest,
        Self::GetManagedDirectories,
        Self::GetNumberOfManagedFiles,
        Self::UpdateFile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetManifest => "GET_MANIFEST",
            Self::GetManagedDirectories => "GET_MANAGED_DIRECTORIES",
            Self::GetNumberOfManagedFiles => "GET_NUMBER_OF_MANAGED_FILES",
            Self::UpdateFile => "UPDATE_FILE",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == token)
    }
}

// =============================================================================
// Record types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    Manifest = 0x01,
    DirectoryList = 0x02,
    FileRef = 0x03,
}

impl RecordType {
    pub fn from_u8(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Self::Manifest),
            0x02 => Some(Self::DirectoryList),
            0x03 => Some(Self::FileRef),
            _ => None,
        }
    }
}

// =============================================================================
// Payload helpers
// =============================================================================

fn frame(record: RecordType, payload: BytesMut) -> Result<Bytes> {
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= MAX_FRAME_SIZE)
        .ok_or_else(|| {
            SyncError::Encode(format!(
                "{:?} payload of {} bytes exceeds maximum frame size {}",
                record,
                payload.len(),
                MAX_FRAME_SIZE
            ))
        })?;

    let mut buf = BytesMut::with_capacity(5 + payload.len());
    buf.put_u32(len);
    buf.put_u8(record as u8);
    buf.put_slice(&payload);
    Ok(buf.freeze())
}

fn put_str(buf: &mut BytesMut, s: &str, what: &str) -> Result<()> {
    let bytes = s.as_bytes();
    let len = u16::try_from(bytes.len()).map_err(|_| {
        SyncError::Encode(format!(
            "{} of {} bytes exceeds the {} byte string limit",
            what,
            bytes.len(),
            u16::MAX
        ))
    })?;
    buf.put_u16(len);
    buf.put_slice(bytes);
    Ok(())
}

fn put_count(buf: &mut BytesMut, count: usize, what: &str) -> Result<()> {
    let count = u32::try_from(count)
        .map_err(|_| SyncError::Encode(format!("{} has too many entries: {}", what, count)))?;
    buf.put_u32(count);
    Ok(())
}

fn get_str(payload: &mut Bytes, what: &str) -> Result<String> {
    if payload.remaining() < 2 {
        return Err(SyncError::Decode(format!("{} length truncated", what)));
    }
    let len = payload.get_u16() as usize;
    if payload.remaining() < len {
        return Err(SyncError::Decode(format!(
            "{} truncated: expected {} bytes, got {}",
            what,
            len,
            payload.remaining()
        )));
    }
    String::from_utf8(payload.copy_to_bytes(len).to_vec())
        .map_err(|_| SyncError::Decode(format!("invalid UTF-8 in {}", what)))
}

fn get_version(payload: &mut Bytes, what: &str) -> Result<()> {
    if payload.remaining() < 2 {
        return Err(SyncError::Decode(format!("{} payload too short", what)));
    }
    let version = payload.get_u16();
    if version != FORMAT_VERSION {
        return Err(SyncError::Decode(format!(
            "unsupported {} format version {}",
            what, version
        )));
    }
    Ok(())
}

fn get_count(payload: &mut Bytes, what: &str) -> Result<usize> {
    if payload.remaining() < 4 {
        return Err(SyncError::Decode(format!("{} count truncated", what)));
    }
    Ok(payload.get_u32() as usize)
}

fn expect_end(payload: &Bytes, what: &str) -> Result<()> {
    if payload.has_remaining() {
        return Err(SyncError::Decode(format!(
            "{} has {} trailing bytes",
            what,
            payload.remaining()
        )));
    }
    Ok(())
}

// =============================================================================
// MANIFEST (0x01)
// =============================================================================

impl FileManifest {
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        buf.put_u16(FORMAT_VERSION);
        put_count(&mut buf, self.len(), "manifest")?;
        for entry in self.iter() {
            put_str(&mut buf, entry.target.path(), "manifest path")?;
            buf.put_u64(entry.metadata.size);
            put_str(&mut buf, &entry.metadata.hash, "manifest hash")?;
        }
        frame(RecordType::Manifest, buf)
    }

    pub fn decode(mut payload: Bytes) -> Result<Self> {
        get_version(&mut payload, "manifest")?;
        let count = get_count(&mut payload, "manifest")?;

        let mut manifest = FileManifest::new();
        for _ in 0..count {
            let path = get_str(&mut payload, "manifest path")?;
            if payload.remaining() < 8 {
                return Err(SyncError::Decode("manifest entry size truncated".into()));
            }
            let size = payload.get_u64();
            let hash = get_str(&mut payload, "manifest hash")?;

            let target = ManagedFileRef::new(&path)
                .map_err(|e| SyncError::Decode(format!("manifest entry: {}", e)))?;
            manifest
                .insert(target, FileMetadata { size, hash })
                .map_err(|e| SyncError::Decode(format!("manifest entry: {}", e)))?;
        }
        expect_end(&payload, "manifest")?;

        Ok(manifest)
    }
}

// =============================================================================
// DIRECTORY_LIST (0x02)
// =============================================================================

/// Directories the server is authoritative for, in server order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryList {
    pub directories: Vec<String>,
}

impl DirectoryList {
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        buf.put_u16(FORMAT_VERSION);
        put_count(&mut buf, self.directories.len(), "directory list")?;
        for dir in &self.directories {
            put_str(&mut buf, dir, "directory")?;
        }
        frame(RecordType::DirectoryList, buf)
    }

    pub fn decode(mut payload: Bytes) -> Result<Self> {
        get_version(&mut payload, "directory list")?;
        let count = get_count(&mut payload, "directory list")?;

        // Each entry needs at least its 2-byte length prefix
        let mut directories = Vec::with_capacity(count.min(payload.remaining() / 2));
        for _ in 0..count {
            directories.push(get_str(&mut payload, "directory")?);
        }
        expect_end(&payload, "directory list")?;

        Ok(Self { directories })
    }
}

// =============================================================================
// FILE_REF (0x03)
// =============================================================================

impl ManagedFileRef {
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        buf.put_u16(FORMAT_VERSION);
        put_str(&mut buf, self.path(), "file ref path")?;
        frame(RecordType::FileRef, buf)
    }

    pub fn decode(mut payload: Bytes) -> Result<Self> {
        get_version(&mut payload, "file ref")?;
        let path = get_str(&mut payload, "file ref path")?;
        expect_end(&payload, "file ref")?;
        ManagedFileRef::new(&path).map_err(|e| SyncError::Decode(format!("file ref: {}", e)))
    }
}

// =============================================================================
// Stream I/O
// =============================================================================

/// Write a request discriminator and flush it.
pub async fn write_message<W: AsyncWrite + Unpin>(w: &mut W, msg: ServerMessage) -> Result<()> {
    let token = msg.as_str().as_bytes();
    let mut buf = BytesMut::with_capacity(2 + token.len());
    buf.put_u16(token.len() as u16);
    buf.put_slice(token);

    w.write_all(&buf)
        .await
        .map_err(|e| SyncError::connection("writing request", e))?;
    w.flush()
        .await
        .map_err(|e| SyncError::connection("flushing request", e))
}

/// Read the next request discriminator.
/// Returns `None` if the peer closed the stream between requests.
pub async fn read_message<R: AsyncRead + Unpin>(r: &mut R) -> Result<Option<ServerMessage>> {
    let len = match r.read_u16().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(SyncError::connection("reading request", e)),
    };
    if len > MAX_TOKEN_LEN {
        return Err(SyncError::Decode(format!(
            "request token length {} exceeds {}",
            len, MAX_TOKEN_LEN
        )));
    }

    let mut token = vec![0u8; len];
    r.read_exact(&mut token)
        .await
        .map_err(|e| SyncError::connection("reading request", e))?;
    let token = String::from_utf8(token)
        .map_err(|_| SyncError::Decode("invalid UTF-8 in request token".into()))?;

    ServerMessage::from_token(&token)
        .map(Some)
        .ok_or_else(|| SyncError::Decode(format!("unknown request {:?}", token)))
}

/// Read a single frame from the stream.
/// Returns (record_type, payload).
pub async fn read_frame<R: AsyncRead + Unpin>(r: &mut R) -> Result<(RecordType, Bytes)> {
    let len = r
        .read_u32()
        .await
        .map_err(|e| SyncError::connection("reading frame length", e))?;

    // Validate frame size before allocation
    if len > MAX_FRAME_SIZE {
        return Err(SyncError::Decode(format!(
            "frame size {} exceeds maximum allowed size {}",
            len, MAX_FRAME_SIZE
        )));
    }

    let record = r
        .read_u8()
        .await
        .map_err(|e| SyncError::connection("reading record type", e))?;
    let record = RecordType::from_u8(record)
        .ok_or_else(|| SyncError::Decode(format!("unknown record type 0x{:02x}", record)))?;

    let mut payload = vec![0u8; len as usize];
    r.read_exact(&mut payload)
        .await
        .map_err(|e| SyncError::connection("reading frame payload", e))?;

    Ok((record, Bytes::from(payload)))
}

/// Read a frame and insist on its record type.
pub async fn read_record<R: AsyncRead + Unpin>(r: &mut R, expected: RecordType) -> Result<Bytes> {
    let (record, payload) = read_frame(r).await?;
    if record != expected {
        return Err(SyncError::Decode(format!(
            "expected {:?} record, got {:?}",
            expected, record
        )));
    }
    Ok(payload)
}

/// Write a pre-encoded frame and flush it.
pub async fn write_frame<W: AsyncWrite + Unpin>(w: &mut W, frame: &Bytes) -> Result<()> {
    w.write_all(frame)
        .await
        .map_err(|e| SyncError::connection("writing frame", e))?;
    w.flush()
        .await
        .map_err(|e| SyncError::connection("flushing frame", e))
}

pub async fn read_i32<R: AsyncRead + Unpin>(r: &mut R) -> Result<i32> {
    r.read_i32()
        .await
        .map_err(|e| SyncError::connection("reading integer", e))
}

pub async fn write_i32<W: AsyncWrite + Unpin>(w: &mut W, value: i32) -> Result<()> {
    w.write_i32(value)
        .await
        .map_err(|e| SyncError::connection("writing integer", e))?;
    w.flush()
        .await
        .map_err(|e| SyncError::connection("flushing integer", e))
}

pub async fn read_bool<R: AsyncRead + Unpin>(r: &mut R) -> Result<bool> {
    match r
        .read_u8()
        .await
        .map_err(|e| SyncError::connection("reading flag", e))?
    {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(SyncError::Decode(format!("invalid boolean byte {}", other))),
    }
}

pub async fn write_bool<W: AsyncWrite + Unpin>(w: &mut W, value: bool) -> Result<()> {
    w.write_u8(value as u8)
        .await
        .map_err(|e| SyncError::connection("writing flag", e))?;
    w.flush()
        .await
        .map_err(|e| SyncError::connection("flushing flag", e))
}

/// Read the 8-byte declared length that precedes a file body.
pub async fn read_file_len<R: AsyncRead + Unpin>(r: &mut R) -> Result<u64> {
    let len = r
        .read_i64()
        .await
        .map_err(|e| SyncError::connection("reading file length", e))?;
    u64::try_from(len).map_err(|_| SyncError::Decode(format!("negative file length {}", len)))
}

/// Write the declared body length. Not flushed: the body follows immediately.
pub async fn write_file_len<W: AsyncWrite + Unpin>(w: &mut W, len: u64) -> Result<()> {
    let len = i64::try_from(len)
        .map_err(|_| SyncError::Decode(format!("file length {} does not fit the wire", len)))?;
    w.write_i64(len)
        .await
        .map_err(|e| SyncError::connection("writing file length", e))
}

// =============================================================================
// Tests
// =============================================================================
