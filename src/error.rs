//! Error types for serversync.
//!
//! Every protocol operation maps its failure onto one of these variants.
//! The coarse client API folds them back into sentinels (`false`, `-1`,
//! empty list), the `try_*` twins hand them to the caller unchanged.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Error, Debug)]
pub enum SyncError {
    /// A read or write on the shared stream failed.
    #[error("connection failed while {context}: {source}")]
    Connection {
        context: &'static str,
        #[source]
        source: io::Error,
    },

    /// Bytes on the stream do not match the shape expected at this point.
    #[error("malformed message: {0}")]
    Decode(String),

    /// The peer reported that it does not manage the requested file.
    #[error("file does not exist on the server: {path}")]
    RemoteAbsence { path: String },

    #[error("local I/O error on {}: {source}", .path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A value does not fit the wire format. Nothing was written.
    #[error("cannot encode message: {0}")]
    Encode(String),

    #[error("invalid managed path: {0}")]
    InvalidPath(String),

    #[error("duplicate manifest path: {0}")]
    DuplicatePath(String),

    /// The connection already failed or desynchronized; reopen it.
    #[error("connection is no longer usable")]
    Unusable,

    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    pub fn connection(context: &'static str, source: io::Error) -> Self {
        SyncError::Connection { context, source }
    }

    pub fn local_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        SyncError::LocalIo {
            path: path.into(),
            source,
        }
    }

    /// Whether the stream can no longer be trusted after this error.
    ///
    /// A failed read or write leaves an unknown number of bytes in flight and a
    /// decode mismatch means the two sides disagree on framing, so further
    /// requests on the same connection would read garbage.
    pub fn poisons_connection(&self) -> bool {
        matches!(
            self,
            SyncError::Connection { .. } | SyncError::Decode(_) | SyncError::Unusable
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poisons_connection() {
        let conn = SyncError::connection(
            "reading manifest",
            io::Error::new(io::ErrorKind::UnexpectedEof, "eof"),
        );
        assert!(conn.poisons_connection());
        assert!(SyncError::Decode("bad tag".into()).poisons_connection());
        assert!(!SyncError::RemoteAbsence {
            path: "mods/a.jar".into()
        }
        .poisons_connection());
        assert!(!SyncError::local_io(
            "/tmp/x",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied")
        )
        .poisons_connection());
        assert!(!SyncError::Encode("too long".into()).poisons_connection());
    }

    #[test]
    fn test_display() {
        let err = SyncError::RemoteAbsence {
            path: "mods/foo.jar".into(),
        };
        assert_eq!(
            err.to_string(),
            "file does not exist on the server: mods/foo.jar"
        );
    }
}
