//! serversync - keep a client's files in step with a server's managed set.
//!
//! The client asks the server for its manifest over one persistent
//! connection, compares it with the local files and pulls every file that is
//! missing or differs, reporting per-file progress as bytes arrive.

pub mod action;
pub mod client;
pub mod config;
pub mod error;
pub mod manifest;
pub mod path;
pub mod server;
pub mod sync;
pub mod temp_file;
pub mod transport;
pub mod wire;

pub use action::{ActionEntry, ActionKind, ActionProgress};
pub use client::{Requests, SyncReport};
pub use error::{Result, SyncError};
pub use manifest::{FileManifest, FileMetadata, ManagedFileRef};
pub use path::{PathResolver, RootResolver};
