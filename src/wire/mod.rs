//! Wire codec for the serversync protocol.
//!
//! Strict request/response over one ordered stream. The client writes a
//! discriminator token (plus a file reference for `UPDATE_FILE`), the server
//! answers with a response whose shape is fixed by the request kind:
//!
//! ```text
//! GET_MANIFEST                 -> MANIFEST record
//! GET_MANAGED_DIRECTORIES      -> DIRECTORY_LIST record
//! GET_NUMBER_OF_MANAGED_FILES  -> i32
//! UPDATE_FILE + FILE_REF       -> bool exists [-> i64 len -> len raw bytes]
//! ```
//!
//! There is no request id on the wire; only one request may be outstanding.

pub mod protocol;

pub use protocol::{
    read_bool, read_file_len, read_frame, read_i32, read_message, read_record, write_bool,
    write_file_len, write_frame, write_i32, write_message, DirectoryList, RecordType,
    ServerMessage, FORMAT_VERSION, MAX_FRAME_SIZE,
};
