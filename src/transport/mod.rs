pub mod server;

pub use server::ServerSession;
