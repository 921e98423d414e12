pub mod client;
pub mod protocol;
pub mod server;

pub use client::RemoteStore;
pub use protocol::{Request, Response};
pub use server::{process_connection, serve};
