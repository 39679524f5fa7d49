//! File-transfer server for filestream.
//!
//! Accepts one call per connection, runs it through the interceptor chain
//! (logging, then bearer auth) and dispatches it to a [`Handler`]. The
//! stock handler is [`TransferService`], serving files from a
//! [`Storage`](filestream_transfer::Storage) backend.

mod handler;
mod server;
mod service;

pub use handler::{Dispatcher, Handler, HandlerFuture};
pub use server::{FileServer, ServerConfig, standard_chain};
pub use service::{SessionObserver, TransferService};

/// Errors produced by the file server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("call transport error: {0}")]
    Rpc(#[from] filestream_rpc::RpcError),

    #[error("invalid configuration: {0}")]
    Config(String),
}
