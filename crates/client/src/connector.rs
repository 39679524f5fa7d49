//! How the client obtains a byte stream for each call.

use std::future::Future;
use std::io;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// A boxed future resolving to a connected stream.
pub type ConnectFuture<'a, IO> = Pin<Box<dyn Future<Output = io::Result<IO>> + Send + 'a>>;

/// Opens one byte stream per call.
///
/// Implement this to put a secure channel (e.g. TLS) under the client.
pub trait Connector: Send + Sync + 'static {
    type Io: AsyncRead + AsyncWrite + Send + 'static;

    fn connect(&self) -> ConnectFuture<'_, Self::Io>;
}

/// Plain TCP connector.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
}

impl TcpConnector {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl Connector for TcpConnector {
    type Io = TcpStream;

    fn connect(&self) -> ConnectFuture<'_, TcpStream> {
        Box::pin(async move {
            let stream = TcpStream::connect(&self.addr).await?;
            stream.set_nodelay(true)?;
            Ok(stream)
        })
    }
}
