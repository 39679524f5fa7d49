//! Accept-loop file server.
//!
//! Listens on a TCP port and serves one call per accepted connection, each
//! on its own task, through the shared interceptor chain.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use filestream_protocol::constants::{DEFAULT_CHANNEL_CAPACITY, MAX_CHUNK_SIZE};
use filestream_protocol::{Method, Status};
use filestream_rpc::{
    AuthInterceptor, IncomingCall, InterceptorChain, LoggingInterceptor, ServerCall, accept_call,
};
use filestream_transfer::{DEFAULT_MAX_CHUNK_SIZE, FsStorage, Storage};

use crate::ServerError;
use crate::handler::{Dispatcher, Handler};
use crate::service::TransferService;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on (port 0 = OS-assigned).
    pub bind_addr: SocketAddr,
    /// Directory served by [`FsStorage`].
    pub storage_root: PathBuf,
    /// Bearer token every call must present.
    pub token: String,
    /// Maximum bytes per download message.
    pub max_chunk_size: usize,
    /// Pause between download messages.
    pub chunk_interval: Duration,
    /// Messages buffered per channel direction.
    pub channel_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: ([127, 0, 0, 1], 50051).into(),
            storage_root: PathBuf::from("storage"),
            token: String::new(),
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            chunk_interval: Duration::ZERO,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl ServerConfig {
    /// Rejects settings the server cannot run with.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.token.is_empty() {
            return Err(ServerError::Config("token must not be empty".into()));
        }
        if self.max_chunk_size == 0 {
            return Err(ServerError::Config(
                "max_chunk_size must be greater than zero".into(),
            ));
        }
        if self.max_chunk_size > MAX_CHUNK_SIZE {
            return Err(ServerError::Config(format!(
                "max_chunk_size must be at most {MAX_CHUNK_SIZE} bytes"
            )));
        }
        if self.channel_capacity == 0 {
            return Err(ServerError::Config(
                "channel_capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Builds the standard chain for `handler`: logging, then auth, then the
/// handler itself.
pub fn standard_chain<H: Handler>(token: &str, handler: H) -> InterceptorChain {
    InterceptorChain::new(Dispatcher::new(handler))
        .with(LoggingInterceptor)
        .with(AuthInterceptor::new(token))
}

/// The file server.
pub struct FileServer {
    config: ServerConfig,
    chain: Arc<InterceptorChain>,
    cancel: CancellationToken,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl FileServer {
    /// Creates a server running `chain` for every call.
    pub fn new(config: ServerConfig, chain: InterceptorChain) -> Arc<Self> {
        Arc::new(Self {
            config,
            chain: Arc::new(chain),
            cancel: CancellationToken::new(),
            local_addr: Mutex::new(None),
        })
    }

    /// Creates a server for `service` behind the standard chain.
    pub fn with_service<S: Storage>(
        config: ServerConfig,
        service: TransferService<S>,
    ) -> Result<Arc<Self>, ServerError> {
        config.validate()?;
        let chain = standard_chain(&config.token, service);
        Ok(Self::new(config, chain))
    }

    /// Creates a server over the configured storage root.
    pub fn from_config(config: ServerConfig) -> Result<Arc<Self>, ServerError> {
        let service = TransferService::new(FsStorage::new(&config.storage_root))
            .with_max_chunk_size(config.max_chunk_size)
            .with_chunk_interval(config.chunk_interval);
        Self::with_service(config, service)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the local address the server is listening on.
    ///
    /// Only available after [`run`](Self::run) binds the socket.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }

    /// Stops accepting connections. Calls already running finish on their own.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Binds the configured address and serves until [`shutdown`](Self::shutdown).
    pub async fn run(self: &Arc<Self>) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serves connections from an already bound listener.
    pub async fn serve(self: &Arc<Self>, listener: TcpListener) -> Result<(), ServerError> {
        let local_addr = listener.local_addr()?;
        *self.local_addr.lock().await = Some(local_addr);
        info!("file server listening on {local_addr}");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("server shutting down");
                    break Ok(());
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            if let Err(e) = stream.set_nodelay(true) {
                                debug!(%peer_addr, "failed to set TCP_NODELAY: {e}");
                            }
                            let server = Arc::clone(self);
                            tokio::spawn(async move {
                                if let Err(e) = server.serve_connection(stream, Some(peer_addr)).await {
                                    warn!(%peer_addr, "connection error: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            error!("accept error: {e}");
                        }
                    }
                }
            }
        }
    }

    /// Serves the single call carried by `io`.
    ///
    /// `io` may be any byte stream, such as a TLS session wrapping a socket.
    pub async fn serve_connection<IO>(
        &self,
        io: IO,
        peer: Option<SocketAddr>,
    ) -> Result<(), ServerError>
    where
        IO: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (incoming, completion) = accept_call(io, self.config.channel_capacity).await?;
        let IncomingCall {
            header,
            context,
            channel,
        } = incoming;

        let outcome = match Method::from_name(&header.method) {
            Some(method) => {
                let call = ServerCall {
                    method,
                    metadata: header.metadata,
                    peer,
                    context,
                    channel,
                    auth: None,
                };
                self.chain.run(call).await
            }
            None => {
                warn!(method = %header.method, ?peer, "rejecting unknown method");
                drop(channel);
                Err(Status::unimplemented(format!(
                    "unknown method: {}",
                    header.method
                )))
            }
        };

        completion.finish(outcome).await;
        Ok(())
    }
}
