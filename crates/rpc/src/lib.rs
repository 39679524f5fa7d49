//! Call plumbing for filestream: duplex channels, deadlines, interceptors
//! and the pumps that carry a call over a byte stream.
//!
//! One byte stream carries exactly one call. The server side is
//! [`transport::accept_call`], the client side [`transport::open_call`];
//! both hand application code a [`DuplexChannel`] of protocol messages.

pub mod auth;
pub mod channel;
pub mod context;
pub mod error;
pub mod interceptor;
pub mod logging;
pub mod transport;
pub mod wire;

pub use auth::{AuthContext, AuthInterceptor, authorize, validate_token};
pub use channel::{DuplexChannel, RecvHalf, SendHalf, Trailer, pair};
pub use context::CallContext;
pub use error::RpcError;
pub use interceptor::{CallFuture, Endpoint, Interceptor, InterceptorChain, Next, ServerCall};
pub use logging::LoggingInterceptor;
pub use transport::{CallCompletion, IncomingCall, accept_call, open_call};
