//! Ordered interceptor chain in front of the call endpoint.
//!
//! Each interceptor receives the call plus a [`Next`] capability for the
//! remainder of the chain and decides whether to invoke it. The chain is
//! assembled once, at registration time, and shared by every connection.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;

use filestream_protocol::{Message, Metadata, Method, Status};

use crate::auth::AuthContext;
use crate::channel::DuplexChannel;
use crate::context::CallContext;

/// A boxed future resolving to the call outcome.
pub type CallFuture<'a> = Pin<Box<dyn Future<Output = Result<(), Status>> + Send + 'a>>;

/// An accepted call as seen by interceptors and the endpoint.
pub struct ServerCall {
    pub method: Method,
    pub metadata: Metadata,
    pub peer: Option<SocketAddr>,
    pub context: CallContext,
    /// Sends responses, receives requests.
    pub channel: DuplexChannel<Message, Message>,
    /// Set by the auth interceptor once the caller is authorized.
    pub auth: Option<AuthContext>,
}

/// Terminal step of the chain: the service that handles the call.
pub trait Endpoint: Send + Sync + 'static {
    fn call(&self, call: ServerCall) -> CallFuture<'_>;
}

pub trait Interceptor: Send + Sync + 'static {
    fn intercept<'a>(&'a self, call: ServerCall, next: Next<'a>) -> CallFuture<'a>;
}

/// The rest of the chain after the current interceptor.
pub struct Next<'a> {
    interceptors: &'a [Box<dyn Interceptor>],
    endpoint: &'a dyn Endpoint,
}

impl<'a> Next<'a> {
    pub fn run(self, call: ServerCall) -> CallFuture<'a> {
        match self.interceptors.split_first() {
            Some((first, rest)) => first.intercept(
                call,
                Next {
                    interceptors: rest,
                    endpoint: self.endpoint,
                },
            ),
            None => self.endpoint.call(call),
        }
    }
}

/// Interceptors in registration order, outermost first, then the endpoint.
pub struct InterceptorChain {
    interceptors: Vec<Box<dyn Interceptor>>,
    endpoint: Box<dyn Endpoint>,
}

impl InterceptorChain {
    pub fn new(endpoint: impl Endpoint) -> Self {
        Self {
            interceptors: Vec::new(),
            endpoint: Box::new(endpoint),
        }
    }

    /// Appends an interceptor inside the ones already registered.
    pub fn with(mut self, interceptor: impl Interceptor) -> Self {
        self.interceptors.push(Box::new(interceptor));
        self
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    pub fn run(&self, call: ServerCall) -> CallFuture<'_> {
        Next {
            interceptors: &self.interceptors,
            endpoint: self.endpoint.as_ref(),
        }
        .run(call)
    }
}
