//! Handler trait for the four file-service calls.
//!
//! Implementors provide the call logic while the server framework handles
//! connections, interceptors and the terminal status. Default
//! implementations reject with `Unimplemented`, so a handler only needs to
//! override the calls it serves.

use filestream_protocol::{Method, Status};
use filestream_rpc::{CallFuture, Endpoint, ServerCall};

/// A boxed future returned by handler methods.
pub type HandlerFuture<'a> = CallFuture<'a>;

/// Each method receives the accepted call: its metadata, context and the
/// duplex channel. Returning `Err` ends the call with that status.
pub trait Handler: Send + Sync + 'static {
    /// `ListFiles`: one `ListRequest`, one `ListResponse`.
    fn list_files(&self, call: ServerCall) -> HandlerFuture<'_> {
        not_implemented(call)
    }

    /// `Download`: one `DownloadRequest`, a stream of `DownloadResponse`.
    fn download(&self, call: ServerCall) -> HandlerFuture<'_> {
        not_implemented(call)
    }

    /// `Upload`: a stream of `UploadRequest`, one `UploadResponse`.
    fn upload(&self, call: ServerCall) -> HandlerFuture<'_> {
        not_implemented(call)
    }

    /// `UploadAndNotifyProgress`: one `ProgressResponse` per `ProgressRequest`.
    fn upload_and_notify_progress(&self, call: ServerCall) -> HandlerFuture<'_> {
        not_implemented(call)
    }
}

fn not_implemented(call: ServerCall) -> HandlerFuture<'static> {
    let method = call.method;
    Box::pin(async move { Err(Status::unimplemented(format!("{method} is not implemented"))) })
}

/// Routes calls to the [`Handler`] method matching their [`Method`].
///
/// This is the terminal step of the interceptor chain.
pub struct Dispatcher<H> {
    handler: H,
}

impl<H: Handler> Dispatcher<H> {
    pub fn new(handler: H) -> Self {
        Self { handler }
    }
}

impl<H: Handler> Endpoint for Dispatcher<H> {
    fn call(&self, call: ServerCall) -> CallFuture<'_> {
        match call.method {
            Method::ListFiles => self.handler.list_files(call),
            Method::Download => self.handler.download(call),
            Method::Upload => self.handler.upload(call),
            Method::UploadAndNotifyProgress => self.handler.upload_and_notify_progress(call),
        }
    }
}

#[cfg(test)]
mod tests {
    use filestream_protocol::{Code, Metadata};
    use filestream_rpc::{CallContext, pair};

    use super::*;

    struct ListOnly;

    impl Handler for ListOnly {
        fn list_files(&self, _call: ServerCall) -> HandlerFuture<'_> {
            Box::pin(async { Ok(()) })
        }
    }

    fn call(method: Method) -> ServerCall {
        let (channel, _peer) = pair(1);
        ServerCall {
            method,
            metadata: Metadata::new(),
            peer: None,
            context: CallContext::default(),
            channel,
            auth: None,
        }
    }

    #[tokio::test]
    async fn routes_by_method() {
        let dispatcher = Dispatcher::new(ListOnly);
        assert!(dispatcher.call(call(Method::ListFiles)).await.is_ok());

        for method in [
            Method::Download,
            Method::Upload,
            Method::UploadAndNotifyProgress,
        ] {
            let err = dispatcher.call(call(method)).await.unwrap_err();
            assert_eq!(err.code, Code::Unimplemented);
            assert!(err.message.contains(method.name()));
        }
    }
}
