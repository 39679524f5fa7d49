//! Call logging.

use std::time::Instant;

use tracing::{info, warn};

use crate::interceptor::{CallFuture, Interceptor, Next, ServerCall};

/// Logs every call on the way in and its outcome on the way out.
///
/// Register it first so it also sees calls rejected further down the
/// chain. Only metadata keys are logged, never values.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingInterceptor;

impl Interceptor for LoggingInterceptor {
    fn intercept<'a>(&'a self, call: ServerCall, next: Next<'a>) -> CallFuture<'a> {
        Box::pin(async move {
            let method = call.method;
            let peer = call
                .peer
                .map_or_else(|| "-".to_string(), |addr| addr.to_string());
            let keys: Vec<&str> = call.metadata.keys().collect();
            info!(
                %method,
                shape = ?method.shape(),
                %peer,
                metadata = ?keys,
                timeout = ?call.context.remaining(),
                "call started"
            );

            let started = Instant::now();
            let result = next.run(call).await;
            let elapsed = started.elapsed();

            match &result {
                Ok(()) => info!(%method, %peer, code = "ok", ?elapsed, "call finished"),
                Err(status) => warn!(
                    %method,
                    %peer,
                    code = %status.code,
                    message = %status.message,
                    ?elapsed,
                    "call failed"
                ),
            }
            result
        })
    }
}
