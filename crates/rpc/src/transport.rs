//! Read/write pumps binding a call's byte stream to a [`DuplexChannel`].
//!
//! Each side splits the stream and runs two background tasks: a read pump
//! turning frames into channel items and a write pump doing the reverse.
//! Application code only ever sees the channel and the [`CallContext`].

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use filestream_protocol::constants::OPEN_TIMEOUT;
use filestream_protocol::{CallHeader, Code, Frame, Message, Status};

use crate::channel::{self, DuplexChannel, RecvHalf, SendHalf, Trailer};
use crate::context::CallContext;
use crate::error::RpcError;
use crate::wire::{read_frame, write_frame};

/// How long a finished call waits for the client to close its side.
pub const LINGER_TIMEOUT: Duration = Duration::from_secs(2);

/// A call accepted on the server side.
pub struct IncomingCall {
    pub header: CallHeader,
    /// Carries the client's deadline; cancelled by a client `cancel` frame
    /// or a broken connection.
    pub context: CallContext,
    /// Sends responses, receives requests.
    pub channel: DuplexChannel<Message, Message>,
}

/// Delivers the outcome of an [`IncomingCall`] and tears down its pumps.
///
/// Dropping it without calling [`finish`](Self::finish) aborts the pumps,
/// so the client sees the connection close instead of a success status.
pub struct CallCompletion {
    trailer: Option<Trailer<Message>>,
    read_pump: JoinHandle<()>,
    write_pump: JoinHandle<()>,
}

impl CallCompletion {
    /// Sends the terminal status once every response is flushed.
    ///
    /// The status goes out after the last message the handler sent, so the
    /// handler's channel must already be dropped.
    pub async fn finish(mut self, outcome: Result<(), Status>) {
        if let Some(trailer) = self.trailer.take() {
            trailer.finish(outcome).await;
        }
        if let Err(e) = (&mut self.write_pump).await {
            warn!("write pump failed: {e}");
        }
        // Drain until the client closes: unread request bytes at close time
        // reset the connection and can drop the status.
        if tokio::time::timeout(LINGER_TIMEOUT, &mut self.read_pump)
            .await
            .is_err()
        {
            debug!("client kept the connection open after the status");
        }
    }
}

impl Drop for CallCompletion {
    fn drop(&mut self) {
        self.read_pump.abort();
        self.write_pump.abort();
    }
}

/// Reads the `open` frame from `io` and starts the server-side pumps.
pub async fn accept_call<IO>(
    io: IO,
    capacity: usize,
) -> Result<(IncomingCall, CallCompletion), RpcError>
where
    IO: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(io);

    let header = match tokio::time::timeout(OPEN_TIMEOUT, read_frame(&mut reader)).await {
        Ok(Ok(Some(Frame::Open(header)))) => header,
        Ok(Ok(Some(other))) => {
            let err = RpcError::Protocol(format!("expected open frame, got {}", other.kind()));
            let status = Status::invalid_argument(err.to_string());
            let _ = write_frame(&mut writer, &Frame::Status(status)).await;
            return Err(err);
        }
        Ok(Ok(None)) => {
            return Err(RpcError::Protocol("connection closed before open".into()));
        }
        Ok(Err(e)) => return Err(e),
        Err(_) => return Err(RpcError::Timeout),
    };

    let context = CallContext::new(header.timeout());
    let (server_end, pump_end) = channel::pair(capacity);
    let Some(trailer) = server_end.trailer() else {
        return Err(RpcError::Protocol("response channel closed".into()));
    };
    let (inbound, outbound) = pump_end.split();

    let read_pump = tokio::spawn(server_read_pump(reader, inbound, context.clone()));
    let write_pump = tokio::spawn(server_write_pump(writer, outbound, context.clone()));

    Ok((
        IncomingCall {
            header,
            context,
            channel: server_end,
        },
        CallCompletion {
            trailer: Some(trailer),
            read_pump,
            write_pump,
        },
    ))
}

/// Client frames to handler requests.
async fn server_read_pump<R>(
    mut reader: ReadHalf<R>,
    mut inbound: SendHalf<Message>,
    ctx: CallContext,
) where
    R: AsyncRead,
{
    loop {
        let status = match read_frame(&mut reader).await {
            Ok(Some(Frame::Message { message })) => {
                trace!(kind = message.kind(), "request received");
                if inbound.send(message).await.is_err() {
                    trace!("handler stopped receiving, dropping request");
                }
                continue;
            }
            Ok(Some(Frame::HalfClose)) => {
                debug!("client half-closed");
                inbound.close_send();
                continue;
            }
            Ok(Some(Frame::Cancel { code })) => {
                let code = if code == Code::Ok { Code::Cancelled } else { code };
                Status::new(code, "call cancelled by client")
            }
            Ok(Some(other)) => {
                Status::invalid_argument(format!("unexpected {} frame from client", other.kind()))
            }
            Ok(None) => Status::unavailable("client disconnected"),
            Err(e) => Status::from(e),
        };

        debug!(code = %status.code, "inbound side ended: {}", status.message);
        ctx.cancel(status.clone());
        inbound.abort(status).await;
        break;
    }
}

/// Handler responses to frames, then the terminal status.
async fn server_write_pump<W>(
    mut writer: WriteHalf<W>,
    mut outbound: RecvHalf<Message>,
    ctx: CallContext,
) where
    W: AsyncWrite,
{
    let status = loop {
        match outbound.receive().await {
            Ok(Some(message)) => match write_frame(&mut writer, &Frame::Message { message }).await {
                Ok(()) => {}
                Err(RpcError::Io(e)) => {
                    warn!("failed to write response: {e}");
                    ctx.cancel(Status::unavailable(format!("connection lost: {e}")));
                    return;
                }
                // Nothing was written, the connection is still usable.
                Err(e) => {
                    warn!("failed to encode response: {e}");
                    let status = Status::internal(format!("failed to encode response: {e}"));
                    ctx.cancel(status.clone());
                    break status;
                }
            },
            Ok(None) => break Status::ok(),
            Err(status) => break status,
        }
    };

    if let Err(e) = write_frame(&mut writer, &Frame::Status(status)).await {
        debug!("failed to write call status: {e}");
    }
    let _ = writer.shutdown().await;
}

/// Opens a call on `io` and starts the client-side pumps.
///
/// Cancelling `context` (or letting its deadline pass) sends a `cancel`
/// frame carrying the cause and ends the returned channel with that status.
pub async fn open_call<IO>(
    io: IO,
    header: CallHeader,
    context: CallContext,
    capacity: usize,
) -> Result<DuplexChannel<Message, Message>, RpcError>
where
    IO: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, mut writer) = tokio::io::split(io);
    write_frame(&mut writer, &Frame::Open(header)).await?;

    let (client_end, pump_end) = channel::pair(capacity);
    let (inbound, outbound) = pump_end.split();
    let finished = CancellationToken::new();

    tokio::spawn(client_read_pump(reader, inbound, context.clone(), finished.clone()));
    tokio::spawn(client_write_pump(writer, outbound, context, finished));

    Ok(client_end)
}

/// Server frames to responses, until the terminal status.
async fn client_read_pump<R>(
    mut reader: ReadHalf<R>,
    mut inbound: SendHalf<Message>,
    ctx: CallContext,
    finished: CancellationToken,
) where
    R: AsyncRead,
{
    loop {
        let frame = tokio::select! {
            biased;
            status = ctx.done() => {
                inbound.abort(status).await;
                break;
            }
            frame = read_frame(&mut reader) => frame,
        };

        match frame {
            Ok(Some(Frame::Message { message })) => {
                trace!(kind = message.kind(), "response received");
                let delivered = tokio::select! {
                    biased;
                    status = ctx.done() => {
                        inbound.abort(status).await;
                        break;
                    }
                    sent = inbound.send(message) => sent,
                };
                if delivered.is_err() {
                    debug!("caller stopped receiving responses");
                    break;
                }
            }
            Ok(Some(Frame::Status(status))) => {
                debug!(code = %status.code, "call status received");
                if status.is_ok() {
                    inbound.close_send();
                } else {
                    inbound.abort(status).await;
                }
                break;
            }
            Ok(Some(other)) => {
                inbound
                    .abort(Status::invalid_argument(format!(
                        "unexpected {} frame from server",
                        other.kind()
                    )))
                    .await;
                break;
            }
            Ok(None) => {
                inbound
                    .abort(Status::unavailable("connection closed before call status"))
                    .await;
                break;
            }
            Err(e) => {
                inbound.abort(Status::from(e)).await;
                break;
            }
        }
    }
    finished.cancel();
}

/// Requests to frames; end of requests becomes `half_close`, a local
/// abort or cancellation becomes `cancel`.
async fn client_write_pump<W>(
    mut writer: WriteHalf<W>,
    mut outbound: RecvHalf<Message>,
    ctx: CallContext,
    finished: CancellationToken,
) where
    W: AsyncWrite,
{
    let cancel_code = loop {
        let next = tokio::select! {
            biased;
            status = ctx.done() => break Some(status.code),
            _ = finished.cancelled() => break None,
            next = outbound.receive() => next,
        };

        match next {
            Ok(Some(message)) => match write_frame(&mut writer, &Frame::message(message)).await {
                Ok(()) => {}
                // A broken connection leaves the outcome to the read pump,
                // which either still gets the server's status or sees the
                // failure itself.
                Err(RpcError::Io(e)) => {
                    debug!("failed to write request: {e}");
                    return;
                }
                Err(e) => {
                    warn!("failed to encode request: {e}");
                    let status = Status::from(e);
                    ctx.cancel(status.clone());
                    break Some(status.code);
                }
            },
            Ok(None) => {
                if let Err(e) = write_frame(&mut writer, &Frame::HalfClose).await {
                    debug!("failed to write half-close: {e}");
                    return;
                }
                tokio::select! {
                    biased;
                    status = ctx.done() => break Some(status.code),
                    _ = finished.cancelled() => break None,
                }
            }
            Err(status) => {
                ctx.cancel(status.clone());
                break Some(status.code);
            }
        }
    };

    if let Some(code) = cancel_code {
        debug!(%code, "cancelling call");
        let _ = write_frame(&mut writer, &Frame::Cancel { code }).await;
    }
    let _ = writer.shutdown().await;
}
