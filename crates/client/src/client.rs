//! The file-service client.

use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

use filestream_protocol::{
    CallHeader, DownloadRequest, DownloadResponse, ListRequest, ListResponse, Message, Metadata,
    Method, ProgressRequest, ProgressResponse, Status, UploadRequest, UploadResponse,
};
use filestream_rpc::{CallContext, DuplexChannel, open_call};
use filestream_transfer::{Checksum, ChunkReader, Direction, ProgressEvent, TransferSession};

use crate::ClientError;
use crate::config::ClientConfig;
use crate::connector::{Connector, TcpConnector};

type Channel = DuplexChannel<Message, Message>;

/// Outcome of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSummary {
    pub size: u64,
    /// SHA-256 hex digest, verified against the server's.
    pub checksum: String,
    pub chunks: u64,
}

/// Client for the four file calls.
///
/// Every call opens a fresh stream through the [`Connector`], carries the
/// configured bearer token and deadline, and is cancelled on the server
/// if the caller drops it midway.
pub struct FileClient<C = TcpConnector> {
    connector: C,
    config: ClientConfig,
}

impl FileClient<TcpConnector> {
    /// Creates a TCP client for `config.addr`.
    pub fn new(config: ClientConfig) -> Self {
        let connector = TcpConnector::new(config.addr.clone());
        Self { connector, config }
    }
}

impl<C: Connector> FileClient<C> {
    pub fn with_connector(connector: C, config: ClientConfig) -> Self {
        Self { connector, config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Replaces the per-call deadline.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Names of the files in the server's storage root.
    pub async fn list(&self) -> Result<Vec<String>, ClientError> {
        let mut call = self.start(Method::ListFiles).await?;
        let ctx = call.context.clone();

        guarded(&ctx, call.channel.send(ListRequest {}.into())).await?;
        call.channel.close_send();
        let response: ListResponse = receive_one(&ctx, &mut call.channel).await?;
        expect_end(&ctx, &mut call.channel).await?;

        call.guard.disarm();
        Ok(response.file_names)
    }

    /// Starts downloading `file_name`.
    ///
    /// A missing file surfaces as `NotFound` from the first
    /// [`next_chunk`](DownloadStream::next_chunk).
    pub async fn download(&self, file_name: &str) -> Result<DownloadStream, ClientError> {
        let mut call = self.start(Method::Download).await?;
        let request = DownloadRequest {
            file_name: file_name.to_string(),
        };
        guarded(&call.context, call.channel.send(request.into())).await?;
        call.channel.close_send();

        Ok(DownloadStream {
            call,
            session: TransferSession::new(Direction::Download),
        })
    }

    /// Downloads `file_name` into `writer`, returning the byte count.
    pub async fn download_to<W>(&self, file_name: &str, writer: &mut W) -> Result<u64, ClientError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut stream = self.download(file_name).await?;
        while let Some(chunk) = stream.next_chunk().await? {
            writer.write_all(&chunk).await?;
        }
        writer.flush().await?;
        Ok(stream.bytes_received())
    }

    /// Uploads everything `source` yields, in chunks of `max_chunk_size`.
    pub async fn upload<R>(&self, source: R) -> Result<UploadSummary, ClientError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut call = self.start(Method::Upload).await?;
        let ctx = call.context.clone();
        let mut reader = ChunkReader::new(source, self.config.max_chunk_size)?;
        let mut session = TransferSession::new(Direction::Upload);
        let mut checksum = Checksum::new();

        while let Some(chunk) = guarded(&ctx, reader.next_chunk()).await? {
            session.record_chunk(chunk.len())?;
            checksum.update(chunk.data());
            self.pace(&ctx, session.chunks()).await?;
            let request = UploadRequest {
                data: chunk.into_data(),
            };
            if let Err(err) = guarded(&ctx, call.channel.send(request.into())).await {
                return Err(terminal_status(&ctx, &mut call.channel).await.unwrap_or(err));
            }
        }
        call.channel.close_send();

        let response: UploadResponse = receive_one(&ctx, &mut call.channel).await?;
        expect_end(&ctx, &mut call.channel).await?;
        call.guard.disarm();
        session.complete()?;

        let sent = session.bytes_transferred();
        if response.size != sent {
            return Err(ClientError::SizeMismatch {
                sent,
                reported: response.size,
            });
        }
        let local = checksum.finalize_hex();
        if !response.checksum.is_empty() && response.checksum != local {
            return Err(ClientError::ChecksumMismatch {
                local,
                remote: response.checksum,
            });
        }

        info!(bytes = sent, chunks = session.chunks(), "upload completed");
        Ok(UploadSummary {
            size: sent,
            checksum: local,
            chunks: session.chunks(),
        })
    }

    /// Uploads `source` while receiving one progress event per chunk.
    ///
    /// Sending and receiving run concurrently; the first error from either
    /// side ends the call and drops the other. Returns the total bytes the
    /// server acknowledged.
    pub async fn upload_with_progress<R, F>(
        &self,
        source: R,
        mut on_progress: F,
    ) -> Result<u64, ClientError>
    where
        R: AsyncRead + Unpin + Send,
        F: FnMut(ProgressEvent) + Send,
    {
        let Call {
            channel,
            context: ctx,
            mut guard,
        } = self.start(Method::UploadAndNotifyProgress).await?;
        let (mut tx, mut rx) = channel.split();
        let mut reader = ChunkReader::new(source, self.config.max_chunk_size)?;
        // Cumulative totals in send order, to check each acknowledgement.
        let (sent_tx, mut sent_rx) = mpsc::unbounded_channel::<u64>();

        // A failed send is held back until the receive side finished, since
        // the server's status arrives there.
        let send = async {
            let mut session = TransferSession::new(Direction::Upload);
            while let Some(chunk) = guarded(&ctx, reader.next_chunk()).await? {
                let total = session.record_chunk(chunk.len())?;
                self.pace(&ctx, session.chunks()).await?;
                let request = ProgressRequest {
                    data: chunk.into_data(),
                };
                if let Err(err) = guarded(&ctx, tx.send(request.into())).await {
                    debug!("send failed, waiting for the call status: {err}");
                    drop(sent_tx);
                    return Ok(Err(err));
                }
                let _ = sent_tx.send(total);
            }
            tx.close_send();
            drop(sent_tx);
            session.complete()?;
            debug!(bytes = session.bytes_transferred(), "all chunks sent");
            Ok::<Result<u64, ClientError>, ClientError>(Ok(session.bytes_transferred()))
        };

        let receive = async {
            let mut acknowledged = 0;
            while let Some(message) = guarded(&ctx, rx.receive()).await? {
                let ack = ProgressResponse::try_from(message)?;
                let expected = sent_rx.recv().await;
                if expected != Some(ack.received) {
                    return Err(ClientError::ProgressMismatch {
                        expected,
                        reported: ack.received,
                    });
                }
                acknowledged = ack.received;
                on_progress(ProgressEvent {
                    bytes_so_far: acknowledged,
                });
            }
            if let Some(expected) = sent_rx.recv().await {
                return Err(ClientError::ProgressMismatch {
                    expected: Some(expected),
                    reported: acknowledged,
                });
            }
            Ok::<u64, ClientError>(acknowledged)
        };

        let (sent, acknowledged) = tokio::try_join!(send, receive)?;
        let sent = sent?;
        guard.disarm();
        info!(bytes = sent, acknowledged, "upload with progress completed");
        Ok(acknowledged)
    }

    /// Connects and opens a call for `method`.
    async fn start(&self, method: Method) -> Result<Call, ClientError> {
        self.config.validate()?;
        let ctx = CallContext::new(self.config.timeout);
        let io = guarded(&ctx, async {
            self.connector
                .connect()
                .await
                .map_err(|e| Status::unavailable(format!("connect failed: {e}")))
        })
        .await?;

        let header = CallHeader::new(
            method,
            Metadata::with_bearer(&self.config.token),
            ctx.remaining(),
        );
        let channel = open_call(io, header, ctx.clone(), self.config.channel_capacity)
            .await
            .map_err(Status::from)?;
        debug!(%method, "call opened");

        Ok(Call {
            channel,
            context: ctx.clone(),
            guard: CallGuard::new(ctx),
        })
    }

    /// Waits `chunk_interval` before every chunk but the first.
    async fn pace(&self, ctx: &CallContext, chunks: u64) -> Result<(), ClientError> {
        if chunks > 1 && !self.config.chunk_interval.is_zero() {
            guarded(ctx, async {
                tokio::time::sleep(self.config.chunk_interval).await;
                Ok::<(), Status>(())
            })
            .await?;
        }
        Ok(())
    }
}

/// Stream of downloaded chunks.
///
/// Dropping it before the end cancels the download on the server.
pub struct DownloadStream {
    call: Call,
    session: TransferSession,
}

impl DownloadStream {
    /// The next chunk, `None` once the server finished cleanly.
    pub async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, ClientError> {
        let result = self.receive().await;
        match &result {
            Ok(Some(_)) => {}
            Ok(None) => {
                self.call.guard.disarm();
                self.session.settle(&Ok(()));
            }
            Err(err) => self.session.settle(&Err(err.to_status())),
        }
        result
    }

    async fn receive(&mut self) -> Result<Option<Vec<u8>>, ClientError> {
        let Some(message) = guarded(&self.call.context, self.call.channel.receive()).await? else {
            return Ok(None);
        };
        let chunk = DownloadResponse::try_from(message)?;
        self.session.record_chunk(chunk.data.len())?;
        Ok(Some(chunk.data))
    }

    /// Reads the remaining chunks into one buffer.
    pub async fn collect(mut self) -> Result<Vec<u8>, ClientError> {
        let mut data = Vec::new();
        while let Some(chunk) = self.next_chunk().await? {
            data.extend_from_slice(&chunk);
        }
        Ok(data)
    }

    pub fn bytes_received(&self) -> u64 {
        self.session.bytes_transferred()
    }

    pub fn chunks_received(&self) -> u64 {
        self.session.chunks()
    }

    pub fn session(&self) -> &TransferSession {
        &self.session
    }
}

struct Call {
    channel: Channel,
    context: CallContext,
    guard: CallGuard,
}

/// Cancels the call when dropped before [`disarm`](Self::disarm).
struct CallGuard {
    ctx: CallContext,
    armed: bool,
}

impl CallGuard {
    fn new(ctx: CallContext) -> Self {
        Self { ctx, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        if self.armed && !self.ctx.is_cancelled() {
            debug!("call dropped before completion, cancelling");
            self.ctx.cancel(Status::cancelled("call cancelled by caller"));
        }
    }
}

/// Runs `fut` unless the call's deadline passes or it is cancelled first.
async fn guarded<T, E, F>(ctx: &CallContext, fut: F) -> Result<T, ClientError>
where
    F: Future<Output = Result<T, E>>,
    ClientError: From<E>,
{
    tokio::select! {
        biased;
        status = ctx.done() => Err(status.into()),
        result = fut => result.map_err(ClientError::from),
    }
}

/// Receives the single response of a unary or client-streaming call.
async fn receive_one<T>(ctx: &CallContext, channel: &mut Channel) -> Result<T, ClientError>
where
    T: TryFrom<Message, Error = Status>,
{
    match guarded(ctx, channel.receive()).await? {
        Some(message) => Ok(T::try_from(message)?),
        None => Err(Status::internal("call ended without a response").into()),
    }
}

/// Drains `channel` for the status that ended the call early, if any.
async fn terminal_status(ctx: &CallContext, channel: &mut Channel) -> Option<ClientError> {
    loop {
        match guarded(ctx, channel.receive()).await {
            Ok(Some(_)) => continue,
            Ok(None) => return None,
            Err(err) => return Some(err),
        }
    }
}

/// Waits for the trailing status after the single response.
async fn expect_end(ctx: &CallContext, channel: &mut Channel) -> Result<(), ClientError> {
    match guarded(ctx, channel.receive()).await? {
        None => Ok(()),
        Some(extra) => Err(Status::invalid_argument(format!(
            "unexpected {} message after the response",
            extra.kind()
        ))
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use filestream_protocol::Code;
    use filestream_rpc::{IncomingCall, accept_call};
    use filestream_transfer::{SessionState, checksum_bytes};
    use tokio::io::DuplexStream;
    use tokio::sync::oneshot;

    use super::*;
    use crate::connector::ConnectFuture;

    /// Hands the server end of an in-memory stream to the test.
    struct MemoryConnector {
        tx: mpsc::UnboundedSender<DuplexStream>,
    }

    impl Connector for MemoryConnector {
        type Io = DuplexStream;

        fn connect(&self) -> ConnectFuture<'_, DuplexStream> {
            Box::pin(async move {
                let (client, server) = tokio::io::duplex(4096);
                self.tx
                    .send(server)
                    .map_err(|_| io::Error::other("server gone"))?;
                Ok(client)
            })
        }
    }

    /// Serves exactly one call with `handler`.
    fn fake_server<F, Fut>(handler: F) -> FileClient<MemoryConnector>
    where
        F: FnOnce(IncomingCall) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), Status>> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let io = rx.recv().await.unwrap();
            let (call, completion) = accept_call(io, 8).await.unwrap();
            let outcome = handler(call).await;
            completion.finish(outcome).await;
        });
        FileClient::with_connector(MemoryConnector { tx }, ClientConfig::new("memory", "t"))
    }

    fn chunk(data: &[u8]) -> Message {
        DownloadResponse {
            data: data.to_vec(),
        }
        .into()
    }

    #[tokio::test]
    async fn list_sends_bearer_token() {
        let client = fake_server(|call| async move {
            assert_eq!(call.header.method, "ListFiles");
            assert_eq!(call.header.metadata.get("authorization"), Some("Bearer t"));
            assert!(call.header.timeout_ms.is_some());

            let mut channel = call.channel;
            let request = channel.receive().await?.unwrap();
            ListRequest::try_from(request)?;
            let response = ListResponse {
                file_names: vec!["a.txt".into()],
            };
            channel.send(response.into()).await
        });

        assert_eq!(client.list().await.unwrap(), ["a.txt"]);
    }

    #[tokio::test]
    async fn not_found_surfaces_as_code() {
        let client = fake_server(|_call| async move {
            Err(Status::not_found("file was not found"))
        });

        let mut stream = client.download("nope.txt").await.unwrap();
        let err = stream.next_chunk().await.unwrap_err();
        assert_eq!(err.code(), Code::NotFound);
        assert_eq!(stream.chunks_received(), 0);
        assert_eq!(stream.session().state(), SessionState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn download_deadline_reaches_server() {
        let (seen_tx, seen_rx) = oneshot::channel();
        let client = fake_server(move |call| async move {
            let IncomingCall {
                context,
                mut channel,
                ..
            } = call;
            channel.receive().await?;
            channel.send(chunk(b"hello")).await?;

            let status = context.done().await;
            let _ = seen_tx.send(status.code);
            Err::<(), Status>(status)
        })
        .with_timeout(Some(Duration::from_secs(2)));

        let mut stream = client.download("a.txt").await.unwrap();
        assert_eq!(stream.next_chunk().await.unwrap().unwrap(), b"hello");

        let err = stream.next_chunk().await.unwrap_err();
        assert_eq!(err.code(), Code::DeadlineExceeded);
        assert_eq!(stream.session().state(), SessionState::Cancelled);
        assert_eq!(seen_rx.await.unwrap(), Code::DeadlineExceeded);
    }

    #[tokio::test]
    async fn dropping_download_cancels_call() {
        let (seen_tx, seen_rx) = oneshot::channel();
        let client = fake_server(move |call| async move {
            let IncomingCall {
                context,
                mut channel,
                ..
            } = call;
            channel.receive().await?;
            channel.send(chunk(b"hello")).await?;

            let status = context.done().await;
            let _ = seen_tx.send(status.code);
            Err::<(), Status>(status)
        });

        let mut stream = client.download("a.txt").await.unwrap();
        assert!(stream.next_chunk().await.unwrap().is_some());
        drop(stream);

        assert_eq!(seen_rx.await.unwrap(), Code::Cancelled);
    }

    #[tokio::test]
    async fn upload_detects_checksum_mismatch() {
        let client = fake_server(|call| async move {
            let mut channel = call.channel;
            let mut size = 0;
            while let Some(message) = channel.receive().await? {
                size += UploadRequest::try_from(message)?.data.len() as u64;
            }
            let response = UploadResponse {
                size,
                checksum: checksum_bytes(b"something else"),
            };
            channel.send(response.into()).await
        });

        let err = client.upload(&b"hello world!"[..]).await.unwrap_err();
        assert!(matches!(err, ClientError::ChecksumMismatch { .. }));
    }

    #[tokio::test]
    async fn upload_summary() {
        let client = fake_server(|call| async move {
            let mut channel = call.channel;
            let mut data = Vec::new();
            while let Some(message) = channel.receive().await? {
                data.extend(UploadRequest::try_from(message)?.data);
            }
            let response = UploadResponse {
                size: data.len() as u64,
                checksum: checksum_bytes(&data),
            };
            channel.send(response.into()).await
        });

        let summary = client.upload(&b"hello world!"[..]).await.unwrap();
        assert_eq!(summary.size, 12);
        assert_eq!(summary.chunks, 3);
        assert_eq!(summary.checksum, checksum_bytes(b"hello world!"));
    }

    fn progress_server(skew: u64) -> FileClient<MemoryConnector> {
        fake_server(move |call| async move {
            let mut channel = call.channel;
            let mut total = 0;
            while let Some(message) = channel.receive().await? {
                total += ProgressRequest::try_from(message)?.data.len() as u64;
                channel
                    .send(ProgressResponse::for_received(total + skew).into())
                    .await?;
            }
            Ok(())
        })
    }

    #[tokio::test]
    async fn progress_events_follow_chunks() {
        let client = progress_server(0);
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();

        let total = client
            .upload_with_progress(&b"hello world!"[..], move |event| {
                sink.lock().unwrap().push(event.bytes_so_far)
            })
            .await
            .unwrap();

        assert_eq!(total, 12);
        assert_eq!(*events.lock().unwrap(), [5, 10, 12]);
    }

    #[tokio::test]
    async fn progress_mismatch_fails_the_call() {
        let client = progress_server(1);
        let err = client
            .upload_with_progress(&b"hello world!"[..], |_| {})
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::ProgressMismatch {
                expected: Some(5),
                reported: 6
            }
        ));
    }

    #[tokio::test]
    async fn connect_failure_is_unavailable() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let client =
            FileClient::with_connector(MemoryConnector { tx }, ClientConfig::new("memory", "t"));
        let err = client.list().await.unwrap_err();
        assert_eq!(err.code(), Code::Unavailable);
    }
}
