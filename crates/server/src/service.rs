//! The file service: list, download, upload and upload with progress.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use filestream_protocol::{
    DownloadRequest, DownloadResponse, ListRequest, ListResponse, Message, ProgressRequest,
    ProgressResponse, Status, UploadRequest, UploadResponse,
};
use filestream_rpc::{CallContext, DuplexChannel, ServerCall};
use filestream_transfer::{
    ByteSource, ChunkReader, DEFAULT_MAX_CHUNK_SIZE, Direction, SessionState, SessionSummary,
    Storage, TransferSession, checksum_bytes,
};

use crate::handler::{Handler, HandlerFuture};

/// Callback invoked with the summary of every finished transfer session.
pub type SessionObserver = Box<dyn Fn(&SessionSummary) + Send + Sync>;

type Channel = DuplexChannel<Message, Message>;

/// Serves the four file calls from a [`Storage`] backend.
///
/// Every streaming call owns one [`TransferSession`]; nothing is shared
/// between calls except the storage and the options.
pub struct TransferService<S> {
    storage: Arc<S>,
    max_chunk_size: usize,
    chunk_interval: Duration,
    observer: Option<SessionObserver>,
}

impl<S: Storage> TransferService<S> {
    pub fn new(storage: S) -> Self {
        Self::from_shared(Arc::new(storage))
    }

    pub fn from_shared(storage: Arc<S>) -> Self {
        Self {
            storage,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            chunk_interval: Duration::ZERO,
            observer: None,
        }
    }

    /// Maximum bytes per download message.
    pub fn with_max_chunk_size(mut self, max_chunk_size: usize) -> Self {
        self.max_chunk_size = max_chunk_size;
        self
    }

    /// Pause between consecutive download messages.
    pub fn with_chunk_interval(mut self, interval: Duration) -> Self {
        self.chunk_interval = interval;
        self
    }

    /// Registers a callback for finished sessions.
    pub fn on_session_finished<F>(mut self, f: F) -> Self
    where
        F: Fn(&SessionSummary) + Send + Sync + 'static,
    {
        self.observer = Some(Box::new(f));
        self
    }

    async fn serve_list(&self, mut call: ServerCall) -> Result<(), Status> {
        let ctx = call.context.clone();
        let _request: ListRequest = expect_request(&ctx, &mut call.channel).await?;

        let file_names = ctx
            .guard(async { self.storage.list_entries().await.map_err(Status::from) })
            .await?;
        debug!(count = file_names.len(), "listed storage root");

        ctx.guard(call.channel.send(ListResponse { file_names }.into()))
            .await
    }

    async fn serve_download(&self, mut call: ServerCall) -> Result<(), Status> {
        let ctx = call.context.clone();
        let request: DownloadRequest = expect_request(&ctx, &mut call.channel).await?;

        let (handle, source) = ctx
            .guard(async {
                self.storage
                    .open_for_read(&request.file_name)
                    .await
                    .map_err(Status::from)
            })
            .await?;

        let mut session = TransferSession::with_expected_len(Direction::Download, handle.len());
        info!(
            session_id = session.id(),
            file = handle.name(),
            bytes = handle.len(),
            "download started"
        );

        let outcome = self
            .stream_chunks(&ctx, &mut call.channel, &mut session, source)
            .await;
        self.finish_session(&mut session, &outcome);
        outcome
    }

    async fn stream_chunks(
        &self,
        ctx: &CallContext,
        channel: &mut Channel,
        session: &mut TransferSession,
        source: ByteSource,
    ) -> Result<(), Status> {
        let mut reader = ChunkReader::new(source, self.max_chunk_size)?;
        loop {
            let next = ctx
                .guard(async { reader.next_chunk().await.map_err(Status::from) })
                .await?;
            let Some(chunk) = next else {
                return Ok(());
            };

            if session.chunks() > 0 && !self.chunk_interval.is_zero() {
                ctx.guard(async {
                    tokio::time::sleep(self.chunk_interval).await;
                    Ok(())
                })
                .await?;
            }

            let total = session.record_chunk(chunk.len())?;
            ctx.guard(channel.send(
                DownloadResponse {
                    data: chunk.into_data(),
                }
                .into(),
            ))
            .await?;
            debug!(session_id = session.id(), bytes = total, "download chunk sent");
        }
    }

    async fn serve_upload(&self, mut call: ServerCall) -> Result<(), Status> {
        let ctx = call.context.clone();
        let mut session = TransferSession::new(Direction::Upload);
        debug!(session_id = session.id(), "upload started");

        let outcome: Result<(), Status> = async {
            let mut buffer = Vec::new();
            while let Some(message) = ctx.guard(call.channel.receive()).await? {
                let request = UploadRequest::try_from(message)?;
                session.record_chunk(request.data.len())?;
                buffer.extend_from_slice(&request.data);
            }

            let response = UploadResponse {
                size: buffer.len() as u64,
                checksum: checksum_bytes(&buffer),
            };
            ctx.guard(call.channel.send(response.into())).await
        }
        .await;

        self.finish_session(&mut session, &outcome);
        outcome
    }

    async fn serve_progress(&self, mut call: ServerCall) -> Result<(), Status> {
        let ctx = call.context.clone();
        let mut session = TransferSession::new(Direction::Upload);
        debug!(session_id = session.id(), "upload with progress started");

        let outcome: Result<(), Status> = async {
            while let Some(message) = ctx.guard(call.channel.receive()).await? {
                let request = ProgressRequest::try_from(message)?;
                let received = session.record_chunk(request.data.len())?;
                ctx.guard(call.channel.send(ProgressResponse::for_received(received).into()))
                    .await?;
            }
            Ok::<(), Status>(())
        }
        .await;

        self.finish_session(&mut session, &outcome);
        outcome
    }

    fn finish_session(&self, session: &mut TransferSession, outcome: &Result<(), Status>) {
        session.settle(outcome);
        let summary = session.summary();

        match summary.state {
            SessionState::Completed => info!(
                session_id = %summary.id,
                direction = %summary.direction,
                bytes = summary.bytes_transferred,
                chunks = summary.chunks,
                elapsed = ?summary.elapsed,
                "transfer completed"
            ),
            state => warn!(
                session_id = %summary.id,
                direction = %summary.direction,
                %state,
                bytes = summary.bytes_transferred,
                code = ?summary.error.as_ref().map(|s| s.code),
                "transfer ended early"
            ),
        }

        if let Some(observer) = &self.observer {
            observer(&summary);
        }
    }
}

impl<S: Storage> Handler for TransferService<S> {
    fn list_files(&self, call: ServerCall) -> HandlerFuture<'_> {
        Box::pin(self.serve_list(call))
    }

    fn download(&self, call: ServerCall) -> HandlerFuture<'_> {
        Box::pin(self.serve_download(call))
    }

    fn upload(&self, call: ServerCall) -> HandlerFuture<'_> {
        Box::pin(self.serve_upload(call))
    }

    fn upload_and_notify_progress(&self, call: ServerCall) -> HandlerFuture<'_> {
        Box::pin(self.serve_progress(call))
    }
}

/// Receives the single request of a unary or server-streaming call.
async fn expect_request<T>(ctx: &CallContext, channel: &mut Channel) -> Result<T, Status>
where
    T: TryFrom<Message, Error = Status>,
{
    match ctx.guard(channel.receive()).await? {
        Some(message) => T::try_from(message),
        None => Err(Status::invalid_argument("call closed before its request")),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use filestream_protocol::{Code, Metadata, Method};
    use filestream_rpc::pair;
    use filestream_transfer::FsStorage;
    use tempfile::TempDir;

    use super::*;

    fn storage() -> (TempDir, FsStorage) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"0123456789").unwrap();
        std::fs::write(dir.path().join("twelve.bin"), b"hello world!").unwrap();
        std::fs::create_dir(dir.path().join("d")).unwrap();
        let storage = FsStorage::new(dir.path());
        (dir, storage)
    }

    /// Starts `method` on `service` and returns the client end plus the
    /// handler's outcome.
    fn start<S: Storage>(
        service: Arc<TransferService<S>>,
        method: Method,
        context: CallContext,
    ) -> (Channel, tokio::task::JoinHandle<Result<(), Status>>) {
        let (server_end, client_end) = pair(8);
        let call = ServerCall {
            method,
            metadata: Metadata::new(),
            peer: None,
            context,
            channel: server_end,
            auth: None,
        };
        let handle = tokio::spawn(async move {
            match method {
                Method::ListFiles => service.list_files(call).await,
                Method::Download => service.download(call).await,
                Method::Upload => service.upload(call).await,
                Method::UploadAndNotifyProgress => service.upload_and_notify_progress(call).await,
            }
        });
        (client_end, handle)
    }

    fn recorded() -> (
        Arc<Mutex<Vec<SessionSummary>>>,
        impl Fn(&SessionSummary) + Send + Sync + 'static,
    ) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |s: &SessionSummary| {
            sink.lock().unwrap().push(s.clone())
        })
    }

    #[tokio::test]
    async fn list_skips_directories() {
        let (_dir, storage) = storage();
        let service = Arc::new(TransferService::new(storage));
        let (mut client, handle) = start(service, Method::ListFiles, CallContext::default());

        client.send(ListRequest {}.into()).await.unwrap();
        client.close_send();
        let response = ListResponse::try_from(client.receive().await.unwrap().unwrap()).unwrap();
        assert_eq!(response.file_names, ["a.txt", "twelve.bin"]);
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn download_chunks_twelve_bytes() {
        let (_dir, storage) = storage();
        let (seen, observer) = recorded();
        let service = Arc::new(TransferService::new(storage).on_session_finished(observer));
        let (mut client, handle) = start(service, Method::Download, CallContext::default());

        client
            .send(
                DownloadRequest {
                    file_name: "twelve.bin".into(),
                }
                .into(),
            )
            .await
            .unwrap();
        client.close_send();

        let mut sizes = Vec::new();
        let mut data = Vec::new();
        while let Some(message) = client.receive().await.unwrap() {
            let chunk = DownloadResponse::try_from(message).unwrap();
            sizes.push(chunk.data.len());
            data.extend(chunk.data);
        }
        handle.await.unwrap().unwrap();

        assert_eq!(sizes, [5, 5, 2]);
        assert_eq!(data, b"hello world!");
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].state, SessionState::Completed);
        assert_eq!(seen[0].bytes_transferred, 12);
    }

    #[tokio::test]
    async fn download_missing_file_sends_nothing() {
        let (_dir, storage) = storage();
        let service = Arc::new(TransferService::new(storage));
        let (mut client, handle) = start(service, Method::Download, CallContext::default());

        client
            .send(
                DownloadRequest {
                    file_name: "nope.txt".into(),
                }
                .into(),
            )
            .await
            .unwrap();

        let err = handle.await.unwrap().unwrap_err();
        assert_eq!(err.code, Code::NotFound);
        assert_eq!(client.receive().await.unwrap(), None);
    }

    #[tokio::test]
    async fn download_rejects_traversal() {
        let (_dir, storage) = storage();
        let service = Arc::new(TransferService::new(storage));
        let (mut client, handle) = start(service, Method::Download, CallContext::default());

        client
            .send(
                DownloadRequest {
                    file_name: "../etc/passwd".into(),
                }
                .into(),
            )
            .await
            .unwrap();
        let err = handle.await.unwrap().unwrap_err();
        assert_eq!(err.code, Code::InvalidArgument);
    }

    #[tokio::test(start_paused = true)]
    async fn download_deadline_cancels_session() {
        let (_dir, storage) = storage();
        let (seen, observer) = recorded();
        let service = Arc::new(
            TransferService::new(storage)
                .with_chunk_interval(Duration::from_secs(1))
                .on_session_finished(observer),
        );
        let ctx = CallContext::new(Some(Duration::from_millis(1500)));
        let (mut client, handle) = start(service, Method::Download, ctx);

        client
            .send(
                DownloadRequest {
                    file_name: "twelve.bin".into(),
                }
                .into(),
            )
            .await
            .unwrap();

        let mut chunks = 0;
        while let Ok(Some(_)) = client.receive().await {
            chunks += 1;
        }

        let err = handle.await.unwrap().unwrap_err();
        assert_eq!(err.code, Code::DeadlineExceeded);
        assert_eq!(chunks, 2);
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].state, SessionState::Cancelled);
        assert_eq!(seen[0].bytes_transferred, 10);
    }

    #[tokio::test]
    async fn upload_reports_size_and_checksum() {
        let (_dir, storage) = storage();
        let (seen, observer) = recorded();
        let service = Arc::new(TransferService::new(storage).on_session_finished(observer));
        let (mut client, handle) = start(service, Method::Upload, CallContext::default());

        for part in [&b"hel"[..], b"lo wor", b"ld!"] {
            client
                .send(UploadRequest { data: part.to_vec() }.into())
                .await
                .unwrap();
        }
        client.close_send();

        let response = UploadResponse::try_from(client.receive().await.unwrap().unwrap()).unwrap();
        assert_eq!(response.size, 12);
        assert_eq!(response.checksum, checksum_bytes(b"hello world!"));
        handle.await.unwrap().unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].direction, Direction::Upload);
        assert_eq!(seen[0].chunks, 3);
    }

    #[tokio::test]
    async fn upload_without_chunks_is_empty() {
        let (_dir, storage) = storage();
        let service = Arc::new(TransferService::new(storage));
        let (mut client, handle) = start(service, Method::Upload, CallContext::default());
        client.close_send();

        let response = UploadResponse::try_from(client.receive().await.unwrap().unwrap()).unwrap();
        assert_eq!(response.size, 0);
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn upload_rejects_empty_chunk() {
        let (_dir, storage) = storage();
        let (seen, observer) = recorded();
        let service = Arc::new(TransferService::new(storage).on_session_finished(observer));
        let (mut client, handle) = start(service, Method::Upload, CallContext::default());

        client
            .send(UploadRequest { data: vec![] }.into())
            .await
            .unwrap();
        let err = handle.await.unwrap().unwrap_err();
        assert_eq!(err.code, Code::InvalidArgument);
        assert_eq!(seen.lock().unwrap()[0].state, SessionState::Failed);
    }

    #[tokio::test]
    async fn wrong_message_kind_is_invalid_argument() {
        let (_dir, storage) = storage();
        let service = Arc::new(TransferService::new(storage));
        let (mut client, handle) = start(service, Method::Upload, CallContext::default());

        client
            .send(ProgressRequest { data: vec![1] }.into())
            .await
            .unwrap();
        let err = handle.await.unwrap().unwrap_err();
        assert_eq!(err.code, Code::InvalidArgument);
    }

    #[tokio::test]
    async fn progress_acks_each_chunk() {
        let (_dir, storage) = storage();
        let service = Arc::new(TransferService::new(storage));
        let (mut client, handle) = start(
            service,
            Method::UploadAndNotifyProgress,
            CallContext::default(),
        );

        let mut acks = Vec::new();
        for part in [&b"abc"[..], b"de", b"fghij"] {
            client
                .send(ProgressRequest { data: part.to_vec() }.into())
                .await
                .unwrap();
            let ack = ProgressResponse::try_from(client.receive().await.unwrap().unwrap()).unwrap();
            acks.push(ack);
        }
        client.close_send();
        assert_eq!(client.receive().await.unwrap(), None);
        handle.await.unwrap().unwrap();

        let received: Vec<u64> = acks.iter().map(|a| a.received).collect();
        assert_eq!(received, [3, 5, 10]);
        assert_eq!(acks[2].message, "received 10bytes");
    }
}
