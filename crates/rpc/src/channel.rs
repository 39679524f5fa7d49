//! Bidirectional message channel with independently closing directions.
//!
//! Each direction is a bounded tokio mpsc queue, so `send` applies
//! backpressure once the peer falls `capacity` messages behind. Items are
//! `Result<T, Status>`: an `Err` is a terminal error delivered in-band,
//! after which the direction is finished.

use tokio::sync::mpsc;

use filestream_protocol::Status;

type Item<T> = Result<T, Status>;

/// Builds two cross-wired channel endpoints.
///
/// Messages sent on one endpoint are received on the other.
pub fn pair<A, B>(capacity: usize) -> (DuplexChannel<A, B>, DuplexChannel<B, A>) {
    let (a_tx, a_rx) = mpsc::channel(capacity.max(1));
    let (b_tx, b_rx) = mpsc::channel(capacity.max(1));
    (
        DuplexChannel {
            tx: SendHalf::new(a_tx),
            rx: RecvHalf::new(b_rx),
        },
        DuplexChannel {
            tx: SendHalf::new(b_tx),
            rx: RecvHalf::new(a_rx),
        },
    )
}

/// Both directions of a call: sends `Out`, receives `In`.
pub struct DuplexChannel<Out, In> {
    tx: SendHalf<Out>,
    rx: RecvHalf<In>,
}

impl<Out, In> DuplexChannel<Out, In> {
    /// Appends a message to the outgoing direction.
    pub async fn send(&mut self, msg: Out) -> Result<(), Status> {
        self.tx.send(msg).await
    }

    /// Waits for the next inbound message.
    ///
    /// Returns `Ok(None)` once the peer closed its sending direction.
    pub async fn receive(&mut self) -> Result<Option<In>, Status> {
        self.rx.receive().await
    }

    /// Signals that no further messages will be sent. Idempotent.
    pub fn close_send(&mut self) {
        self.tx.close_send();
    }

    /// Terminates the outgoing direction with an error delivered to the peer.
    pub async fn abort(&mut self, status: Status) {
        self.tx.abort(status).await;
    }

    /// Returns a handle that can deliver a terminal status after this
    /// endpoint is consumed. `None` if the send side is already closed.
    pub fn trailer(&self) -> Option<Trailer<Out>> {
        self.tx.trailer()
    }

    /// Splits into halves that can be driven from separate tasks.
    pub fn split(self) -> (SendHalf<Out>, RecvHalf<In>) {
        (self.tx, self.rx)
    }
}

/// Outgoing direction of a [`DuplexChannel`].
pub struct SendHalf<T> {
    tx: Option<mpsc::Sender<Item<T>>>,
}

impl<T> SendHalf<T> {
    fn new(tx: mpsc::Sender<Item<T>>) -> Self {
        Self { tx: Some(tx) }
    }

    pub async fn send(&mut self, msg: T) -> Result<(), Status> {
        let Some(tx) = &self.tx else {
            return Err(Status::internal("send direction already closed"));
        };
        tx.send(Ok(msg))
            .await
            .map_err(|_| Status::unavailable("peer closed the channel"))
    }

    pub fn close_send(&mut self) {
        self.tx = None;
    }

    /// Sends `status` as the final item and closes this direction.
    ///
    /// Does nothing if the direction is already closed or the peer is gone.
    pub async fn abort(&mut self, status: Status) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Err(status)).await;
        }
    }

    pub fn trailer(&self) -> Option<Trailer<T>> {
        self.tx.as_ref().map(|tx| Trailer { tx: tx.clone() })
    }
}

/// Incoming direction of a [`DuplexChannel`].
pub struct RecvHalf<T> {
    rx: mpsc::Receiver<Item<T>>,
    finished: bool,
}

impl<T> RecvHalf<T> {
    fn new(rx: mpsc::Receiver<Item<T>>) -> Self {
        Self {
            rx,
            finished: false,
        }
    }

    /// Next message, `Ok(None)` at end-of-input, or the peer's terminal error.
    ///
    /// A terminal error is returned once; later calls yield `Ok(None)`.
    pub async fn receive(&mut self) -> Result<Option<T>, Status> {
        if self.finished {
            return Ok(None);
        }
        match self.rx.recv().await {
            Some(Ok(msg)) => Ok(Some(msg)),
            Some(Err(status)) => {
                self.finished = true;
                self.rx.close();
                Err(status)
            }
            None => {
                self.finished = true;
                Ok(None)
            }
        }
    }
}

/// Delivers the terminal status of a direction after its [`SendHalf`] is gone.
///
/// The peer observes end-of-input only once every sender, trailers
/// included, has been dropped.
pub struct Trailer<T> {
    tx: mpsc::Sender<Item<T>>,
}

impl<T> Trailer<T> {
    /// Sends `Err(status)` for a failed outcome, then closes.
    pub async fn finish(self, outcome: Result<(), Status>) {
        if let Err(status) = outcome {
            let _ = self.tx.send(Err(status)).await;
        }
    }
}
