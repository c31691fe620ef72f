//! Per-worker connection multiplexing.
//!
//! One task per worker owns the socket. Requests queue on a channel and
//! are processed strictly in order: write the request frame, read the
//! response frame, hand the response to the waiting sender. A broken
//! socket gets exactly one reconnect attempt; requests caught by a failed
//! reconnect complete with a client error and their owners decide about
//! retries.

use crate::request::RequestId;
use async_trait::async_trait;
use bytes::Bytes;
use observability_deps::tracing::{debug, warn};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use wire_types::{read_frame, write_frame, FrameHeader};

/// A bidirectional byte stream to a worker.
pub trait WorkerStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> WorkerStream for T {}

/// Opens streams to named workers. The production implementation dials
/// TCP; tests substitute in-memory pipes.
#[async_trait]
pub trait WorkerConnector: Debug + Send + Sync + 'static {
    /// Open a fresh stream to `worker`.
    async fn connect(&self, worker: &str) -> std::io::Result<Box<dyn WorkerStream>>;
}

/// [`WorkerConnector`] resolving worker ids to `host:port` addresses.
#[derive(Debug, Default)]
pub struct TcpConnector {
    addresses: Mutex<HashMap<String, String>>,
}

impl TcpConnector {
    /// An empty address book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or update) the address of `worker`.
    pub fn set_address(&self, worker: impl Into<String>, address: impl Into<String>) {
        self.addresses.lock().insert(worker.into(), address.into());
    }
}

#[async_trait]
impl WorkerConnector for TcpConnector {
    async fn connect(&self, worker: &str) -> std::io::Result<Box<dyn WorkerStream>> {
        let address = self.addresses.lock().get(worker).cloned().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no address for worker {}", worker),
            )
        })?;
        let stream = TcpStream::connect(&address).await?;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }
}

/// How one send completed.
#[derive(Debug)]
pub enum SendOutcome {
    /// A correlated response arrived.
    Response(FrameHeader, Bytes),
    /// The request could not be delivered or its response not read.
    ClientError(String),
    /// The request was cancelled before it was sent.
    Cancelled,
}

struct Queued {
    id: RequestId,
    frame: Bytes,
    response_tx: oneshot::Sender<SendOutcome>,
}

struct WorkerChannel {
    tx: mpsc::UnboundedSender<Queued>,
    cancelled: Arc<Mutex<HashSet<RequestId>>>,
}

/// Multiplexes requests of many jobs over one connection per worker.
#[derive(Debug)]
pub struct Messenger {
    connector: Arc<dyn WorkerConnector>,
    channels: Mutex<HashMap<String, WorkerChannel>>,
}

impl Debug for WorkerChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerChannel").finish_non_exhaustive()
    }
}

impl Messenger {
    /// A messenger dialing through `connector`.
    pub fn new(connector: Arc<dyn WorkerConnector>) -> Self {
        Self {
            connector,
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Send an already-encoded frame to `worker` and await the correlated
    /// response. Frames to one worker go out strictly in submission
    /// order.
    pub async fn send(&self, worker: &str, id: RequestId, frame: Bytes) -> SendOutcome {
        let (response_tx, response_rx) = oneshot::channel();
        {
            let mut channels = self.channels.lock();
            let channel = channels.entry(worker.to_string()).or_insert_with(|| {
                let (tx, rx) = mpsc::unbounded_channel();
                let cancelled = Arc::new(Mutex::new(HashSet::new()));
                tokio::spawn(run_channel(
                    Arc::clone(&self.connector),
                    worker.to_string(),
                    rx,
                    Arc::clone(&cancelled),
                ));
                WorkerChannel { tx, cancelled }
            });
            if channel
                .tx
                .send(Queued {
                    id,
                    frame,
                    response_tx,
                })
                .is_err()
            {
                return SendOutcome::ClientError("worker channel closed".to_string());
            }
        }
        response_rx
            .await
            .unwrap_or_else(|_| SendOutcome::ClientError("worker channel dropped".to_string()))
    }

    /// Remove an unsent request from `worker`'s queue. Already-sent
    /// requests are unaffected; stopping those takes a management frame.
    pub fn cancel(&self, worker: &str, id: RequestId) {
        let channels = self.channels.lock();
        if let Some(channel) = channels.get(worker) {
            channel.cancelled.lock().insert(id);
        }
    }
}

async fn run_channel(
    connector: Arc<dyn WorkerConnector>,
    worker: String,
    mut rx: mpsc::UnboundedReceiver<Queued>,
    cancelled: Arc<Mutex<HashSet<RequestId>>>,
) {
    let mut stream: Option<Box<dyn WorkerStream>> = None;

    while let Some(queued) = rx.recv().await {
        if cancelled.lock().remove(&queued.id) {
            let _ = queued.response_tx.send(SendOutcome::Cancelled);
            continue;
        }

        // connect on demand; only this task ever dials the worker, so at
        // most one connect attempt is in flight
        if stream.is_none() {
            match connector.connect(&worker).await {
                Ok(s) => stream = Some(s),
                Err(e) => {
                    warn!(%worker, error=%e, "worker connect failed");
                    fail_and_drain(queued, &mut rx, &e.to_string());
                    continue;
                }
            }
        }

        let outcome = exchange(stream.as_mut().expect("connected"), &queued).await;
        match outcome {
            Ok((header, payload)) => {
                if header.id != queued.id {
                    warn!(%worker, expected = queued.id, got = header.id, "response id mismatch");
                    stream = None;
                    let _ = queued.response_tx.send(SendOutcome::ClientError(format!(
                        "response correlation mismatch: expected {}, got {}",
                        queued.id, header.id
                    )));
                    continue;
                }
                let _ = queued
                    .response_tx
                    .send(SendOutcome::Response(header, payload));
            }
            Err(e) => {
                // the socket broke under this request: the request fails,
                // and one reconnect attempt decides the fate of the queue
                debug!(%worker, error=%e, "socket broke, attempting one reconnect");
                stream = None;
                match connector.connect(&worker).await {
                    Ok(s) => {
                        stream = Some(s);
                        let _ = queued
                            .response_tx
                            .send(SendOutcome::ClientError(e.to_string()));
                    }
                    Err(reconnect) => {
                        warn!(%worker, error=%reconnect, "reconnect failed, draining queue");
                        fail_and_drain(queued, &mut rx, &e.to_string());
                    }
                }
            }
        }
    }
}

async fn exchange(
    stream: &mut Box<dyn WorkerStream>,
    queued: &Queued,
) -> Result<(FrameHeader, Bytes), wire_types::FrameError> {
    use tokio::io::AsyncWriteExt;
    stream.write_all(&queued.frame).await?;
    stream.flush().await?;
    let (header, payload) = read_frame(stream).await?;
    Ok((header, payload))
}

// Fail the current request and everything already queued with a client
// error; later sends start from a fresh connect.
fn fail_and_drain(current: Queued, rx: &mut mpsc::UnboundedReceiver<Queued>, error: &str) {
    let _ = current
        .response_tx
        .send(SendOutcome::ClientError(error.to_string()));
    while let Ok(next) = rx.try_recv() {
        let _ = next
            .response_tx
            .send(SendOutcome::ClientError(error.to_string()));
    }
}

/// Encode a frame for [`Messenger::send`].
pub(crate) fn encode_request(
    header: &FrameHeader,
    payload: &[u8],
) -> Result<Bytes, wire_types::FrameError> {
    wire_types::encode_frame(header, payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;
    use wire_types::{EchoRequest, QueuedType, ResultPayload};

    // An in-process worker speaking the frame protocol over an in-memory
    // duplex stream.
    #[derive(Debug)]
    struct PipeConnector {
        behavior: Behavior,
        connects: Arc<Mutex<usize>>,
        fail_connects_after: Option<usize>,
    }

    #[derive(Debug, Clone, Copy)]
    enum Behavior {
        Echo,
        DropFirstConnection,
    }

    impl PipeConnector {
        fn new(behavior: Behavior) -> Self {
            Self {
                behavior,
                connects: Arc::new(Mutex::new(0)),
                fail_connects_after: None,
            }
        }

        fn failing_after(behavior: Behavior, n: usize) -> Self {
            Self {
                fail_connects_after: Some(n),
                ..Self::new(behavior)
            }
        }
    }

    #[async_trait]
    impl WorkerConnector for PipeConnector {
        async fn connect(&self, _worker: &str) -> std::io::Result<Box<dyn WorkerStream>> {
            let connect_no = {
                let mut connects = self.connects.lock();
                *connects += 1;
                *connects
            };
            if let Some(limit) = self.fail_connects_after {
                if connect_no > limit {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::ConnectionRefused,
                        "refused",
                    ));
                }
            }
            let (ours, theirs) = tokio::io::duplex(64 * 1024);
            let behavior = self.behavior;
            let drop_now = matches!(behavior, Behavior::DropFirstConnection) && connect_no == 1;
            tokio::spawn(async move {
                let mut stream = theirs;
                loop {
                    let (header, _payload) = match read_frame(&mut stream).await {
                        Ok(frame) => frame,
                        Err(_) => return,
                    };
                    if drop_now {
                        return; // simulate a worker crash mid-request
                    }
                    let response = ResultPayload {
                        job_id: header.id,
                        ..Default::default()
                    };
                    write_frame(&mut stream, &header, &response.encode_to_vec())
                        .await
                        .ok();
                }
            });
            Ok(Box::new(ours))
        }
    }

    fn echo_frame(id: u64) -> Bytes {
        let header = FrameHeader::queued(id, QueuedType::Echo);
        encode_request(&header, &EchoRequest { data: vec![1] }.encode_to_vec()).unwrap()
    }

    #[tokio::test]
    async fn responses_are_correlated_in_order() {
        let messenger = Messenger::new(Arc::new(PipeConnector::new(Behavior::Echo)));
        for id in [5u64, 6, 7] {
            match messenger.send("w1", id, echo_frame(id)).await {
                SendOutcome::Response(header, _) => assert_eq!(header.id, id),
                other => panic!("unexpected outcome {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn broken_socket_fails_request_and_reconnects() {
        let connector = Arc::new(PipeConnector::new(Behavior::DropFirstConnection));
        let connects = Arc::clone(&connector.connects);
        let messenger = Messenger::new(connector);

        // first request dies with the connection
        match messenger.send("w1", 1, echo_frame(1)).await {
            SendOutcome::ClientError(_) => {}
            other => panic!("unexpected outcome {:?}", other),
        }
        // the reconnect succeeded, so the next request works
        match messenger.send("w1", 2, echo_frame(2)).await {
            SendOutcome::Response(header, _) => assert_eq!(header.id, 2),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(*connects.lock(), 2);
    }

    #[tokio::test]
    async fn failed_reconnect_drains_queue_with_client_errors() {
        let connector = Arc::new(PipeConnector::failing_after(
            Behavior::DropFirstConnection,
            1,
        ));
        let messenger = Arc::new(Messenger::new(connector));

        // queue two requests back to back; the first breaks the socket,
        // the reconnect is refused, so both come back as client errors
        let m1 = Arc::clone(&messenger);
        let first = tokio::spawn(async move { m1.send("w1", 1, echo_frame(1)).await });
        let m2 = Arc::clone(&messenger);
        let second = tokio::spawn(async move { m2.send("w1", 2, echo_frame(2)).await });

        assert!(matches!(
            first.await.unwrap(),
            SendOutcome::ClientError(_)
        ));
        assert!(matches!(
            second.await.unwrap(),
            SendOutcome::ClientError(_)
        ));
    }

    #[tokio::test]
    async fn cancel_removes_unsent_requests() {
        let messenger = Messenger::new(Arc::new(PipeConnector::new(Behavior::Echo)));
        // prime the channel so the worker task exists
        let _ = messenger.send("w1", 1, echo_frame(1)).await;
        messenger.cancel("w1", 99);
        match messenger.send("w1", 99, echo_frame(99)).await {
            SendOutcome::Cancelled => {}
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}
