//! In-memory credential fetcher and transport used by the test suite.

use crate::credentials::{CredentialFetcher, Credentials, SecretToken};
use crate::error::{CredentialError, TransportError};
use crate::transport::{Connector, FrameSink, FrameStream, TransportPair};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(2);

/// Hands out `wss://x` / `t1` for the first call, then `wss://x/2` / `t2`, ...
/// unless a failure was queued.
#[derive(Default)]
pub struct MockFetcher {
    calls: AtomicUsize,
    failures: Mutex<VecDeque<CredentialError>>,
    requested: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next(&self, error: CredentialError) {
        self.failures.lock().push_back(error);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().clone()
    }
}

#[async_trait]
impl CredentialFetcher for MockFetcher {
    async fn fetch(&self, server_id: &str) -> Result<Credentials, CredentialError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requested.lock().push(server_id.to_string());
        if let Some(error) = self.failures.lock().pop_front() {
            return Err(error);
        }
        let endpoint_url = if call == 1 {
            "wss://x".to_string()
        } else {
            format!("wss://x/{call}")
        };
        Ok(Credentials {
            endpoint_url,
            token: SecretToken::new(format!("t{call}")),
        })
    }
}

/// What the fake remote pushes to the client.
#[derive(Debug)]
pub enum MockInbound {
    Text(String),
    Error(String),
    Close,
}

/// The remote end of one mock connection.
pub struct MockRemote {
    pub endpoint_url: String,
    outbound: mpsc::UnboundedReceiver<String>,
    inbound: mpsc::UnboundedSender<MockInbound>,
    closed: Arc<AtomicBool>,
    fail_sends: Arc<AtomicBool>,
    stall_close: Arc<AtomicBool>,
}

impl MockRemote {
    /// Next frame the client sent, decoded as JSON.
    pub async fn next_sent(&mut self) -> Value {
        let text = tokio::time::timeout(WAIT, self.outbound.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("client sink dropped");
        serde_json::from_str(&text).expect("client sent invalid JSON")
    }

    pub fn try_next_sent(&mut self) -> Option<String> {
        self.outbound.try_recv().ok()
    }

    pub fn send(&self, inbound: MockInbound) {
        let _ = self.inbound.send(inbound);
    }

    pub fn push(&self, text: &str) {
        self.send(MockInbound::Text(text.to_string()));
    }

    pub fn push_event(&self, event: &str, args: Value) {
        self.push(&serde_json::json!({ "event": event, "args": args }).to_string());
    }

    pub fn close(&self) {
        self.send(MockInbound::Close);
    }

    /// Whether the client closed its sink.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    /// Stop acknowledging the close handshake: the client's `close` never
    /// completes until the sink is dropped.
    pub fn stall_close(&self) {
        self.stall_close.store(true, Ordering::SeqCst);
    }
}

struct MockSink {
    outbound: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
    fail_sends: Arc<AtomicBool>,
    stall_close: Arc<AtomicBool>,
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) || self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Send("broken pipe".to_string()));
        }
        self.outbound
            .send(text)
            .map_err(|_| TransportError::Send("remote gone".to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.stall_close.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for MockSink {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

struct MockStream {
    inbound: mpsc::UnboundedReceiver<MockInbound>,
}

#[async_trait]
impl FrameStream for MockStream {
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        match self.inbound.recv().await? {
            MockInbound::Text(text) => Some(Ok(text)),
            MockInbound::Error(message) => Some(Err(TransportError::Receive(message))),
            MockInbound::Close => None,
        }
    }
}

/// Connector whose connections are driven by the test through [`MockRemote`]s.
pub struct MockConnector {
    remotes_tx: mpsc::UnboundedSender<MockRemote>,
    remotes_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<MockRemote>>,
    connect_failures: Mutex<VecDeque<String>>,
    connects: AtomicUsize,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        let (remotes_tx, remotes_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            remotes_tx,
            remotes_rx: tokio::sync::Mutex::new(remotes_rx),
            connect_failures: Mutex::new(VecDeque::new()),
            connects: AtomicUsize::new(0),
        })
    }

    pub fn fail_next_connect(&self, reason: &str) {
        self.connect_failures.lock().push_back(reason.to_string());
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// The remote end of the next connection the client opens.
    pub async fn next_remote(&self) -> MockRemote {
        let mut remotes = self.remotes_rx.lock().await;
        tokio::time::timeout(WAIT, remotes.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("connector dropped")
    }

    pub async fn try_next_remote(&self) -> Option<MockRemote> {
        self.remotes_rx.lock().await.try_recv().ok()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, endpoint_url: &str) -> Result<TransportPair, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.connect_failures.lock().pop_front() {
            return Err(TransportError::Connect(reason));
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let fail_sends = Arc::new(AtomicBool::new(false));
        let stall_close = Arc::new(AtomicBool::new(false));

        let _ = self.remotes_tx.send(MockRemote {
            endpoint_url: endpoint_url.to_string(),
            outbound: outbound_rx,
            inbound: inbound_tx,
            closed: closed.clone(),
            fail_sends: fail_sends.clone(),
            stall_close: stall_close.clone(),
        });

        Ok(TransportPair {
            sink: Box::new(MockSink {
                outbound: outbound_tx,
                closed,
                fail_sends,
                stall_close,
            }),
            stream: Box::new(MockStream { inbound: inbound_rx }),
        })
    }
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
