//! One streaming connection and its authentication state machine.
//!
//! ```text
//! Idle -> Connecting -> AwaitingAuth -> Authenticated -> Closing -> Closed
//!            \              \               \
//!             +--------------+---------------+--> Failed -> Closing -> Closed
//! ```
//!
//! A session is single use. Its token is written once when the connection is
//! attempted and dropped when the session closes or fails.

use crate::credentials::{Credentials, SecretToken};
use crate::error::{ConsoleError, TransportError};
use crate::protocol::OutboundFrame;
use crate::transport::{Connector, FrameSink, FrameStream};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default bound on a graceful socket close.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Identity of one transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.simple().to_string()[..8])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Idle,
    Connecting,
    AwaitingAuth,
    Authenticated,
    Closing,
    Closed,
    Failed,
}

impl TransportState {
    fn can_fail(&self) -> bool {
        matches!(
            self,
            TransportState::Connecting | TransportState::AwaitingAuth | TransportState::Authenticated
        )
    }
}

/// What a session's receive loop reports, tagged with the session it came from.
#[derive(Debug)]
pub enum SessionSignal {
    Frame { session: SessionId, text: String },
    Ended { session: SessionId, error: TransportError },
}

impl SessionSignal {
    pub fn session(&self) -> SessionId {
        match self {
            SessionSignal::Frame { session, .. } | SessionSignal::Ended { session, .. } => *session,
        }
    }
}

pub struct TransportSession {
    id: SessionId,
    server_id: String,
    state: TransportState,
    token: Option<SecretToken>,
    endpoint_url: Option<String>,
    request_backlog: bool,
    close_timeout: Duration,
    sink: Option<Box<dyn FrameSink>>,
    stream: Option<Box<dyn FrameStream>>,
    reader: Option<JoinHandle<()>>,
}

impl fmt::Debug for TransportSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportSession")
            .field("id", &self.id)
            .field("server_id", &self.server_id)
            .field("state", &self.state)
            .field("endpoint_url", &self.endpoint_url)
            .finish_non_exhaustive()
    }
}

impl TransportSession {
    /// Create an idle session. When `request_backlog` is set the session asks
    /// for the log backlog as soon as it authenticates.
    pub fn new(server_id: impl Into<String>, request_backlog: bool) -> Self {
        Self {
            id: SessionId::new(),
            server_id: server_id.into(),
            state: TransportState::Idle,
            token: None,
            endpoint_url: None,
            request_backlog,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            sink: None,
            stream: None,
            reader: None,
        }
    }

    /// Bound the graceful close. A peer that stops reading can keep a close
    /// handshake pending forever; past this the socket is dropped unflushed.
    pub fn with_close_timeout(mut self, close_timeout: Duration) -> Self {
        self.close_timeout = close_timeout;
        self
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == TransportState::Authenticated
    }

    pub fn holds_token(&self) -> bool {
        self.token.is_some()
    }

    /// Open the socket and send the auth frame.
    ///
    /// On success the session is `AwaitingAuth`; on any failure it is `Failed`
    /// and its token has been discarded.
    pub async fn connect(
        &mut self,
        connector: &dyn Connector,
        credentials: Credentials,
    ) -> Result<(), ConsoleError> {
        if self.state != TransportState::Idle {
            return Err(TransportError::Connect(format!("session {} was already used", self.id)).into());
        }

        self.state = TransportState::Connecting;
        self.endpoint_url = Some(credentials.endpoint_url.clone());
        self.token = Some(credentials.token.clone());
        debug!(session = %self.id, server_id = %self.server_id, "Opening console socket");

        let pair = match connector.connect(&credentials.endpoint_url).await {
            Ok(pair) => pair,
            Err(error) => {
                self.fail(&error);
                return Err(error.into());
            }
        };
        self.sink = Some(pair.sink);
        self.stream = Some(pair.stream);
        self.state = TransportState::AwaitingAuth;

        self.write(OutboundFrame::Auth(credentials.token)).await
    }

    /// Spawn the receive loop. Frames are forwarded one at a time, in arrival order.
    pub fn start_reader(&mut self, signals: mpsc::Sender<SessionSignal>) {
        let Some(mut stream) = self.stream.take() else {
            return;
        };
        let session = self.id;

        self.reader = Some(tokio::spawn(async move {
            loop {
                let signal = match stream.next_frame().await {
                    Some(Ok(text)) => SessionSignal::Frame { session, text },
                    Some(Err(error)) => SessionSignal::Ended { session, error },
                    None => SessionSignal::Ended {
                        session,
                        error: TransportError::Closed(None),
                    },
                };
                let ended = matches!(signal, SessionSignal::Ended { .. });
                if signals.send(signal).await.is_err() || ended {
                    break;
                }
            }
        }));
    }

    /// Apply the daemon's answer to the auth frame.
    pub async fn handle_auth_result(
        &mut self,
        success: bool,
        reason: Option<String>,
    ) -> Result<(), ConsoleError> {
        if self.state != TransportState::AwaitingAuth {
            debug!(session = %self.id, state = ?self.state, success, "Ignoring auth result outside handshake");
            return Ok(());
        }

        if !success {
            let reason = reason.unwrap_or_else(|| "token rejected".to_string());
            warn!(session = %self.id, %reason, "Console authentication rejected");
            self.state = TransportState::Failed;
            self.token = None;
            return Err(ConsoleError::AuthRejected(reason));
        }

        self.state = TransportState::Authenticated;
        info!(session = %self.id, server_id = %self.server_id, "Console session ready");

        if self.request_backlog {
            self.write(OutboundFrame::SendLogs).await?;
        }
        Ok(())
    }

    /// Send a frame on an authenticated session.
    pub async fn send(&mut self, frame: OutboundFrame) -> Result<(), ConsoleError> {
        if self.state != TransportState::Authenticated {
            return Err(ConsoleError::NotConnected);
        }
        self.write(frame).await
    }

    async fn write(&mut self, frame: OutboundFrame) -> Result<(), ConsoleError> {
        let Some(sink) = self.sink.as_mut() else {
            return Err(ConsoleError::NotConnected);
        };
        let event = frame.event_name();
        match sink.send(frame.encode()).await {
            Ok(()) => {
                debug!(session = %self.id, event, "Sent frame");
                Ok(())
            }
            Err(error) => {
                self.fail(&error);
                Err(error.into())
            }
        }
    }

    /// Mark the session unusable after a transport failure.
    pub fn fail(&mut self, error: &TransportError) {
        if self.state.can_fail() {
            warn!(session = %self.id, %error, "Console session failed");
            self.state = TransportState::Failed;
        }
        self.token = None;
    }

    /// Release every held resource. Safe to call from any state.
    pub async fn close(&mut self) {
        if self.state == TransportState::Closed {
            return;
        }
        self.state = TransportState::Closing;

        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(mut sink) = self.sink.take() {
            match tokio::time::timeout(self.close_timeout, sink.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    debug!(session = %self.id, %error, "Error while closing console socket");
                }
                Err(_) => {
                    warn!(
                        session = %self.id,
                        timeout_ms = self.close_timeout.as_millis() as u64,
                        "Console socket did not close in time, dropping it"
                    );
                }
            }
        }
        self.stream = None;
        self.token = None;
        self.state = TransportState::Closed;
        debug!(session = %self.id, "Console session closed");
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}
