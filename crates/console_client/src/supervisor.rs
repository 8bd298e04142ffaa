//! Connection supervisor.
//!
//! A single task owns every transport session of one console and is the only
//! place that decides which session is current. Operator requests, inbound
//! frames from all sessions and results of background connection attempts are
//! funnelled into that task and handled one at a time, which is what keeps
//! the session swap during a token refresh atomic for everyone else.
//!
//! ```text
//! Disconnected --connect--> Connecting --authenticated--> Live
//!      ^                        |                         |  ^
//!      +-------- failure -------+        token expiring   |  | swapped / refresh failed
//!      |                                                  v  |
//!      +------------ current session lost ---------- Refreshing
//! ```
//!
//! There is no automatic retry. Every failure ends in `Disconnected` and waits
//! for the operator to reconnect.

use crate::config::ConsoleOptions;
use crate::credentials::CredentialFetcher;
use crate::dispatcher::{CommandDispatcher, DispatchOutcome};
use crate::error::ConsoleError;
use crate::protocol::{ControlEvent, PowerSignal};
use crate::router::{ConsoleEvent, EventRouter, Routed};
use crate::session::{SessionId, SessionSignal, TransportSession};
use crate::transport::Connector;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupervisorState {
    Disconnected,
    Connecting,
    Live,
    Refreshing,
}

impl SupervisorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SupervisorState::Disconnected => "disconnected",
            SupervisorState::Connecting => "connecting",
            SupervisorState::Live => "live",
            SupervisorState::Refreshing => "refreshing",
        }
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection status as shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: SupervisorState,
    /// Last error or warning, in operator-readable form
    pub detail: Option<String>,
    /// Whether the "Reconnect" action is currently valid
    pub reconnect_available: bool,
}

impl ConnectionStatus {
    pub fn new(state: SupervisorState, detail: Option<String>) -> Self {
        Self {
            state,
            detail,
            reconnect_available: state == SupervisorState::Disconnected,
        }
    }

    /// Whether an authenticated session is serving the console.
    pub fn is_live(&self) -> bool {
        matches!(self.state, SupervisorState::Live | SupervisorState::Refreshing)
    }
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::new(SupervisorState::Disconnected, None)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{} ({detail})", self.state),
            None => write!(f, "{}", self.state),
        }
    }
}

pub(crate) enum Request {
    Connect(oneshot::Sender<Result<(), ConsoleError>>),
    Command {
        text: String,
        reply: oneshot::Sender<Result<DispatchOutcome, ConsoleError>>,
    },
    Power {
        signal: PowerSignal,
        reply: oneshot::Sender<Result<DispatchOutcome, ConsoleError>>,
    },
    Shutdown(oneshot::Sender<()>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptKind {
    Initial,
    Refresh,
}

struct AttemptOutcome {
    id: u64,
    kind: AttemptKind,
    result: Result<TransportSession, ConsoleError>,
}

struct InFlight {
    id: u64,
    handle: JoinHandle<()>,
}

/// Fetch a grant and open a session with it, up to the point where the auth
/// frame has been sent.
async fn open_session(
    server_id: &str,
    fetcher: &dyn CredentialFetcher,
    connector: &dyn Connector,
    request_backlog: bool,
    close_timeout: Duration,
) -> Result<TransportSession, ConsoleError> {
    let credentials = fetcher.fetch(server_id).await?;
    let mut session =
        TransportSession::new(server_id, request_backlog).with_close_timeout(close_timeout);
    session.connect(connector, credentials).await?;
    Ok(session)
}

pub(crate) struct Supervisor {
    server_id: String,
    fetcher: Arc<dyn CredentialFetcher>,
    connector: Arc<dyn Connector>,
    options: ConsoleOptions,
    router: EventRouter,
    status: watch::Sender<ConnectionStatus>,
    state: SupervisorState,
    current: Option<TransportSession>,
    pending: Option<TransportSession>,
    in_flight: Option<InFlight>,
    next_attempt: u64,
    signals: mpsc::Sender<SessionSignal>,
    attempts: mpsc::UnboundedSender<AttemptOutcome>,
}

impl Supervisor {
    /// Spawn the supervisor task and return the request channel that drives it.
    ///
    /// The task stops, closing every session it owns, once all request
    /// senders are dropped or a shutdown request arrives.
    pub(crate) fn spawn(
        server_id: String,
        fetcher: Arc<dyn CredentialFetcher>,
        connector: Arc<dyn Connector>,
        options: ConsoleOptions,
        router: EventRouter,
        status: watch::Sender<ConnectionStatus>,
    ) -> mpsc::Sender<Request> {
        let (requests_tx, requests_rx) = mpsc::channel(options.command_channel_capacity.max(1));
        let (signals_tx, signals_rx) = mpsc::channel(options.frame_queue_capacity.max(1));
        let (attempts_tx, attempts_rx) = mpsc::unbounded_channel();

        let supervisor = Self {
            server_id,
            fetcher,
            connector,
            options,
            router,
            status,
            state: SupervisorState::Disconnected,
            current: None,
            pending: None,
            in_flight: None,
            next_attempt: 0,
            signals: signals_tx,
            attempts: attempts_tx,
        };
        tokio::spawn(supervisor.run(requests_rx, signals_rx, attempts_rx));
        requests_tx
    }

    async fn run(
        mut self,
        mut requests: mpsc::Receiver<Request>,
        mut signals: mpsc::Receiver<SessionSignal>,
        mut attempts: mpsc::UnboundedReceiver<AttemptOutcome>,
    ) {
        debug!(server_id = %self.server_id, "Console supervisor started");
        loop {
            tokio::select! {
                Some(outcome) = attempts.recv() => self.on_attempt(outcome).await,
                Some(signal) = signals.recv() => self.on_signal(signal).await,
                request = requests.recv() => match request {
                    Some(Request::Shutdown(reply)) => {
                        self.teardown().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(request) => self.on_request(request).await,
                    None => {
                        self.teardown().await;
                        break;
                    }
                },
            }
        }
        debug!(server_id = %self.server_id, "Console supervisor stopped");
    }

    async fn on_request(&mut self, request: Request) {
        match request {
            Request::Connect(reply) => {
                let _ = reply.send(self.start());
            }
            Request::Command { text, reply } => {
                let result =
                    CommandDispatcher::send_command(self.current.as_mut(), &self.router, &text).await;
                self.after_dispatch(&result).await;
                let _ = reply.send(result);
            }
            Request::Power { signal, reply } => {
                let result =
                    CommandDispatcher::send_power(self.current.as_mut(), &self.router, signal).await;
                self.after_dispatch(&result).await;
                let _ = reply.send(result);
            }
            Request::Shutdown(reply) => {
                self.teardown().await;
                let _ = reply.send(());
            }
        }
    }

    async fn after_dispatch(&mut self, result: &Result<DispatchOutcome, ConsoleError>) {
        if let Err(error @ ConsoleError::Transport(_)) = result {
            self.disconnect(error.clone()).await;
        }
    }

    fn start(&mut self) -> Result<(), ConsoleError> {
        if self.state != SupervisorState::Disconnected {
            return Err(ConsoleError::ReconnectUnavailable(self.state));
        }
        info!(server_id = %self.server_id, "Connecting to console");
        self.set_state(SupervisorState::Connecting, None);
        self.spawn_attempt(AttemptKind::Initial);
        Ok(())
    }

    fn spawn_attempt(&mut self, kind: AttemptKind) {
        self.abort_in_flight();
        self.next_attempt += 1;
        let id = self.next_attempt;

        let server_id = self.server_id.clone();
        let fetcher = self.fetcher.clone();
        let connector = self.connector.clone();
        let attempts = self.attempts.clone();
        let request_backlog = match kind {
            AttemptKind::Initial => true,
            AttemptKind::Refresh => self.options.request_backlog_on_refresh,
        };
        let close_timeout = self.options.close_timeout();

        let handle = tokio::spawn(async move {
            let result = open_session(
                &server_id,
                fetcher.as_ref(),
                connector.as_ref(),
                request_backlog,
                close_timeout,
            )
            .await;
            let _ = attempts.send(AttemptOutcome { id, kind, result });
        });
        self.in_flight = Some(InFlight { id, handle });
    }

    fn abort_in_flight(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.handle.abort();
        }
    }

    async fn on_attempt(&mut self, outcome: AttemptOutcome) {
        let AttemptOutcome { id, kind, result } = outcome;
        if self.in_flight.as_ref().map(|f| f.id) != Some(id) {
            if let Ok(mut session) = result {
                debug!(session = %session.id(), "Closing session from abandoned attempt");
                session.close().await;
            }
            return;
        }
        self.in_flight = None;

        match (kind, result) {
            (AttemptKind::Initial, Ok(session)) if self.state == SupervisorState::Connecting => {
                self.adopt_pending(session)
            }
            (AttemptKind::Refresh, Ok(session)) if self.state == SupervisorState::Refreshing => {
                self.adopt_pending(session)
            }
            (_, Ok(mut session)) => session.close().await,
            (AttemptKind::Initial, Err(error)) => self.disconnect(error).await,
            (AttemptKind::Refresh, Err(error)) => self.refresh_failed(error).await,
        }
    }

    fn adopt_pending(&mut self, mut session: TransportSession) {
        debug!(session = %session.id(), "Console socket open, awaiting auth");
        session.start_reader(self.signals.clone());
        self.pending = Some(session);
    }

    fn is_current(&self, id: SessionId) -> bool {
        self.current.as_ref().map(TransportSession::id) == Some(id)
    }

    fn is_pending(&self, id: SessionId) -> bool {
        self.pending.as_ref().map(TransportSession::id) == Some(id)
    }

    async fn on_signal(&mut self, signal: SessionSignal) {
        let id = signal.session();
        if self.is_current(id) {
            self.on_current_signal(signal).await;
        } else if self.is_pending(id) {
            self.on_pending_signal(signal).await;
        } else {
            trace!(session = %id, "Dropping signal from retired session");
        }
    }

    async fn on_current_signal(&mut self, signal: SessionSignal) {
        match signal {
            SessionSignal::Frame { text, .. } => match self.router.route(ControlEvent::decode(&text)) {
                Routed::Control(ControlEvent::TokenExpiring) => self.begin_refresh(),
                Routed::Control(ControlEvent::TokenExpired) => {
                    self.disconnect(ConsoleError::AuthRejected("token expired".to_string()))
                        .await
                }
                Routed::Control(ControlEvent::AuthResult {
                    success: false,
                    reason,
                }) => {
                    let reason = reason.unwrap_or_else(|| "token rejected".to_string());
                    self.disconnect(ConsoleError::AuthRejected(reason)).await
                }
                Routed::Control(other) => debug!(?other, "Ignoring control event on live session"),
                Routed::Line(_) | Routed::Notified => {}
            },
            SessionSignal::Ended { error, .. } => {
                if let Some(session) = self.current.as_mut() {
                    session.fail(&error);
                }
                self.disconnect(error.into()).await;
            }
        }
    }

    async fn on_pending_signal(&mut self, signal: SessionSignal) {
        match signal {
            SessionSignal::Frame { text, .. } => match ControlEvent::decode(&text) {
                ControlEvent::AuthResult { success, reason } => {
                    let Some(pending) = self.pending.as_mut() else {
                        return;
                    };
                    match pending.handle_auth_result(success, reason).await {
                        Ok(()) => self.promote_pending().await,
                        Err(error) => self.pending_failed(error).await,
                    }
                }
                // nothing else is current yet, so output is shown as it arrives
                event if self.state == SupervisorState::Connecting => {
                    if let Routed::Control(other) = self.router.route(event) {
                        debug!(?other, "Ignoring control event before authentication");
                    }
                }
                event => trace!(?event, "Discarding pre-auth frame from replacement session"),
            },
            SessionSignal::Ended { error, .. } => {
                if let Some(pending) = self.pending.as_mut() {
                    pending.fail(&error);
                }
                self.pending_failed(error.into()).await;
            }
        }
    }

    fn begin_refresh(&mut self) {
        if self.state != SupervisorState::Live {
            trace!(state = %self.state, "Token refresh already under way");
            return;
        }
        info!(server_id = %self.server_id, "Console token expiring, opening replacement session");
        self.set_state(SupervisorState::Refreshing, None);
        self.spawn_attempt(AttemptKind::Refresh);
    }

    /// Make the authenticated pending session current. During a refresh the
    /// old session is closed in the same step, so no frame of it is routed
    /// after the new one took over.
    async fn promote_pending(&mut self) {
        let Some(mut session) = self.pending.take() else {
            return;
        };

        match self.state {
            SupervisorState::Connecting => {
                self.current = Some(session);
                self.set_state(SupervisorState::Live, None);
            }
            SupervisorState::Refreshing => {
                let previous = self.current.replace(session);
                self.set_state(SupervisorState::Live, None);
                if let Some(mut old) = previous {
                    info!(old = %old.id(), "Swapped to refreshed console session");
                    old.close().await;
                }
            }
            SupervisorState::Live | SupervisorState::Disconnected => session.close().await,
        }
    }

    async fn pending_failed(&mut self, error: ConsoleError) {
        if let Some(mut pending) = self.pending.take() {
            pending.close().await;
        }
        match self.state {
            SupervisorState::Connecting => self.disconnect(error).await,
            SupervisorState::Refreshing => self.refresh_failed(error).await,
            SupervisorState::Live | SupervisorState::Disconnected => {}
        }
    }

    async fn refresh_failed(&mut self, error: ConsoleError) {
        let still_usable = self
            .current
            .as_ref()
            .is_some_and(TransportSession::is_authenticated);
        if !still_usable {
            self.disconnect(error).await;
            return;
        }

        warn!(server_id = %self.server_id, %error, "Token refresh failed, keeping current session");
        self.set_state(
            SupervisorState::Live,
            Some(format!("token refresh failed, staying on current session: {error}")),
        );
    }

    async fn release_all(&mut self) {
        self.abort_in_flight();
        if let Some(mut pending) = self.pending.take() {
            pending.close().await;
        }
        if let Some(mut current) = self.current.take() {
            current.close().await;
        }
    }

    async fn disconnect(&mut self, error: ConsoleError) {
        warn!(server_id = %self.server_id, %error, "Console disconnected");
        self.release_all().await;
        self.set_state(SupervisorState::Disconnected, Some(error.to_string()));
    }

    async fn teardown(&mut self) {
        self.release_all().await;
        self.set_state(SupervisorState::Disconnected, Some("console closed".to_string()));
    }

    fn set_state(&mut self, state: SupervisorState, detail: Option<String>) {
        if self.state != state {
            debug!(server_id = %self.server_id, from = %self.state, to = %state, "Console state change");
        }
        self.state = state;
        let status = ConnectionStatus::new(state, detail);
        self.status.send_replace(status.clone());
        self.router.publish(ConsoleEvent::Connection(status));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_affordance_only_when_disconnected() {
        assert!(ConnectionStatus::new(SupervisorState::Disconnected, None).reconnect_available);
        for state in [
            SupervisorState::Connecting,
            SupervisorState::Live,
            SupervisorState::Refreshing,
        ] {
            assert!(!ConnectionStatus::new(state, None).reconnect_available);
        }
    }

    #[test]
    fn test_status_display() {
        let status = ConnectionStatus::new(
            SupervisorState::Disconnected,
            Some("console socket closed".to_string()),
        );
        assert_eq!(status.to_string(), "disconnected (console socket closed)");
        assert_eq!(ConnectionStatus::default().to_string(), "disconnected");
    }

    #[test]
    fn test_is_live() {
        assert!(ConnectionStatus::new(SupervisorState::Refreshing, None).is_live());
        assert!(!ConnectionStatus::new(SupervisorState::Connecting, None).is_live());
    }
}
