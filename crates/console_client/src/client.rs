//! Public handle to one live server console.

use crate::config::ConsoleOptions;
use crate::credentials::CredentialFetcher;
use crate::dispatcher::DispatchOutcome;
use crate::error::ConsoleError;
use crate::log_line::LogLine;
use crate::protocol::PowerSignal;
use crate::router::{EventRouter, Subscription};
use crate::scrollback::ScrollbackBuffer;
use crate::supervisor::{ConnectionStatus, Request, Supervisor};
use crate::transport::Connector;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

/// Handle to a console view bound to one server.
///
/// Clones share the same supervisor, scrollback and subscribers. Once every
/// clone is dropped (or [`ConsoleClient::close`] is called) all sessions are
/// closed and their tokens released.
#[derive(Debug, Clone)]
pub struct ConsoleClient {
    server_id: Arc<str>,
    requests: mpsc::Sender<Request>,
    status: watch::Receiver<ConnectionStatus>,
    router: EventRouter,
}

impl ConsoleClient {
    /// Spawn the supervisor for `server_id`. Must be called inside a Tokio
    /// runtime. Nothing is fetched or opened until [`ConsoleClient::connect`].
    pub fn spawn(
        server_id: impl Into<String>,
        fetcher: Arc<dyn CredentialFetcher>,
        connector: Arc<dyn Connector>,
        options: ConsoleOptions,
    ) -> Self {
        let server_id: String = server_id.into();
        let buffer = Arc::new(ScrollbackBuffer::new(options.scrollback_capacity));
        let router = EventRouter::new(buffer, options.event_channel_capacity);
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::default());

        let requests = Supervisor::spawn(
            server_id.clone(),
            fetcher,
            connector,
            options,
            router.clone(),
            status_tx,
        );

        Self {
            server_id: server_id.into(),
            requests,
            status: status_rx,
            router,
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    /// Start connecting. Returns as soon as the attempt is under way; watch
    /// [`ConsoleClient::status`] for the outcome.
    pub async fn connect(&self) -> Result<(), ConsoleError> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::Connect(reply)).await?;
        rx.await.map_err(|_| ConsoleError::Shutdown)?
    }

    /// Operator "Reconnect" action. Only valid while disconnected.
    pub async fn reconnect(&self) -> Result<(), ConsoleError> {
        self.connect().await
    }

    /// Send a console command. Blank input is ignored; anything else fails
    /// with [`ConsoleError::NotConnected`] unless a session is authenticated.
    pub async fn send_command(&self, text: impl Into<String>) -> Result<DispatchOutcome, ConsoleError> {
        let (reply, rx) = oneshot::channel();
        let request = Request::Command {
            text: text.into(),
            reply,
        };
        self.dispatch(request, rx).await
    }

    pub async fn send_power(&self, signal: PowerSignal) -> Result<DispatchOutcome, ConsoleError> {
        let (reply, rx) = oneshot::channel();
        self.dispatch(Request::Power { signal, reply }, rx).await
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    /// Wait until the connection status satisfies `predicate`.
    pub async fn wait_for_status(
        &self,
        predicate: impl FnMut(&ConnectionStatus) -> bool,
    ) -> Result<ConnectionStatus, ConsoleError> {
        let mut status = self.status.clone();
        let matched = status
            .wait_for(predicate)
            .await
            .map_err(|_| ConsoleError::Shutdown)?;
        Ok(matched.clone())
    }

    pub fn subscribe(&self) -> Subscription {
        self.router.subscribe()
    }

    /// Copy of the retained lines, oldest first.
    pub fn snapshot(&self) -> Vec<LogLine> {
        self.router.buffer().snapshot()
    }

    /// Tear the console down: abort any attempt in flight, close every session
    /// and stop the supervisor. Later calls on any clone fail.
    pub async fn close(&self) {
        let (reply, rx) = oneshot::channel();
        if self.requests.send(Request::Shutdown(reply)).await.is_ok() {
            let _ = rx.await;
        }
    }

    async fn request(&self, request: Request) -> Result<(), ConsoleError> {
        self.requests
            .send(request)
            .await
            .map_err(|_| ConsoleError::Shutdown)
    }

    /// Commands on a torn down console are reported as not connected.
    async fn dispatch(
        &self,
        request: Request,
        rx: oneshot::Receiver<Result<DispatchOutcome, ConsoleError>>,
    ) -> Result<DispatchOutcome, ConsoleError> {
        if self.requests.send(request).await.is_err() {
            return Err(ConsoleError::NotConnected);
        }
        rx.await.unwrap_or(Err(ConsoleError::NotConnected))
    }
}
