//! Classification of inbound events into scrollback lines and notifications.

use crate::log_line::{LineClass, LogLine};
use crate::protocol::{ControlEvent, OutputOrigin};
use crate::scrollback::ScrollbackBuffer;
use crate::supervisor::ConnectionStatus;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{trace, warn};

/// Notifications delivered to console subscribers.
#[derive(Debug, Clone)]
pub enum ConsoleEvent {
    /// A line was appended to the scrollback
    Line(LogLine),
    /// The remote process reported a new state (`running`, `offline`, ...)
    ServerStatus(String),
    /// Resource usage snapshot from the daemon
    Stats(Value),
    /// The connection supervisor changed state
    Connection(ConnectionStatus),
    /// This subscriber fell behind and missed `n` events; resync from a snapshot
    Lagged(u64),
}

/// What the router did with one event.
#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    /// Session-level control event, handed back to the caller untouched
    Control(ControlEvent),
    /// A line was appended
    Line(LogLine),
    /// A notification was published without producing a line
    Notified,
}

/// Turns decoded frames into lines and notifications, in arrival order.
///
/// The router is cheap to clone; all clones share one buffer and one set of
/// subscribers.
#[derive(Debug, Clone)]
pub struct EventRouter {
    buffer: Arc<ScrollbackBuffer>,
    events: broadcast::Sender<ConsoleEvent>,
}

impl EventRouter {
    pub fn new(buffer: Arc<ScrollbackBuffer>, channel_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(channel_capacity.max(1));
        Self { buffer, events }
    }

    pub fn buffer(&self) -> &Arc<ScrollbackBuffer> {
        &self.buffer
    }

    /// Route one decoded event.
    ///
    /// Auth and token lifecycle events never become lines. Log output is
    /// classified from its text, status changes produce a `system` line plus a
    /// status notification, and anything unrecognised is kept as a `raw` line.
    pub fn route(&self, event: ControlEvent) -> Routed {
        match event {
            ControlEvent::AuthResult { .. } | ControlEvent::TokenExpiring | ControlEvent::TokenExpired => {
                Routed::Control(event)
            }
            ControlEvent::LogOutput { text, origin } => {
                let line = match origin {
                    OutputOrigin::DaemonError => LogLine::new(LineClass::Error, text),
                    OutputOrigin::Console | OutputOrigin::Daemon | OutputOrigin::Install => {
                        LogLine::classified(text)
                    }
                };
                Routed::Line(self.record(line))
            }
            ControlEvent::StatusChanged(status) => {
                let line = self.record(LogLine::system(format!("Server marked as {status}")));
                self.publish(ConsoleEvent::ServerStatus(status));
                Routed::Line(line)
            }
            ControlEvent::Stats(stats) => {
                self.publish(ConsoleEvent::Stats(stats));
                Routed::Notified
            }
            ControlEvent::Unknown(raw) => Routed::Line(self.record(LogLine::raw(raw))),
        }
    }

    /// Append a locally produced line and notify subscribers.
    pub fn record(&self, line: LogLine) -> LogLine {
        let evicted = self.buffer.append(line.clone());
        if evicted > 0 {
            trace!(evicted, "Scrollback evicted oldest lines");
        }
        self.publish(ConsoleEvent::Line(line.clone()));
        line
    }

    pub fn publish(&self, event: ConsoleEvent) {
        // no subscribers is fine; the scrollback still has the line
        let _ = self.events.send(event);
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.events.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }
}

/// A live feed of [`ConsoleEvent`]s. Dropping it (or calling
/// [`Subscription::unsubscribe`]) detaches it from the router.
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<ConsoleEvent>,
}

impl Subscription {
    /// Next event, or `None` once the console client has gone away.
    pub async fn recv(&mut self) -> Option<ConsoleEvent> {
        match self.receiver.recv().await {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "Console subscriber lagged behind");
                Some(ConsoleEvent::Lagged(missed))
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }

    /// Non-blocking variant of [`Subscription::recv`].
    pub fn try_recv(&mut self) -> Option<ConsoleEvent> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(broadcast::error::TryRecvError::Lagged(missed)) => Some(ConsoleEvent::Lagged(missed)),
            Err(_) => None,
        }
    }

    pub fn unsubscribe(self) {}
}
