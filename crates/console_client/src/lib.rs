//! # Console Client
//!
//! Live console for a remotely hosted server process. The client obtains a
//! short-lived streaming grant from the management API, opens an authenticated
//! websocket session with it, keeps a bounded scrollback of classified log
//! lines and lets the operator send console commands and power actions.
//!
//! ## Core Features
//!
//! - **Authenticated sessions**: nothing but the auth frame is written before
//!   the daemon accepts the token
//! - **Make-before-break refresh**: when the daemon warns that the token is
//!   about to expire, a replacement session is opened and authenticated before
//!   the old one is closed, without losing or duplicating lines
//! - **Bounded scrollback**: oldest lines are evicted first
//! - **Subscriptions**: any number of observers receive lines, status changes
//!   and connection updates in arrival order
//! - **No silent retries**: every failure ends in `Disconnected` with a
//!   readable reason and waits for the operator to reconnect
//!
//! ## Quick Start Example
//!
//! ```rust,no_run
//! use console_client::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let fetcher = HttpCredentialFetcher::new(
//!         "https://panel.example.com",
//!         Some("api-key".to_string()),
//!         ApiFlavor::Panel,
//!         Duration::from_secs(10),
//!     )?;
//!     let console = ConsoleClient::spawn(
//!         "d3aac109",
//!         Arc::new(fetcher),
//!         Arc::new(WsConnector::new()),
//!         ConsoleOptions::default(),
//!     );
//!
//!     let mut events = console.subscribe();
//!     console.connect().await?;
//!     console.wait_for_status(|s| s.is_live()).await?;
//!     console.send_command("list").await?;
//!
//!     while let Some(event) = events.recv().await {
//!         if let ConsoleEvent::Line(line) = event {
//!             println!("[{}] {}", line.class(), line.text());
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod credentials;
pub mod dispatcher;
pub mod error;
pub mod log_line;
pub mod protocol;
pub mod router;
pub mod scrollback;
pub mod session;
pub mod supervisor;
pub mod transport;

pub use client::ConsoleClient;
pub use config::ConsoleOptions;
pub use credentials::{
    parse_credentials, ApiFlavor, CredentialFetcher, Credentials, HttpCredentialFetcher, SecretToken,
};
pub use dispatcher::{CommandDispatcher, DispatchOutcome, PendingCommand};
pub use error::{ConsoleError, CredentialError, TransportError};
pub use log_line::{LineClass, LogLine};
pub use protocol::{ControlEvent, Frame, OutboundFrame, OutputOrigin, PowerSignal};
pub use router::{ConsoleEvent, EventRouter, Routed, Subscription};
pub use scrollback::{ScrollbackBuffer, DEFAULT_SCROLLBACK_CAPACITY};
pub use session::{SessionId, TransportSession, TransportState, DEFAULT_CLOSE_TIMEOUT};
pub use supervisor::{ConnectionStatus, SupervisorState};
pub use transport::{Connector, FrameSink, FrameStream, TransportPair, WsConnector};

#[cfg(test)]
mod mock;
