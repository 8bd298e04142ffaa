//! Error taxonomy for the console client.
//!
//! Every failure the client can hit maps onto one of these types. None of them
//! is fatal to the host application: the supervisor turns each of them into a
//! visible status string and falls back to the `Disconnected` state.

use crate::supervisor::SupervisorState;

/// Failure while obtaining a streaming grant from the management API.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CredentialError {
    /// The request never produced a response (DNS, TLS, refused, timeout)
    #[error("credential request failed: {0}")]
    Network(String),
    /// The API answered with a non-success status code
    #[error("credential request rejected with status {status}: {body}")]
    Status { status: u16, body: String },
    /// The body was not the expected JSON shape, or the endpoint URL is unusable
    #[error("malformed credential response: {0}")]
    Malformed(String),
    /// A required field was absent or empty
    #[error("credential response is missing `{0}`")]
    MissingField(&'static str),
}

/// Socket-level failure of one streaming connection.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("failed to open console socket: {0}")]
    Connect(String),
    #[error("failed to send frame: {0}")]
    Send(String),
    #[error("failed to receive frame: {0}")]
    Receive(String),
    /// The remote side closed the stream
    #[error("console socket closed{}", .0.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
    Closed(Option<String>),
}

/// Errors surfaced by the console client API.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConsoleError {
    #[error(transparent)]
    Credential(#[from] CredentialError),
    /// The grant was refused by the remote daemon. Terminal for the session;
    /// the same token must never be retried.
    #[error("authentication rejected: {0}")]
    AuthRejected(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// A command was issued while no session is authenticated. Never reaches the wire.
    #[error("console is not connected")]
    NotConnected,
    /// `reconnect()` is only valid from the terminal `Disconnected` state
    #[error("reconnect is not available while {0}")]
    ReconnectUnavailable(SupervisorState),
    /// The owning view has been torn down and the client task has stopped
    #[error("console client has shut down")]
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_are_operator_readable() {
        let err = ConsoleError::from(CredentialError::MissingField("token"));
        assert_eq!(err.to_string(), "credential response is missing `token`");

        let err = ConsoleError::from(TransportError::Closed(None));
        assert_eq!(err.to_string(), "console socket closed");

        let err = ConsoleError::from(TransportError::Closed(Some("going away".to_string())));
        assert_eq!(err.to_string(), "console socket closed: going away");

        let err = ConsoleError::ReconnectUnavailable(SupervisorState::Live);
        assert_eq!(err.to_string(), "reconnect is not available while live");
    }
}
