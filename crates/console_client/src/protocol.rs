//! Wire protocol spoken over the console socket.
//!
//! Every structured frame is a JSON object of the shape
//!
//! ```json
//! { "event": "console output", "args": ["[12:00:00 INFO]: Done (3.2s)!"] }
//! ```
//!
//! The daemon interleaves such frames with plain text, so decoding never fails:
//! anything that is not a frame of a known event comes back as
//! [`ControlEvent::Unknown`] carrying the original text.

use crate::credentials::SecretToken;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Outbound event names
pub const EVENT_AUTH: &str = "auth";
pub const EVENT_SEND_LOGS: &str = "send logs";
pub const EVENT_SEND_COMMAND: &str = "send command";
pub const EVENT_SET_STATE: &str = "set state";

/// Inbound event names
pub const EVENT_AUTH_SUCCESS: &str = "auth success";
pub const EVENT_CONSOLE_OUTPUT: &str = "console output";
pub const EVENT_STATUS: &str = "status";
pub const EVENT_TOKEN_EXPIRING: &str = "token expiring";
pub const EVENT_TOKEN_EXPIRED: &str = "token expired";
pub const EVENT_JWT_ERROR: &str = "jwt error";
pub const EVENT_DAEMON_MESSAGE: &str = "daemon message";
pub const EVENT_DAEMON_ERROR: &str = "daemon error";
pub const EVENT_INSTALL_OUTPUT: &str = "install output";
pub const EVENT_STATS: &str = "stats";

/// A single structured frame as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl Frame {
    fn first_str(&self) -> Option<&str> {
        self.args.first().and_then(Value::as_str)
    }
}

/// Where a line of output came from on the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputOrigin {
    /// The game process's own stdout
    Console,
    /// Informational message from the daemon managing the process
    Daemon,
    /// Error reported by the daemon
    DaemonError,
    /// Output of the install script
    Install,
}

/// A decoded inbound frame.
///
/// Transient: it is consumed by the session and router as soon as it is
/// decoded and never retained.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    AuthResult {
        success: bool,
        reason: Option<String>,
    },
    LogOutput {
        text: String,
        origin: OutputOrigin,
    },
    StatusChanged(String),
    TokenExpiring,
    /// The grant lapsed; the daemon will drop the socket
    TokenExpired,
    /// Resource usage snapshot, passed through to subscribers untouched
    Stats(Value),
    /// Anything that is not a recognised frame, kept verbatim
    Unknown(String),
}

impl ControlEvent {
    /// Decode one inbound text frame.
    ///
    /// Structured decode is attempted first. Text that is not a JSON frame, a
    /// frame with an unrecognised event, or a recognised event with unusable
    /// arguments falls back to [`ControlEvent::Unknown`] with the original text.
    pub fn decode(text: &str) -> Self {
        let frame: Frame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(_) => return ControlEvent::Unknown(text.to_string()),
        };

        Self::from_frame(&frame).unwrap_or_else(|| ControlEvent::Unknown(text.to_string()))
    }

    fn from_frame(frame: &Frame) -> Option<Self> {
        let output = |origin| {
            frame.first_str().map(|text| ControlEvent::LogOutput {
                text: text.to_string(),
                origin,
            })
        };

        match frame.event.as_str() {
            EVENT_AUTH_SUCCESS => Some(ControlEvent::AuthResult {
                success: true,
                reason: None,
            }),
            EVENT_JWT_ERROR => Some(ControlEvent::AuthResult {
                success: false,
                reason: frame.first_str().map(str::to_string),
            }),
            EVENT_CONSOLE_OUTPUT => output(OutputOrigin::Console),
            EVENT_DAEMON_MESSAGE => output(OutputOrigin::Daemon),
            EVENT_DAEMON_ERROR => output(OutputOrigin::DaemonError),
            EVENT_INSTALL_OUTPUT => output(OutputOrigin::Install),
            EVENT_STATUS => frame
                .first_str()
                .map(|status| ControlEvent::StatusChanged(status.to_string())),
            EVENT_TOKEN_EXPIRING => Some(ControlEvent::TokenExpiring),
            EVENT_TOKEN_EXPIRED => Some(ControlEvent::TokenExpired),
            EVENT_STATS => {
                // stats payloads arrive as a JSON document encoded in a string
                let raw = frame.args.first()?;
                let value = match raw.as_str() {
                    Some(encoded) => serde_json::from_str(encoded).ok()?,
                    None => raw.clone(),
                };
                Some(ControlEvent::Stats(value))
            }
            _ => None,
        }
    }
}

/// Power signals understood by the daemon's `set state` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerSignal {
    Start,
    Stop,
    Restart,
    Kill,
}

impl PowerSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            PowerSignal::Start => "start",
            PowerSignal::Stop => "stop",
            PowerSignal::Restart => "restart",
            PowerSignal::Kill => "kill",
        }
    }
}

impl fmt::Display for PowerSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PowerSignal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(PowerSignal::Start),
            "stop" => Ok(PowerSignal::Stop),
            "restart" => Ok(PowerSignal::Restart),
            "kill" => Ok(PowerSignal::Kill),
            other => Err(format!("unknown power signal: {other}")),
        }
    }
}

/// Frames the client sends.
#[derive(Debug, Clone)]
pub enum OutboundFrame {
    Auth(SecretToken),
    SendLogs,
    SendCommand(String),
    SetState(PowerSignal),
}

impl OutboundFrame {
    pub fn event_name(&self) -> &'static str {
        match self {
            OutboundFrame::Auth(_) => EVENT_AUTH,
            OutboundFrame::SendLogs => EVENT_SEND_LOGS,
            OutboundFrame::SendCommand(_) => EVENT_SEND_COMMAND,
            OutboundFrame::SetState(_) => EVENT_SET_STATE,
        }
    }

    pub fn to_frame(&self) -> Frame {
        let args = match self {
            OutboundFrame::Auth(token) => vec![Value::String(token.expose().to_string())],
            OutboundFrame::SendLogs => vec![Value::Null],
            OutboundFrame::SendCommand(command) => vec![Value::String(command.clone())],
            OutboundFrame::SetState(signal) => vec![Value::String(signal.as_str().to_string())],
        };
        Frame {
            event: self.event_name().to_string(),
            args,
        }
    }

    /// Serialize to the JSON text sent on the socket.
    pub fn encode(&self) -> String {
        let frame = self.to_frame();
        serde_json::json!({ "event": frame.event, "args": frame.args }).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(text: &str) -> Value {
        serde_json::from_str(text).unwrap()
    }

    #[test]
    fn test_outbound_encoding() {
        let auth = OutboundFrame::Auth(SecretToken::new("t1"));
        assert_eq!(parse(&auth.encode()), json!({"event": "auth", "args": ["t1"]}));

        assert_eq!(
            parse(&OutboundFrame::SendLogs.encode()),
            json!({"event": "send logs", "args": [null]})
        );
        assert_eq!(
            parse(&OutboundFrame::SendCommand("say hi".into()).encode()),
            json!({"event": "send command", "args": ["say hi"]})
        );
        assert_eq!(
            parse(&OutboundFrame::SetState(PowerSignal::Restart).encode()),
            json!({"event": "set state", "args": ["restart"]})
        );
    }

    #[test]
    fn test_auth_frame_debug_hides_token() {
        let auth = OutboundFrame::Auth(SecretToken::new("super-secret"));
        assert!(!format!("{auth:?}").contains("super-secret"));
    }

    #[test]
    fn test_decode_known_events() {
        assert_eq!(
            ControlEvent::decode(r#"{"event":"auth success","args":[]}"#),
            ControlEvent::AuthResult { success: true, reason: None }
        );
        assert_eq!(
            ControlEvent::decode(r#"{"event":"auth success"}"#),
            ControlEvent::AuthResult { success: true, reason: None }
        );
        assert_eq!(
            ControlEvent::decode(r#"{"event":"jwt error","args":["signature is invalid"]}"#),
            ControlEvent::AuthResult {
                success: false,
                reason: Some("signature is invalid".into())
            }
        );
        assert_eq!(
            ControlEvent::decode(r#"{"event":"console output","args":["[WARN]: low memory"]}"#),
            ControlEvent::LogOutput {
                text: "[WARN]: low memory".into(),
                origin: OutputOrigin::Console
            }
        );
        assert_eq!(
            ControlEvent::decode(r#"{"event":"status","args":["running"]}"#),
            ControlEvent::StatusChanged("running".into())
        );
        assert_eq!(
            ControlEvent::decode(r#"{"event":"token expiring","args":[]}"#),
            ControlEvent::TokenExpiring
        );
        assert_eq!(
            ControlEvent::decode(r#"{"event":"token expired"}"#),
            ControlEvent::TokenExpired
        );
    }

    #[test]
    fn test_decode_stats_string_payload() {
        let text = r#"{"event":"stats","args":["{\"memory_bytes\":1024,\"state\":\"running\"}"]}"#;
        assert_eq!(
            ControlEvent::decode(text),
            ControlEvent::Stats(json!({"memory_bytes": 1024, "state": "running"}))
        );
    }

    #[test]
    fn test_unparseable_input_falls_back_to_unknown() {
        let cases = [
            "plain text line",
            "",
            "{not json",
            "[1,2,3]",
            r#"{"args":["no event"]}"#,
            r#"{"event":"backup completed","args":[]}"#,
            r#"{"event":"console output","args":[42]}"#,
            r#"{"event":"status","args":[]}"#,
            r#"{"event":"stats","args":["not json"]}"#,
        ];
        for case in cases {
            assert_eq!(ControlEvent::decode(case), ControlEvent::Unknown(case.to_string()), "{case}");
        }
    }

    #[test]
    fn test_power_signal_parsing() {
        assert_eq!("restart".parse::<PowerSignal>(), Ok(PowerSignal::Restart));
        assert_eq!(" KILL ".parse::<PowerSignal>(), Ok(PowerSignal::Kill));
        assert!("reboot".parse::<PowerSignal>().is_err());
    }
}
