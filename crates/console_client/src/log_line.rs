//! Display lines and their semantic classes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker that starts every locally echoed operator command.
pub const COMMAND_ECHO_MARKER: &str = ">";

/// Semantic class of a display line, used by front-ends for colouring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineClass {
    Info,
    Warn,
    Error,
    /// Players joining or leaving
    Social,
    /// Operator input echoed locally
    Command,
    /// Generated by the client itself (status changes, power actions)
    System,
    /// Inbound text that was not a recognised frame
    Raw,
}

impl LineClass {
    /// Derive a class from console text.
    ///
    /// Case-sensitive substring checks, first match wins:
    /// `WARN`, then `ERROR`/`SEVERE`, then `joined`/`left`, then a leading
    /// command echo marker. Everything else is `Info`.
    pub fn from_text(text: &str) -> Self {
        if text.contains("WARN") {
            LineClass::Warn
        } else if text.contains("ERROR") || text.contains("SEVERE") {
            LineClass::Error
        } else if text.contains("joined") || text.contains("left") {
            LineClass::Social
        } else if text.starts_with(COMMAND_ECHO_MARKER) {
            LineClass::Command
        } else {
            LineClass::Info
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LineClass::Info => "info",
            LineClass::Warn => "warn",
            LineClass::Error => "error",
            LineClass::Social => "social",
            LineClass::Command => "command",
            LineClass::System => "system",
            LineClass::Raw => "raw",
        }
    }
}

impl fmt::Display for LineClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable line of scrollback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogLine {
    timestamp: DateTime<Utc>,
    class: LineClass,
    text: String,
}

impl LogLine {
    pub fn new(class: LineClass, text: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            class,
            text: text.into(),
        }
    }

    /// A line whose class is derived from its text.
    pub fn classified(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(LineClass::from_text(&text), text)
    }

    /// Local echo of an operator command, e.g. `> say hi`.
    pub fn command_echo(command: &str) -> Self {
        Self::new(LineClass::Command, format!("{COMMAND_ECHO_MARKER} {command}"))
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(LineClass::System, text)
    }

    pub fn raw(text: impl Into<String>) -> Self {
        Self::new(LineClass::Raw, text)
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn class(&self) -> LineClass {
        self.class
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}
