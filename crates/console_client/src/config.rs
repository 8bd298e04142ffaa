//! Runtime options for a console client.

use crate::scrollback::DEFAULT_SCROLLBACK_CAPACITY;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_scrollback_capacity() -> usize {
    DEFAULT_SCROLLBACK_CAPACITY
}

fn default_event_channel_capacity() -> usize {
    256
}

fn default_command_channel_capacity() -> usize {
    32
}

fn default_frame_queue_capacity() -> usize {
    1024
}

fn default_close_timeout_ms() -> u64 {
    2000
}

/// Tunables for [`ConsoleClient`](crate::ConsoleClient).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleOptions {
    /// Number of lines retained in the scrollback
    #[serde(default = "default_scrollback_capacity")]
    pub scrollback_capacity: usize,
    /// Per-subscriber event queue; slower subscribers get a `Lagged` notice
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
    /// Pending operator requests before callers wait
    #[serde(default = "default_command_channel_capacity")]
    pub command_channel_capacity: usize,
    /// Inbound frames queued between the socket readers and the supervisor
    #[serde(default = "default_frame_queue_capacity")]
    pub frame_queue_capacity: usize,
    /// How long a graceful socket close may take before the socket is dropped
    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,
    /// Ask for the log backlog again after a token refresh swap.
    /// Off by default since the replayed history duplicates retained lines.
    #[serde(default)]
    pub request_backlog_on_refresh: bool,
}

impl Default for ConsoleOptions {
    fn default() -> Self {
        Self {
            scrollback_capacity: default_scrollback_capacity(),
            event_channel_capacity: default_event_channel_capacity(),
            command_channel_capacity: default_command_channel_capacity(),
            frame_queue_capacity: default_frame_queue_capacity(),
            close_timeout_ms: default_close_timeout_ms(),
            request_backlog_on_refresh: false,
        }
    }
}

impl ConsoleOptions {
    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.scrollback_capacity == 0 {
            return Err("scrollback_capacity must be at least 1".to_string());
        }
        if self.event_channel_capacity == 0 {
            return Err("event_channel_capacity must be at least 1".to_string());
        }
        if self.command_channel_capacity == 0 {
            return Err("command_channel_capacity must be at least 1".to_string());
        }
        if self.frame_queue_capacity == 0 {
            return Err("frame_queue_capacity must be at least 1".to_string());
        }
        Ok(())
    }
}
