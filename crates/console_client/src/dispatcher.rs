//! Operator command validation and dispatch.

use crate::error::ConsoleError;
use crate::log_line::LogLine;
use crate::protocol::{OutboundFrame, PowerSignal};
use crate::router::EventRouter;
use crate::session::TransportSession;

/// Result of a successful dispatch call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The frame was written and echoed locally
    Sent,
    /// Empty or whitespace-only input; nothing happened
    Ignored,
}

/// A validated operator command. Lives only for the duration of one send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommand {
    text: String,
}

impl PendingCommand {
    /// Validate raw operator input. Trailing line terminators are stripped;
    /// blank input yields `None`.
    pub fn parse(input: &str) -> Option<Self> {
        let text = input.trim_end_matches(['\r', '\n']);
        if text.trim().is_empty() {
            return None;
        }
        Some(Self { text: text.to_string() })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn frame(&self) -> OutboundFrame {
        OutboundFrame::SendCommand(self.text.clone())
    }

    /// The local echo; the remote never echoes commands back.
    pub fn echo(&self) -> LogLine {
        LogLine::command_echo(&self.text)
    }
}

/// Writes operator input onto the current session.
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Send a console command.
    ///
    /// Fails with [`ConsoleError::NotConnected`] unless `session` is
    /// authenticated, in which case nothing is written. The echo line is
    /// recorded only after the frame was handed to the transport.
    pub async fn send_command(
        session: Option<&mut TransportSession>,
        router: &EventRouter,
        input: &str,
    ) -> Result<DispatchOutcome, ConsoleError> {
        let Some(command) = PendingCommand::parse(input) else {
            return Ok(DispatchOutcome::Ignored);
        };
        let session = Self::authenticated(session)?;

        session.send(command.frame()).await?;
        router.record(command.echo());
        Ok(DispatchOutcome::Sent)
    }

    /// Ask the daemon to change the process's power state.
    pub async fn send_power(
        session: Option<&mut TransportSession>,
        router: &EventRouter,
        signal: PowerSignal,
    ) -> Result<DispatchOutcome, ConsoleError> {
        let session = Self::authenticated(session)?;

        session.send(OutboundFrame::SetState(signal)).await?;
        router.record(LogLine::system(format!("Power action sent: {signal}")));
        Ok(DispatchOutcome::Sent)
    }

    fn authenticated(
        session: Option<&mut TransportSession>,
    ) -> Result<&mut TransportSession, ConsoleError> {
        match session {
            Some(session) if session.is_authenticated() => Ok(session),
            _ => Err(ConsoleError::NotConnected),
        }
    }
}
