//! Waiting for the operator or the service manager to stop the console.

use std::fmt;
use tokio::signal;

/// Why the console is being stopped from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopRequest {
    /// Ctrl+C at the terminal (SIGINT on Unix)
    Interrupt,
    /// SIGTERM, usually from a service manager
    Terminate,
}

impl fmt::Display for StopRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopRequest::Interrupt => f.write_str("interrupted"),
            StopRequest::Terminate => f.write_str("terminated"),
        }
    }
}

/// Resolves with the first stop request. Handlers are installed on the first
/// poll, so errors only come from the platform refusing them.
pub async fn stop_requested() -> std::io::Result<StopRequest> {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;

        let request = tokio::select! {
            _ = interrupt.recv() => StopRequest::Interrupt,
            _ = terminate.recv() => StopRequest::Terminate,
        };
        Ok(request)
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        Ok(StopRequest::Interrupt)
    }
}
