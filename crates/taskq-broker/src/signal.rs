use std::io;
#[cfg(unix)]
use tokio::signal::unix::{signal, Signal, SignalKind};

/// Process stop requests a binary drains on: SIGINT and, on Unix, SIGTERM.
///
/// The SIGTERM handler is installed by [`StopSignals::install`], so the
/// default action (immediate exit) is replaced before anything is spawned.
pub struct StopSignals {
    #[cfg(unix)]
    terminate: Signal,
}

impl StopSignals {
    pub fn install() -> io::Result<Self> {
        Ok(StopSignals {
            #[cfg(unix)]
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Wait for the first stop request and return its name
    #[cfg(unix)]
    pub async fn recv(&mut self) -> io::Result<&'static str> {
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT"),
            _ = self.terminate.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> io::Result<&'static str> {
        tokio::signal::ctrl_c().await.map(|()| "ctrl-c")
    }
}
