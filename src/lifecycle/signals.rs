//! OS signal handling.
//!
//! # Design Decisions
//! - SIGTERM/SIGINT stop the daemon
//! - SIGHUP requests a restart, re-reading the config record

/// What a received signal asks the daemon to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    Shutdown,
    Restart,
}

/// Wait for the next relevant signal.
#[cfg(unix)]
pub async fn next_signal() -> std::io::Result<SignalEvent> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate())?;
    let mut hup = signal(SignalKind::hangup())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.map(|_| SignalEvent::Shutdown),
        _ = term.recv() => Ok(SignalEvent::Shutdown),
        _ = hup.recv() => Ok(SignalEvent::Restart),
    }
}

#[cfg(not(unix))]
pub async fn next_signal() -> std::io::Result<SignalEvent> {
    tokio::signal::ctrl_c().await.map(|_| SignalEvent::Shutdown)
}
