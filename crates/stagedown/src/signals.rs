//! Termination signal delivery.
//!
//! The coordinator owns one inbound channel of [`ShutdownSignal`]s. It is
//! fed by a listener task subscribed to the OS termination signals (SIGINT
//! and SIGTERM on Unix, Ctrl+C elsewhere) and by any [`ShutdownTrigger`]
//! handed out for programmatic shutdown. Every kind is handled identically.

use std::fmt;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Capacity of the coordinator's signal channel. Only the first signal is
/// ever consumed; the rest only need somewhere to land.
pub(crate) const SIGNAL_BUFFER: usize = 4;

/// The event that starts the kill sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGINT, or Ctrl+C on non-Unix platforms
    Interrupt,
    /// SIGTERM
    Terminate,
    /// Raised through a [`ShutdownTrigger`]
    Manual,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownSignal::Interrupt => write!(f, "SIGINT"),
            ShutdownSignal::Terminate => write!(f, "SIGTERM"),
            ShutdownSignal::Manual => write!(f, "manual"),
        }
    }
}

/// Starts the kill sequence without an OS signal.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    tx: mpsc::Sender<ShutdownSignal>,
}

impl ShutdownTrigger {
    pub(crate) fn new(tx: mpsc::Sender<ShutdownSignal>) -> Self {
        Self { tx }
    }

    /// Requests shutdown. Returns `false` if the coordinator is gone or its
    /// signal buffer (`SIGNAL_BUFFER` entries) is full.
    pub fn trigger(&self) -> bool {
        self.tx.try_send(ShutdownSignal::Manual).is_ok()
    }
}

/// Subscribes to the process termination signals and forwards them into
/// `tx`. Registration happens before this returns, so a signal sent right
/// after it is not lost.
#[cfg(unix)]
pub(crate) fn listen_for_os_signals(
    tx: mpsc::Sender<ShutdownSignal>,
) -> std::io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    Ok(tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                Some(()) = sigint.recv() => ShutdownSignal::Interrupt,
                Some(()) = sigterm.recv() => ShutdownSignal::Terminate,
                else => break,
            };
            debug!("OS delivered {received}");
            if let Err(mpsc::error::TrySendError::Closed(_)) = tx.try_send(received) {
                break;
            }
        }
    }))
}

#[cfg(not(unix))]
pub(crate) fn listen_for_os_signals(
    tx: mpsc::Sender<ShutdownSignal>,
) -> std::io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            debug!("OS delivered Ctrl+C");
            if let Err(mpsc::error::TrySendError::Closed(_)) =
                tx.try_send(ShutdownSignal::Interrupt)
            {
                break;
            }
        }
    }))
}
