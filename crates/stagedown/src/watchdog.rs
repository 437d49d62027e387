//! Force-kill deadline.
//!
//! The deadline is waited out on a blocking-pool thread, so it fires even
//! while a closer blocks the runtime thread running the kill sequence.

use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{self, RecvTimeoutError, Sender};
use tokio::sync::oneshot;
use tracing::{debug, error};

use crate::exit::ExitHook;

/// Disarms the watchdog when dropped.
pub(crate) struct WatchdogGuard {
    _disarm: Sender<()>,
}

impl WatchdogGuard {
    pub(crate) fn disarm(self) {
        debug!("Force-kill watchdog disarmed");
    }
}

/// Arms a one-shot deadline. When `window` elapses before the returned guard
/// is dropped, the exit hook runs with `code` and the returned receiver
/// resolves.
pub(crate) fn arm(
    window: Duration,
    exit_hook: Arc<dyn ExitHook>,
    code: i32,
) -> (WatchdogGuard, oneshot::Receiver<()>) {
    let (disarm_tx, disarm_rx) = channel::bounded::<()>(0);
    let (fired_tx, fired_rx) = oneshot::channel();

    tokio::task::spawn_blocking(move || {
        // Disconnected means the guard was dropped: the sequence finished.
        if let Err(RecvTimeoutError::Timeout) = disarm_rx.recv_timeout(window) {
            error!("⏰ Timeout! Force exiting after {window:?} with status {code}");
            exit_hook.exit(code);
            let _ = fired_tx.send(());
        }
    });

    (WatchdogGuard { _disarm: disarm_tx }, fired_rx)
}
