//! The shutdown coordinator.
//!
//! Waits for one termination signal, then walks the registered targets in
//! registration order: release the target's resources, wait for its workers
//! to drain, move on. A watchdog armed when the signal arrives forces the
//! process out if the whole walk does not finish within the force-kill
//! window.
//!
//! ```text
//! Idle → AwaitingSignal → Draining(0) → … → Draining(n-1) → Drained
//!                              └────────────┴──→ ForceKilled
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::ShutdownError;
use crate::exit::{ExitHook, ProcessExit};
use crate::settings::{ShutdownSettings, MAX_FORCE_EXIT_CODE, MIN_FORCE_EXIT_CODE};
use crate::signals::{listen_for_os_signals, ShutdownSignal, ShutdownTrigger, SIGNAL_BUFFER};
use crate::target::{ReleaseSummary, Target};
use crate::watchdog;

/// Where a coordinator is in its single kill sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownPhase {
    Idle,
    AwaitingSignal,
    /// Releasing or draining the target at `index` in registration order
    Draining { index: usize, name: String },
    Drained,
    ForceKilled,
}

/// Per-target record of a completed drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetReport {
    pub name: String,
    pub released: ReleaseSummary,
    /// Time from the start of the release to the end of the drain
    pub elapsed: Duration,
}

/// Record of a kill sequence that finished inside the window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub signal: ShutdownSignal,
    pub targets: Vec<TargetReport>,
    pub elapsed: Duration,
}

/// How [`Coordinator::wait_and_shutdown`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every target released and drained in order.
    Drained(ShutdownReport),
    /// The force-kill window elapsed and the exit hook was invoked. Only
    /// observable when the exit hook returns.
    ForceKilled {
        signal: ShutdownSignal,
        stalled_target: Option<String>,
        elapsed: Duration,
    },
}

impl ShutdownOutcome {
    pub fn is_drained(&self) -> bool {
        matches!(self, ShutdownOutcome::Drained(_))
    }
}

/// Drives registered [`Target`]s through shutdown when the process is asked
/// to terminate.
///
/// One coordinator per process is the convention: it owns the process's
/// termination signal subscription for as long as it lives.
///
/// # Examples
///
/// ```rust,no_run
/// use std::time::Duration;
/// use stagedown::{Coordinator, Target};
/// use tokio::sync::mpsc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut coordinator = Coordinator::new()?;
/// coordinator.set_force_kill_window(Duration::from_secs(2));
///
/// let parse = Target::new("parse");
/// let (tx, mut rx) = mpsc::channel::<Vec<u8>>(64);
/// // Upstream writes through a weak sender; the tracked sender keeps the
/// // channel open until `parse` is released.
/// let upstream = tx.downgrade();
/// parse.track_channel(tx)?;
/// tokio::spawn(async move {
///     while let Some(tx) = upstream.upgrade() {
///         if tx.send(vec![0u8; 16]).await.is_err() {
///             break;
///         }
///     }
/// });
/// let guard = parse.enter();
/// tokio::spawn(async move {
///     let _guard = guard;
///     while let Some(_frame) = rx.recv().await {}
/// });
///
/// coordinator.register_target(parse);
/// coordinator.wait_and_shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct Coordinator {
    targets: Vec<Arc<Target>>,
    signal_tx: mpsc::Sender<ShutdownSignal>,
    signal_rx: mpsc::Receiver<ShutdownSignal>,
    os_listener: Option<JoinHandle<()>>,
    force_kill_window: Duration,
    force_exit_code: i32,
    exit_hook: Arc<dyn ExitHook>,
    phase: watch::Sender<ShutdownPhase>,
}

impl Coordinator {
    /// Creates a coordinator subscribed to SIGINT and SIGTERM (Ctrl+C on
    /// non-Unix platforms), with a five second force-kill window and an exit
    /// hook that really exits the process.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new() -> Result<Self, ShutdownError> {
        let mut coordinator = Self::without_os_signals();
        let listener = listen_for_os_signals(coordinator.signal_tx.clone())?;
        coordinator.os_listener = Some(listener);
        Ok(coordinator)
    }

    /// Creates a coordinator that only reacts to its [`ShutdownTrigger`]s.
    pub fn without_os_signals() -> Self {
        let defaults = ShutdownSettings::default();
        let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_BUFFER);
        let (phase, _) = watch::channel(ShutdownPhase::Idle);

        Self {
            targets: Vec::new(),
            signal_tx,
            signal_rx,
            os_listener: None,
            force_kill_window: defaults.force_kill_window(),
            force_exit_code: defaults.force_exit_code,
            exit_hook: Arc::new(ProcessExit),
            phase,
        }
    }

    /// Creates a signal-subscribed coordinator configured from `settings`.
    pub fn from_settings(settings: &ShutdownSettings) -> Result<Self, ShutdownError> {
        settings.validate()?;
        let mut coordinator = Self::new()?;
        coordinator.set_force_kill_window(settings.force_kill_window());
        coordinator.set_force_exit_code(settings.force_exit_code);
        Ok(coordinator)
    }

    /// Sets how long the kill sequence may run before the process is forced
    /// out.
    pub fn set_force_kill_window(&mut self, window: Duration) {
        self.force_kill_window = window;
    }

    /// Current force-kill window.
    pub fn force_kill_window(&self) -> Duration {
        self.force_kill_window
    }

    /// Sets the status handed to the exit hook on a forced exit.
    ///
    /// Codes outside `1..=255` are clamped into that range, matching what
    /// [`ShutdownSettings::validate`] accepts.
    pub fn set_force_exit_code(&mut self, code: i32) {
        let clamped = code.clamp(MIN_FORCE_EXIT_CODE, MAX_FORCE_EXIT_CODE);
        if clamped != code {
            warn!("Force exit code {} out of range, using {}", code, clamped);
        }
        self.force_exit_code = clamped;
    }

    /// Replaces the action taken when the force-kill window elapses.
    pub fn set_exit_hook<H>(&mut self, hook: H)
    where
        H: ExitHook + 'static,
    {
        self.exit_hook = Arc::new(hook);
    }

    /// Appends a target to the kill order. Targets are not deduplicated.
    pub fn register_target(&mut self, target: Arc<Target>) {
        info!(
            "Registered target {} ({} closers, {} channels) at position {}",
            target.name(),
            target.closer_count(),
            target.channel_count(),
            self.targets.len()
        );
        self.targets.push(target);
    }

    /// Number of registered targets, duplicates included.
    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Returns a handle that starts the kill sequence programmatically.
    pub fn trigger(&self) -> ShutdownTrigger {
        ShutdownTrigger::new(self.signal_tx.clone())
    }

    /// Subscribes to phase changes of the kill sequence.
    pub fn phase(&self) -> watch::Receiver<ShutdownPhase> {
        self.phase.subscribe()
    }

    /// Waits for one termination signal, then releases and drains every
    /// target in registration order.
    ///
    /// Returns once the last target has drained. If the force-kill window
    /// elapses first, the exit hook is invoked with the force exit code; with
    /// the default hook the process ends there, otherwise
    /// [`ShutdownOutcome::ForceKilled`] is returned and the remaining targets
    /// are left as they are.
    pub async fn wait_and_shutdown(mut self) -> ShutdownOutcome {
        self.phase.send_replace(ShutdownPhase::AwaitingSignal);
        info!("🛑 Shutdown coordinator started - waiting for SIGINT or SIGTERM");

        // The coordinator holds a sender itself, so the channel cannot close.
        let signal = self
            .signal_rx
            .recv()
            .await
            .unwrap_or(ShutdownSignal::Manual);
        info!("📡 Received {signal} signal, shutting down");
        info!("Killing {} targets", self.targets.len());

        let started = Instant::now();
        let (watchdog, mut fired) = watchdog::arm(
            self.force_kill_window,
            Arc::clone(&self.exit_hook),
            self.force_exit_code,
        );

        tokio::select! {
            reports = drain_targets(&self.targets, &self.phase) => {
                watchdog.disarm();
                self.phase.send_replace(ShutdownPhase::Drained);
                info!("✅ Killed all targets, returning control");
                ShutdownOutcome::Drained(ShutdownReport {
                    signal,
                    targets: reports,
                    elapsed: started.elapsed(),
                })
            }
            Ok(()) = &mut fired => {
                let stalled_target = match &*self.phase.borrow() {
                    ShutdownPhase::Draining { name, .. } => Some(name.clone()),
                    _ => None,
                };
                self.phase.send_replace(ShutdownPhase::ForceKilled);
                ShutdownOutcome::ForceKilled {
                    signal,
                    stalled_target,
                    elapsed: started.elapsed(),
                }
            }
        }
    }
}

async fn drain_targets(
    targets: &[Arc<Target>],
    phase: &watch::Sender<ShutdownPhase>,
) -> Vec<TargetReport> {
    let mut reports = Vec::with_capacity(targets.len());

    for (index, target) in targets.iter().enumerate() {
        phase.send_replace(ShutdownPhase::Draining {
            index,
            name: target.name().to_string(),
        });

        let started = Instant::now();
        let released = target.release();
        info!(
            "⏳ Waiting for {} workers of target {} to finish",
            target.pending(),
            target.name()
        );
        target.await_drain().await;

        reports.push(TargetReport {
            name: target.name().to_string(),
            released,
            elapsed: started.elapsed(),
        });
    }

    reports
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        if let Some(listener) = self.os_listener.take() {
            listener.abort();
        }
    }
}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("targets", &self.targets)
            .field("force_kill_window", &self.force_kill_window)
            .field("force_exit_code", &self.force_exit_code)
            .field("listening", &self.os_listener.is_some())
            .field("phase", &*self.phase.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::closer::FnCloser;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    /// Spawns a worker that drains `rx` until the channel closes, recording
    /// the moment it finishes under `label`.
    fn spawn_ranging_worker(
        target: &Arc<Target>,
        mut rx: mpsc::Receiver<u32>,
        events: Arc<Mutex<Vec<String>>>,
        label: &'static str,
    ) {
        let guard = target.enter();
        tokio::spawn(async move {
            let _guard = guard;
            while let Some(_value) = rx.recv().await {}
            events.lock().unwrap().push(format!("{label} drained"));
        });
    }

    fn recording_exit_hook() -> (Arc<AtomicI32>, impl ExitHook + 'static) {
        let seen = Arc::new(AtomicI32::new(-1));
        let seen_clone = seen.clone();
        (seen, move |code: i32| seen_clone.store(code, Ordering::SeqCst))
    }

    #[tokio::test]
    async fn test_single_target_drains_quickly() {
        let mut coordinator = Coordinator::without_os_signals();
        coordinator.set_force_kill_window(Duration::from_secs(1));
        let (exit_code, hook) = recording_exit_hook();
        coordinator.set_exit_hook(hook);

        let a = Target::new("A");
        let (tx, rx) = mpsc::channel(8);
        a.track_channel(tx).unwrap();
        spawn_ranging_worker(&a, rx, Arc::new(Mutex::new(Vec::new())), "A");
        coordinator.register_target(a.clone());

        let trigger = coordinator.trigger();
        let signalled = Instant::now();
        assert!(trigger.trigger());
        let outcome = coordinator.wait_and_shutdown().await;

        assert!(signalled.elapsed() < Duration::from_millis(50));
        let ShutdownOutcome::Drained(report) = outcome else {
            panic!("expected a drained shutdown, got {outcome:?}");
        };
        assert_eq!(report.signal, ShutdownSignal::Manual);
        assert_eq!(report.targets.len(), 1);
        assert_eq!(report.targets[0].name, "A");
        assert_eq!(report.targets[0].released.channels_closed, 1);
        assert_eq!(a.pending(), 0);
        assert_eq!(exit_code.load(Ordering::SeqCst), -1);
    }

    #[tokio::test]
    async fn test_targets_drain_in_registration_order() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut coordinator = Coordinator::without_os_signals();

        for label in ["A", "B", "C"] {
            let target = Target::new(label);
            let (tx, rx) = mpsc::channel(8);
            target.track_channel(tx).unwrap();

            let events_for_closer = events.clone();
            target.track_closer(FnCloser::new(move || {
                events_for_closer.lock().unwrap().push(format!("{label} released"));
                Ok(())
            }));
            spawn_ranging_worker(&target, rx, events.clone(), label);
            coordinator.register_target(target);
        }

        coordinator.trigger().trigger();
        let outcome = coordinator.wait_and_shutdown().await;
        assert!(outcome.is_drained());

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                "A released",
                "A drained",
                "B released",
                "B drained",
                "C released",
                "C drained",
            ]
        );
    }

    #[tokio::test]
    async fn test_next_target_untouched_until_previous_drains() {
        let mut coordinator = Coordinator::without_os_signals();

        let first = Target::new("first");
        let (release_worker_tx, release_worker_rx) = oneshot::channel::<()>();
        let guard = first.enter();
        tokio::spawn(async move {
            let _guard = guard;
            let _ = release_worker_rx.await;
        });

        let second = Target::new("second");
        let (second_tx, second_rx) = mpsc::channel::<u32>(1);
        second.track_channel(second_tx).unwrap();

        coordinator.register_target(first);
        coordinator.register_target(second.clone());
        let mut phase = coordinator.phase();

        coordinator.trigger().trigger();
        let shutdown = tokio::spawn(coordinator.wait_and_shutdown());

        phase
            .wait_for(|p| matches!(p, ShutdownPhase::Draining { index: 0, .. }))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(second.channel_count(), 1);
        assert!(!second_rx.is_closed());

        release_worker_tx.send(()).unwrap();
        let outcome = shutdown.await.unwrap();
        assert!(outcome.is_drained());
        assert_eq!(second.channel_count(), 0);
        assert!(second_rx.is_closed());
    }

    #[tokio::test]
    async fn test_stuck_target_is_force_killed() {
        let mut coordinator = Coordinator::without_os_signals();
        coordinator.set_force_kill_window(Duration::from_secs(1));
        let (exit_code, hook) = recording_exit_hook();
        coordinator.set_exit_hook(hook);

        let b = Target::new("B");
        b.begin(1);
        coordinator.register_target(b);

        let never_reached = Target::new("after-B");
        let (tx, rx) = mpsc::channel::<u32>(1);
        never_reached.track_channel(tx).unwrap();
        coordinator.register_target(never_reached.clone());

        coordinator.trigger().trigger();
        let signalled = Instant::now();
        let outcome = coordinator.wait_and_shutdown().await;
        let elapsed = signalled.elapsed();

        assert!(elapsed >= Duration::from_secs(1), "fired early: {elapsed:?}");
        assert!(elapsed < Duration::from_millis(1100), "fired late: {elapsed:?}");
        assert_eq!(exit_code.load(Ordering::SeqCst), 1);
        match outcome {
            ShutdownOutcome::ForceKilled { stalled_target, .. } => {
                assert_eq!(stalled_target.as_deref(), Some("B"));
            }
            other => panic!("expected a forced exit, got {other:?}"),
        }
        // Abandoned in place
        assert_eq!(never_reached.channel_count(), 1);
        assert!(!rx.is_closed());
    }

    #[tokio::test]
    async fn test_custom_force_exit_code() {
        let mut coordinator = Coordinator::without_os_signals();
        coordinator.set_force_kill_window(Duration::from_millis(100));
        coordinator.set_force_exit_code(42);
        let (exit_code, hook) = recording_exit_hook();
        coordinator.set_exit_hook(hook);

        let stuck = Target::new("stuck");
        stuck.begin(1);
        coordinator.register_target(stuck);

        coordinator.trigger().trigger();
        let outcome = coordinator.wait_and_shutdown().await;
        assert!(!outcome.is_drained());
        assert_eq!(exit_code.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn test_force_exit_code_is_clamped_like_settings() {
        let mut coordinator = Coordinator::without_os_signals();

        coordinator.set_force_exit_code(0);
        assert!(format!("{coordinator:?}").contains("force_exit_code: 1,"));

        coordinator.set_force_exit_code(300);
        assert!(format!("{coordinator:?}").contains("force_exit_code: 255,"));

        coordinator.set_force_exit_code(-4);
        assert!(format!("{coordinator:?}").contains("force_exit_code: 1,"));

        let zero = ShutdownSettings {
            force_kill_window_ms: 1000,
            force_exit_code: 0,
        };
        assert!(zero.validate().is_err());
    }

    #[tokio::test]
    async fn test_waits_for_signal_before_releasing() {
        let mut coordinator = Coordinator::without_os_signals();
        let target = Target::new("idle");
        let (tx, rx) = mpsc::channel::<u32>(1);
        target.track_channel(tx).unwrap();
        coordinator.register_target(target);

        let trigger = coordinator.trigger();
        let mut phase = coordinator.phase();
        let shutdown = tokio::spawn(coordinator.wait_and_shutdown());

        phase
            .wait_for(|p| *p == ShutdownPhase::AwaitingSignal)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!rx.is_closed());
        assert!(!shutdown.is_finished());

        trigger.trigger();
        assert!(shutdown.await.unwrap().is_drained());
        assert!(rx.is_closed());
    }

    #[tokio::test]
    async fn test_no_targets() {
        let coordinator = Coordinator::without_os_signals();
        assert_eq!(coordinator.target_count(), 0);
        coordinator.trigger().trigger();

        let ShutdownOutcome::Drained(report) = coordinator.wait_and_shutdown().await else {
            panic!("empty coordinator should drain");
        };
        assert!(report.targets.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_registration_releases_once() {
        let mut coordinator = Coordinator::without_os_signals();
        let target = Target::new("dup");
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();
        target.track_closer(FnCloser::new(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        coordinator.register_target(target.clone());
        coordinator.register_target(target);
        assert_eq!(coordinator.target_count(), 2);

        coordinator.trigger().trigger();
        let ShutdownOutcome::Drained(report) = coordinator.wait_and_shutdown().await else {
            panic!("expected a drained shutdown");
        };
        assert_eq!(report.targets.len(), 2);
        assert_eq!(report.targets[1].released, ReleaseSummary::default());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_from_settings_rejects_invalid() {
        let settings = ShutdownSettings {
            force_kill_window_ms: 0,
            ..ShutdownSettings::default()
        };
        assert!(matches!(
            Coordinator::from_settings(&settings),
            Err(ShutdownError::InvalidSettings(_))
        ));
    }

    #[tokio::test]
    async fn test_from_settings_applies_values() {
        let settings = ShutdownSettings {
            force_kill_window_ms: 250,
            force_exit_code: 9,
        };
        let coordinator = Coordinator::from_settings(&settings).unwrap();
        assert_eq!(coordinator.force_kill_window(), Duration::from_millis(250));
        assert!(format!("{coordinator:?}").contains("force_exit_code: 9"));
    }
}
