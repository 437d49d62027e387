//! Shutdown targets.
//!
//! A [`Target`] is one shutdown stage: a named bundle of closers and channels
//! plus a counter of the workers that belong to the stage. When the
//! coordinator reaches a target it releases every tracked resource and then
//! waits for the worker counter to drop to zero before moving on.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::channel::ChannelHandle;
use crate::closer::Closer;
use crate::error::TargetError;
use crate::pending::PendingCounter;

/// One shutdown stage.
///
/// Targets are shared between the coordinator and the workers of the stage,
/// so [`Target::new`] hands out an `Arc`. All registration methods take
/// `&self` and may be called from any thread before shutdown begins.
///
/// # Examples
///
/// ```rust
/// use stagedown::Target;
/// use tokio::sync::mpsc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let ingest = Target::new("ingest");
/// let (tx, mut rx) = mpsc::channel::<String>(16);
///
/// // The producer keeps its own clone and drops it when it is done; release
/// // only drops the tracked sender.
/// let producer = tx.clone();
/// ingest.track_channel(tx).unwrap();
/// tokio::spawn(async move {
///     for line in ["a", "b"] {
///         let _ = producer.send(line.to_string()).await;
///     }
/// });
///
/// let guard = ingest.enter();
/// tokio::spawn(async move {
///     let _guard = guard;
///     while let Some(_line) = rx.recv().await {}
/// });
/// # }
/// ```
pub struct Target {
    name: String,
    closers: Mutex<Vec<Box<dyn Closer>>>,
    channels: Mutex<Vec<Box<dyn ChannelHandle>>>,
    pending: PendingCounter,
}

/// What a single [`Target`] release did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReleaseSummary {
    /// Closers that released without error
    pub closers_closed: usize,
    /// Closers whose release returned an error (logged, not propagated)
    pub closers_failed: usize,
    /// Channel senders dropped
    pub channels_closed: usize,
}

impl Target {
    /// Creates an empty target.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            closers: Mutex::new(Vec::new()),
            channels: Mutex::new(Vec::new()),
            pending: PendingCounter::new(),
        })
    }

    /// Name used in shutdown logs and reports.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tracks a closer to be released when this target is killed.
    pub fn track_closer<C>(&self, closer: C)
    where
        C: Closer + 'static,
    {
        lock(&self.closers).push(Box::new(closer));
    }

    /// Tracks the sending half of a channel to be closed when this target is
    /// killed.
    ///
    /// # Errors
    ///
    /// Returns [`TargetError::NotAChannel`] for an mpsc sender whose receiver
    /// is already dropped. The channel list is left untouched in that case.
    /// Broadcast and watch senders are accepted without receivers, since
    /// workers may subscribe after registration.
    pub fn track_channel<C>(&self, channel: C) -> Result<(), TargetError>
    where
        C: ChannelHandle,
    {
        if channel.is_closed() {
            return Err(TargetError::NotAChannel {
                target: self.name.clone(),
                kind: channel.kind(),
            });
        }
        lock(&self.channels).push(Box::new(channel));
        Ok(())
    }

    /// Marks `workers` more workers as in flight.
    pub fn begin(&self, workers: usize) {
        self.pending.add(workers);
    }

    /// Marks one worker as finished.
    ///
    /// Every [`begin`](Self::begin) must be paired with one call per worker
    /// on every exit path. Completing more workers than were begun is
    /// logged and ignored.
    pub fn complete(&self) {
        if !self.pending.done() {
            warn!(stage = %self.name, "complete() called with no pending workers");
        }
    }

    /// Marks one worker as in flight and returns a guard that completes it
    /// when dropped, including when the worker unwinds.
    pub fn enter(self: &Arc<Self>) -> WorkerGuard {
        self.begin(1);
        WorkerGuard {
            target: Arc::clone(self),
        }
    }

    /// Waits until no worker of this target is in flight.
    pub async fn await_drain(&self) {
        self.pending.wait_zero().await;
    }

    /// Number of workers currently in flight.
    pub fn pending(&self) -> usize {
        self.pending.get()
    }

    /// Number of closers still waiting to be released.
    pub fn closer_count(&self) -> usize {
        lock(&self.closers).len()
    }

    /// Number of channel senders still waiting to be closed.
    pub fn channel_count(&self) -> usize {
        lock(&self.channels).len()
    }

    /// Closes every tracked closer, then every tracked channel, each in
    /// registration order. Resources are taken out of the target, so a
    /// second release has nothing left to close.
    pub(crate) fn release(&self) -> ReleaseSummary {
        let closers = std::mem::take(&mut *lock(&self.closers));
        let channels = std::mem::take(&mut *lock(&self.channels));
        let mut summary = ReleaseSummary::default();

        info!("🎯 Killing target {}", self.name);

        for mut closer in closers {
            let kind = closer.kind();
            match closer.close() {
                Ok(()) => {
                    debug!(stage = %self.name, kind, "closer released");
                    summary.closers_closed += 1;
                }
                Err(e) => {
                    warn!(stage = %self.name, kind, "closer failed to release: {e:#}");
                    summary.closers_failed += 1;
                }
            }
        }

        info!("Closing {} channels for target {}", channels.len(), self.name);
        for channel in channels {
            debug!(stage = %self.name, kind = channel.kind(), "channel closed");
            channel.close();
            summary.channels_closed += 1;
        }

        summary
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("name", &self.name)
            .field("closers", &self.closer_count())
            .field("channels", &self.channel_count())
            .field("pending", &self.pending())
            .finish()
    }
}

/// Completes one worker of a [`Target`] when dropped.
#[must_use = "dropping the guard immediately completes the worker"]
pub struct WorkerGuard {
    target: Arc<Target>,
}

impl WorkerGuard {
    /// The target this worker belongs to.
    pub fn target(&self) -> &Arc<Target> {
        &self.target
    }
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.target.complete();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
