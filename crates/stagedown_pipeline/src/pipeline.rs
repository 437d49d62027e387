//! Pipeline wiring.
//!
//! Builds one shutdown target per configured stage. The source stage stops
//! when its cancellation token is released. Every later stage is fed by a
//! channel whose only strong sender is tracked by that stage's target, while
//! the upstream worker writes through a weak sender. Releasing the stages in
//! order therefore stops the source first and lets each later stage finish
//! its buffered input before its own channel is closed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use stagedown::{Coordinator, Target, TargetError, WorkerGuard};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PipelineSettings;

/// A unit of work flowing through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub seq: u64,
    /// Number of processing stages the item went through
    pub hops: u32,
}

/// Counters shared by all stages.
#[derive(Debug, Default)]
pub struct PipelineStats {
    produced: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl PipelineStats {
    pub fn produced(&self) -> u64 {
        self.produced.load(Ordering::Relaxed)
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Spawns every stage and registers its target with the coordinator, upstream
/// first.
pub fn build(
    settings: &PipelineSettings,
    coordinator: &mut Coordinator,
) -> Result<Arc<PipelineStats>, TargetError> {
    let stats = Arc::new(PipelineStats::default());
    let targets: Vec<Arc<Target>> = settings
        .stages
        .iter()
        .map(|name| Target::new(name.as_str()))
        .collect();

    // channels[k - 1] feeds stage k
    let mut senders = Vec::with_capacity(targets.len().saturating_sub(1));
    let mut receivers = Vec::with_capacity(targets.len().saturating_sub(1));
    for _ in 1..targets.len() {
        let (tx, rx) = mpsc::channel::<Item>(settings.channel_capacity);
        senders.push(tx);
        receivers.push(rx);
    }
    let weak_senders: Vec<_> = senders.iter().map(mpsc::Sender::downgrade).collect();

    if let Some(source) = targets.first() {
        let token = CancellationToken::new();
        source.track_closer(token.clone());
        let interval = Duration::from_millis(settings.producer_interval_ms.max(1));
        tokio::spawn(run_source(
            source.enter(),
            token,
            weak_senders.first().cloned(),
            interval,
            stats.clone(),
        ));
    }

    let mut receivers = receivers.into_iter();
    for (index, (target, tx)) in targets.iter().skip(1).zip(senders).enumerate() {
        target.track_channel(tx)?;
        let Some(rx) = receivers.next() else { break };
        // Stage index + 1 writes into the channel of stage index + 2
        let downstream = weak_senders.get(index + 1).cloned();
        tokio::spawn(run_stage(target.enter(), rx, downstream, stats.clone()));
    }

    for target in targets {
        coordinator.register_target(target);
    }

    Ok(stats)
}

async fn run_source(
    guard: WorkerGuard,
    token: CancellationToken,
    output: Option<mpsc::WeakSender<Item>>,
    interval: Duration,
    stats: Arc<PipelineStats>,
) {
    let name = guard.target().name().to_string();
    let mut ticker = tokio::time::interval(interval);
    let mut seq = 0u64;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let Some(tx) = output.as_ref().and_then(mpsc::WeakSender::upgrade) else {
                    break;
                };
                if tx.send(Item { seq, hops: 0 }).await.is_err() {
                    warn!("Stage {} lost its downstream channel", name);
                    break;
                }
                stats.produced.fetch_add(1, Ordering::Relaxed);
                seq += 1;
            }
        }
    }

    info!("Stage {} stopped after producing {} items", name, seq);
}

async fn run_stage(
    guard: WorkerGuard,
    mut input: mpsc::Receiver<Item>,
    output: Option<mpsc::WeakSender<Item>>,
    stats: Arc<PipelineStats>,
) {
    let name = guard.target().name().to_string();
    let mut handled = 0u64;

    while let Some(mut item) = input.recv().await {
        handled += 1;
        item.hops += 1;

        let Some(output) = &output else {
            debug!(stage = %name, seq = item.seq, hops = item.hops, "item delivered");
            stats.delivered.fetch_add(1, Ordering::Relaxed);
            continue;
        };

        let sent = match output.upgrade() {
            Some(tx) => tx.send(item).await.is_ok(),
            None => false,
        };
        if !sent {
            warn!(stage = %name, "downstream closed, dropping item");
            stats.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    info!("Stage {} drained after handling {} items", name, handled);
}
