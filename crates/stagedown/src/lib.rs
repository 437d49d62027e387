//! # Stagedown - Staged Graceful Shutdown
//!
//! Intercepts SIGINT/SIGTERM and shuts a process down stage by stage. Each
//! stage is a [`Target`]: a named group of closable resources and channels
//! plus a counter of the workers that belong to it. The [`Coordinator`]
//! releases targets strictly in the order they were registered and waits for
//! each one's workers to finish before touching the next.
//!
//! ## Shutdown Sequence
//!
//! 1. Wait for exactly one termination signal
//! 2. Arm the force-kill watchdog
//! 3. For every target, in registration order:
//!    close its closers, close its channels, wait for its workers
//! 4. Disarm the watchdog and return control to the caller
//!
//! If step 3 does not finish within the force-kill window the exit hook
//! terminates the process with a non-zero status.
//!
//! ## Quick Start
//!
//! Releasing a target drops the channel senders it tracks, nothing more. A
//! channel only closes once no other strong sender is alive, so producers
//! write through a [`WeakSender`](tokio::sync::mpsc::WeakSender) and the
//! tracked sender is the one that keeps the channel open.
//!
//! ```rust,no_run
//! use stagedown::{Coordinator, Target};
//! use tokio::sync::mpsc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut coordinator = Coordinator::new()?;
//!
//! let reader = Target::new("reader");
//! let (lines_tx, mut lines_rx) = mpsc::channel::<String>(128);
//! let producer = lines_tx.downgrade();
//! reader.track_channel(lines_tx)?;
//!
//! tokio::spawn(async move {
//!     while let Some(tx) = producer.upgrade() {
//!         if tx.send("tick".to_string()).await.is_err() {
//!             break;
//!         }
//!     }
//! });
//!
//! let guard = reader.enter();
//! tokio::spawn(async move {
//!     let _guard = guard;
//!     while let Some(line) = lines_rx.recv().await {
//!         println!("{line}");
//!     }
//! });
//!
//! coordinator.register_target(reader);
//! coordinator.wait_and_shutdown().await;
//! # Ok(())
//! # }
//! ```

mod channel;
mod closer;
mod coordinator;
mod error;
mod exit;
mod pending;
mod settings;
mod signals;
mod target;
mod watchdog;

pub use channel::ChannelHandle;
pub use closer::{Closer, DropCloser, FnCloser};
pub use coordinator::{Coordinator, ShutdownOutcome, ShutdownPhase, ShutdownReport, TargetReport};
pub use error::{ShutdownError, TargetError};
pub use exit::{ExitHook, ProcessExit};
pub use settings::ShutdownSettings;
pub use signals::{ShutdownSignal, ShutdownTrigger};
pub use target::{ReleaseSummary, Target, WorkerGuard};
