//! Closable resources tracked by a target.
//!
//! A [`Closer`] is anything with a single release operation. The coordinator
//! calls it at most once, during the kill sequence, and only logs a failure.

use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

/// A resource that can be released during shutdown.
///
/// Implementations should make `close` safe to call once and cheap. A
/// returned error is logged by the coordinator and does not stop the release
/// of the resources registered after this one.
pub trait Closer: Send {
    /// Releases the resource.
    fn close(&mut self) -> anyhow::Result<()>;

    /// Short label used in shutdown logs.
    fn kind(&self) -> &'static str {
        "closer"
    }
}

/// Adapts a one-shot closure into a [`Closer`].
///
/// # Examples
///
/// ```rust
/// use stagedown::{FnCloser, Target};
///
/// let target = Target::new("ingest");
/// target.track_closer(FnCloser::new(|| {
///     println!("flushing ingest buffers");
///     Ok(())
/// }));
/// ```
pub struct FnCloser<F> {
    close_fn: Option<F>,
}

impl<F> FnCloser<F>
where
    F: FnOnce() -> anyhow::Result<()> + Send,
{
    pub fn new(close_fn: F) -> Self {
        Self {
            close_fn: Some(close_fn),
        }
    }
}

impl<F> Closer for FnCloser<F>
where
    F: FnOnce() -> anyhow::Result<()> + Send,
{
    fn close(&mut self) -> anyhow::Result<()> {
        match self.close_fn.take() {
            Some(close_fn) => close_fn(),
            None => Ok(()),
        }
    }

    fn kind(&self) -> &'static str {
        "fn"
    }
}

/// Owns a value and releases it by dropping it.
///
/// Fits any RAII handle whose `Drop` is its close operation: files, sockets,
/// guards, senders that are not tracked as channels.
pub struct DropCloser<T> {
    value: Option<T>,
}

impl<T: Send> DropCloser<T> {
    pub fn new(value: T) -> Self {
        Self { value: Some(value) }
    }

    /// Whether the value has not been released yet.
    pub fn is_held(&self) -> bool {
        self.value.is_some()
    }
}

impl<T: Send> Closer for DropCloser<T> {
    fn close(&mut self) -> anyhow::Result<()> {
        drop(self.value.take());
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "drop"
    }
}

impl Closer for CancellationToken {
    fn close(&mut self) -> anyhow::Result<()> {
        self.cancel();
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "cancellation-token"
    }
}

impl Closer for AbortHandle {
    fn close(&mut self) -> anyhow::Result<()> {
        self.abort();
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "abort-handle"
    }
}
