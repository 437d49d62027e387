//! Counting barrier for in-flight workers.

use tokio::sync::watch;

/// Counter of in-flight workers with an async wait for zero.
///
/// Backed by a `watch` channel so that every waiter observes the transition
/// to zero, no matter how many increments and decrements race with it.
#[derive(Debug)]
pub(crate) struct PendingCounter {
    count: watch::Sender<usize>,
}

impl PendingCounter {
    pub(crate) fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self { count }
    }

    pub(crate) fn add(&self, delta: usize) {
        self.count.send_modify(|count| *count += delta);
    }

    /// Decrements the counter. Returns `false` if it was already zero.
    pub(crate) fn done(&self) -> bool {
        self.count.send_if_modified(|count| {
            if *count == 0 {
                false
            } else {
                *count -= 1;
                true
            }
        })
    }

    pub(crate) fn get(&self) -> usize {
        *self.count.borrow()
    }

    pub(crate) async fn wait_zero(&self) {
        let mut rx = self.count.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|count| *count == 0).await;
    }
}
