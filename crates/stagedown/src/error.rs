//! Error types for the shutdown coordinator.
//!
//! Only registration and construction can fail. Everything that goes wrong
//! during the kill sequence is either logged and absorbed (closer failures)
//! or escalated to a forced process exit (a target that never drains).

/// Errors raised while registering resources on a [`Target`](crate::Target).
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    /// The handle does not refer to a live channel.
    ///
    /// Values that are not channels at all are rejected at compile time by
    /// the [`ChannelHandle`](crate::ChannelHandle) bound. At runtime this
    /// only fires for an mpsc sender whose receiver is already gone; broadcast
    /// and watch senders are always accepted.
    #[error("target '{target}': {kind} is not an open channel")]
    NotAChannel {
        target: String,
        kind: &'static str,
    },
}

/// Errors raised while building a [`Coordinator`](crate::Coordinator).
#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    /// Subscribing to the process termination signals failed
    #[error("Signal registration failed: {0}")]
    SignalRegistration(#[from] std::io::Error),

    /// Shutdown settings failed validation
    #[error("Invalid shutdown settings: {0}")]
    InvalidSettings(String),
}
