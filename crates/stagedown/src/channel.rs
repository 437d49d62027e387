//! Channel handles tracked by a target.
//!
//! Channels of different element types live in one ordered list through the
//! [`ChannelHandle`] capability. Only the sending half is tracked: releasing
//! it drops the sender, and once no other sender is alive the receiving
//! worker sees the channel close and leaves its receive loop.
//!
//! Producers that must keep sending until shutdown should hold a
//! [`WeakSender`](tokio::sync::mpsc::WeakSender) (or drop their clones when
//! they finish) so that the tracked sender is the one that keeps the channel
//! open.

use tokio::sync::{broadcast, mpsc, watch};

/// The sending half of a channel that shutdown can close.
pub trait ChannelHandle: Send + 'static {
    /// Short label used in shutdown logs and registration errors.
    fn kind(&self) -> &'static str;

    /// Whether the channel can never deliver again.
    ///
    /// Only an mpsc channel reaches this state while a sender is alive: its
    /// single receiver cannot come back once dropped. Broadcast and watch
    /// senders gain receivers later through `subscribe`, so they are never
    /// reported closed here.
    fn is_closed(&self) -> bool;

    /// Closes this handle's side of the channel.
    fn close(self: Box<Self>);
}

impl<T: Send + 'static> ChannelHandle for mpsc::Sender<T> {
    fn kind(&self) -> &'static str {
        "mpsc"
    }

    fn is_closed(&self) -> bool {
        mpsc::Sender::is_closed(self)
    }

    fn close(self: Box<Self>) {
        drop(self);
    }
}

impl<T: Send + 'static> ChannelHandle for mpsc::UnboundedSender<T> {
    fn kind(&self) -> &'static str {
        "mpsc-unbounded"
    }

    fn is_closed(&self) -> bool {
        mpsc::UnboundedSender::is_closed(self)
    }

    fn close(self: Box<Self>) {
        drop(self);
    }
}

impl<T: Send + 'static> ChannelHandle for broadcast::Sender<T> {
    fn kind(&self) -> &'static str {
        "broadcast"
    }

    fn is_closed(&self) -> bool {
        false
    }

    fn close(self: Box<Self>) {
        drop(self);
    }
}

impl<T: Send + Sync + 'static> ChannelHandle for watch::Sender<T> {
    fn kind(&self) -> &'static str {
        "watch"
    }

    fn is_closed(&self) -> bool {
        false
    }

    fn close(self: Box<Self>) {
        drop(self);
    }
}
