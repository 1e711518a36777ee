//! Optional status notifications.
//!
//! Polling [`Bridge::get_state`][crate::Bridge::get_state] is the baseline
//! way to learn that a command finished.  Callers that would rather await a
//! change can subscribe here: the tick loop publishes a [`StatusEvent`]
//! every time the published [`ExecutionStatus`] differs from the previous
//! tick's.  Built on [`tokio::sync::broadcast`], so a slow subscriber only
//! loses its own backlog and never blocks the tick.

use spotlink_types::ExecutionStatus;
use tokio::sync::broadcast;

/// Buffered events per subscriber before the oldest are dropped.
const DEFAULT_CAPACITY: usize = 256;

/// A status transition, tagged with the snapshot that carried it.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEvent {
    pub sequence: u64,
    pub status: ExecutionStatus,
}

/// Broadcast fan-out of [`StatusEvent`]s.  Clones share one channel.
#[derive(Clone, Debug)]
pub struct StatusBus {
    sender: broadcast::Sender<StatusEvent>,
}

impl Default for StatusBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl StatusBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Hand `event` to every current subscriber.
    ///
    /// Returns how many subscribers received it; `0` when nobody is
    /// listening, which is the normal case.
    pub fn publish(&self, event: StatusEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
