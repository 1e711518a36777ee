//! Command Channel: a single-slot mailbox between callers and the tick.
//!
//! Any number of [`CommandSender`]s may submit; the one [`CommandReceiver`]
//! drains the slot at the start of each tick.  Submitting while a command is
//! still pending overwrites it (last write wins), with one exception: a
//! pending `Stop` is never displaced by a non-`Stop` submission.  Callers
//! that need to know whether their command ran must poll the published
//! state, nothing is queued.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use spotlink_types::{CommandId, Motion, MoveCommand};
use tracing::debug;

/// Outcome of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitReceipt {
    /// Id assigned to the submitted command.
    pub command_id: CommandId,
    /// The pending command this submission overwrote, if any.
    pub replaced: Option<CommandId>,
    /// `true` when the submission was dropped because a `Stop` is pending.
    pub held_by_stop: bool,
}

struct Slot {
    pending: Option<MoveCommand>,
    next_id: u64,
}

/// Create a connected sender/receiver pair.
pub fn command_channel() -> (CommandSender, CommandReceiver) {
    let slot = Arc::new(Mutex::new(Slot {
        pending: None,
        next_id: 1,
    }));
    (
        CommandSender {
            slot: Arc::clone(&slot),
        },
        CommandReceiver { slot },
    )
}

/// Submitting half; cheap to clone and share across threads.
#[derive(Clone)]
pub struct CommandSender {
    slot: Arc<Mutex<Slot>>,
}

impl CommandSender {
    /// Place `motion` in the slot.  Never blocks beyond the slot swap.
    pub fn submit(&self, motion: Motion, speed: Option<f32>) -> SubmitReceipt {
        let mut slot = self.slot.lock();
        // Ids are assigned under the lock so their order matches slot order.
        let command_id = CommandId(slot.next_id);
        slot.next_id += 1;

        let stop_pending = slot.pending.as_ref().is_some_and(|c| c.motion.is_stop());
        if stop_pending && !motion.is_stop() {
            debug!(command_id = %command_id, "submission held back by pending stop");
            return SubmitReceipt {
                command_id,
                replaced: None,
                held_by_stop: true,
            };
        }

        let replaced = slot
            .pending
            .replace(MoveCommand {
                id: command_id,
                motion,
                speed,
                submitted_at: Utc::now(),
            })
            .map(|old| old.id);
        if let Some(old) = replaced {
            debug!(command_id = %command_id, replaced = %old, "pending command overwritten");
        }
        SubmitReceipt {
            command_id,
            replaced,
            held_by_stop: false,
        }
    }

    /// `true` while a submission is waiting for the next tick.
    pub fn has_pending(&self) -> bool {
        self.slot.lock().pending.is_some()
    }
}

/// Draining half, owned by the simulation tick.
pub struct CommandReceiver {
    slot: Arc<Mutex<Slot>>,
}

impl CommandReceiver {
    /// Take the pending command, leaving the slot empty.
    pub fn take_pending(&mut self) -> Option<MoveCommand> {
        self.slot.lock().pending.take()
    }
}
