//! Snapshot Store: the latest published `(RobotState, CameraFrame)` pair.
//!
//! Publication is copy-on-publish: the writer builds a fresh [`Snapshot`]
//! and swaps a single `Arc` through [`ArcSwap`].  State and frame travel in
//! the same allocation, so a reader can never see a state next to a frame
//! from a different tick, and loads never wait on the writer.
//!
//! Ownership enforces the single-writer rule: [`SnapshotStore::new`] hands
//! out exactly one [`SnapshotWriter`], which is not `Clone`.

use std::sync::Arc;

use arc_swap::ArcSwap;
use spotlink_types::{CameraFrame, RobotState};

/// An immutable state/frame pair published for one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub state: RobotState,
    /// `None` when the camera produced nothing this tick.  When present,
    /// `frame.sequence == state.sequence`.
    pub frame: Option<CameraFrame>,
}

impl Snapshot {
    fn unstarted() -> Self {
        Self {
            state: RobotState::unstarted(),
            frame: None,
        }
    }
}

/// Constructor namespace for the writer/reader pair.
pub struct SnapshotStore;

impl SnapshotStore {
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (SnapshotWriter, SnapshotReader) {
        let shared = Arc::new(ArcSwap::from_pointee(Snapshot::unstarted()));
        (
            SnapshotWriter {
                shared: Arc::clone(&shared),
                sequence: 0,
            },
            SnapshotReader { shared },
        )
    }
}

/// The single publisher, owned by the simulation tick.
pub struct SnapshotWriter {
    shared: Arc<ArcSwap<Snapshot>>,
    sequence: u64,
}

impl SnapshotWriter {
    /// Atomically replace the current snapshot.
    ///
    /// The writer owns the sequence counter: whatever sequence the caller put
    /// on `state` or `frame` is overwritten with `previous + 1`.  Returns the
    /// stamped sequence.
    pub fn publish(&mut self, mut state: RobotState, frame: Option<CameraFrame>) -> u64 {
        self.sequence += 1;
        state.sequence = self.sequence;
        let frame = frame.map(|mut f| {
            f.sequence = self.sequence;
            f
        });
        self.shared.store(Arc::new(Snapshot { state, frame }));
        self.sequence
    }

    /// Sequence of the last publication, `0` before the first.
    pub fn last_sequence(&self) -> u64 {
        self.sequence
    }
}

/// Cheap, cloneable read handle.
#[derive(Clone)]
pub struct SnapshotReader {
    shared: Arc<ArcSwap<Snapshot>>,
}

impl SnapshotReader {
    /// The current snapshot.  Holding the returned `Arc` pins that tick's
    /// pair; later publications do not affect it.
    pub fn read(&self) -> Arc<Snapshot> {
        self.shared.load_full()
    }

    pub fn state(&self) -> RobotState {
        self.shared.load().state.clone()
    }

    pub fn frame(&self) -> Option<CameraFrame> {
        self.shared.load().frame.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use spotlink_types::{ExecutionStatus, ImageEncoding};

    fn frame(tag: u8) -> CameraFrame {
        CameraFrame {
            sequence: 999,
            width: 1,
            height: 1,
            encoding: ImageEncoding::Rgba8,
            data: Bytes::from(vec![tag; 4]),
        }
    }

    #[test]
    fn reads_unstarted_sentinel_before_first_publish() {
        let (_writer, reader) = SnapshotStore::new();
        let snap = reader.read();
        assert!(snap.state.is_unstarted());
        assert_eq!(snap.state.status, ExecutionStatus::Unstarted);
        assert!(snap.frame.is_none());
    }

    #[test]
    fn publish_stamps_consecutive_sequences_on_state_and_frame() {
        let (mut writer, reader) = SnapshotStore::new();
        assert_eq!(writer.publish(RobotState::unstarted(), Some(frame(1))), 1);
        assert_eq!(writer.publish(RobotState::unstarted(), None), 2);
        assert_eq!(writer.publish(RobotState::unstarted(), Some(frame(3))), 3);

        let snap = reader.read();
        assert_eq!(snap.state.sequence, 3);
        assert_eq!(snap.frame.as_ref().map(|f| f.sequence), Some(3));
        assert_eq!(writer.last_sequence(), 3);
    }

    #[test]
    fn held_snapshot_is_unaffected_by_later_publish() {
        let (mut writer, reader) = SnapshotStore::new();
        writer.publish(RobotState::unstarted(), Some(frame(1)));
        let held = reader.read();
        writer.publish(RobotState::unstarted(), Some(frame(2)));

        assert_eq!(held.state.sequence, 1);
        assert_eq!(held.frame.as_ref().map(|f| f.data[0]), Some(1));
        assert_eq!(reader.frame().map(|f| f.data[0]), Some(2));
    }

    #[test]
    fn frameless_tick_clears_previous_frame() {
        let (mut writer, reader) = SnapshotStore::new();
        writer.publish(RobotState::unstarted(), Some(frame(1)));
        writer.publish(RobotState::unstarted(), None);
        assert!(reader.frame().is_none());
        assert_eq!(reader.state().sequence, 2);
    }
}
