//! Dirty tracking for pending recaptures.

use std::collections::HashSet;

use crate::core::CaptureTarget;

/// Capture targets that need a recapture on the next update.
///
/// Backed by a `HashSet`, so a burst of scene events touching the same
/// target results in a single capture.
#[derive(Clone, Debug, Default)]
pub struct DirtyTracker {
    dirty: HashSet<CaptureTarget>,
}

impl DirtyTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the target was not already dirty.
    pub fn mark_dirty(&mut self, target: CaptureTarget) -> bool {
        self.dirty.insert(target)
    }

    /// Drop a pending recapture. Returns true if the target was dirty.
    pub fn unmark(&mut self, target: CaptureTarget) -> bool {
        self.dirty.remove(&target)
    }

    /// Check whether a target awaits recapture.
    pub fn is_dirty(&self, target: CaptureTarget) -> bool {
        self.dirty.contains(&target)
    }

    /// Takes every dirty target in a stable order (filters before rooms,
    /// rooms by id).
    pub fn take_dirty(&mut self) -> Vec<CaptureTarget> {
        let mut targets: Vec<_> = self.dirty.drain().collect();
        targets.sort_by_key(|target| match *target {
            CaptureTarget::Filter(filter) => (0, filter as u64),
            CaptureTarget::Room(id) => (1, id.0),
        });
        targets
    }

    /// Check whether any target awaits recapture.
    pub fn has_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Number of targets awaiting recapture.
    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RoomFilter;
    use crate::scene::RoomId;

    #[test]
    fn new_tracker_is_empty() {
        let tracker = DirtyTracker::new();
        assert!(!tracker.has_dirty());
        assert_eq!(tracker.dirty_count(), 0);
    }

    #[test]
    fn deduplicates_targets() {
        let mut tracker = DirtyTracker::new();
        let target = CaptureTarget::Room(RoomId(3));
        assert!(tracker.mark_dirty(target));
        for _ in 0..10 {
            assert!(!tracker.mark_dirty(target));
        }
        assert_eq!(tracker.dirty_count(), 1);
        assert!(tracker.is_dirty(target));
    }

    #[test]
    fn take_dirty_clears_in_stable_order() {
        let mut tracker = DirtyTracker::new();
        tracker.mark_dirty(CaptureTarget::Room(RoomId(9)));
        tracker.mark_dirty(CaptureTarget::Room(RoomId(2)));
        tracker.mark_dirty(CaptureTarget::Filter(RoomFilter::AllRooms));

        assert_eq!(
            tracker.take_dirty(),
            vec![
                CaptureTarget::Filter(RoomFilter::AllRooms),
                CaptureTarget::Room(RoomId(2)),
                CaptureTarget::Room(RoomId(9)),
            ]
        );
        assert!(!tracker.has_dirty());
    }

    #[test]
    fn unmark_removes_target() {
        let mut tracker = DirtyTracker::new();
        let target = CaptureTarget::Filter(RoomFilter::CurrentRoom);
        tracker.mark_dirty(target);
        assert!(tracker.unmark(target));
        assert!(!tracker.unmark(target));
        assert!(!tracker.has_dirty());
    }
}
