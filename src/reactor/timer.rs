//! Timer min-heap backing [`super::IoService::schedule_after`].
//!
//! `BinaryHeap` has no remove-by-key, so a cancelled timer's entry is left
//! in the heap rather than excised: [`TimerState::fire`] (called directly
//! by the cancellation callback, independent of this heap) resolves the
//! shared state immediately, and [`TimerHeap::pop_elapsed`] simply skips
//! any entry whose state has already resolved once it would otherwise be
//! popped — the same lazy-deletion shape `ringbahn`'s own submission-queue
//! bookkeeping uses for cancelled operations it can no longer reach
//! directly.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Instant;

use super::TimerState;

#[derive(Clone, Copy, PartialEq, Eq)]
pub(super) struct TimerId(u64);

struct Entry {
    deadline: Instant,
    id: TimerId,
    state: Arc<TimerState>,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.id == other.id
    }
}
impl Eq for Entry {}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // `BinaryHeap` is a max-heap; reverse so the earliest deadline sorts
        // to the top.
        other.deadline.cmp(&self.deadline)
    }
}
impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

pub(super) struct TimerHeap {
    heap: BinaryHeap<Entry>,
    next_id: u64,
}

impl TimerHeap {
    pub(super) fn new() -> TimerHeap {
        TimerHeap { heap: BinaryHeap::new(), next_id: 0 }
    }

    pub(super) fn insert(&mut self, deadline: Instant, state: Arc<TimerState>) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.heap.push(Entry { deadline, id, state });
        id
    }

    /// Pop and return every entry whose deadline has passed, skipping ones
    /// whose `TimerState` already resolved (e.g. cancelled before this
    /// entry was reached).
    pub(super) fn pop_elapsed(&mut self, now: Instant) -> Vec<Arc<TimerState>> {
        let mut fired = Vec::new();
        while let Some(top) = self.heap.peek() {
            if top.deadline > now {
                break;
            }
            let entry = self.heap.pop().unwrap();
            if !entry.state.done.load(std::sync::atomic::Ordering::Acquire) {
                fired.push(entry.state);
            }
        }
        fired
    }

    pub(super) fn earliest_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|e| e.deadline)
    }
}
