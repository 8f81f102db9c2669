use crate::task::Id;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Instant;

/// Token identifying one registration in the [`SleepQueue`], handed back to
/// the sleeping future so it can deregister on cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SleepKey {
    seq: u64,
}

/// One timed parking spot: wake `id` once `deadline` has passed. `seq` is the
/// registration order and breaks deadline ties, so tasks that sleep until the
/// same instant wake in the order they went to sleep.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Entry {
    deadline: Instant,
    seq: u64,
    id: Id,
}

/// Min-heap of sleeping tasks, ordered by (deadline, registration order).
///
/// Cancellation is lazy: a cancelled registration is dropped from the
/// `pending` table immediately, while its heap entry is discarded whenever it
/// reaches the top. This keeps removal O(1) at the cost of dead entries
/// riding along in the heap.
#[derive(Debug, Default)]
pub(crate) struct SleepQueue {
    heap: BinaryHeap<Reverse<Entry>>,

    /// Live registrations, seq → sleeping task. The source of truth for
    /// "are there sleepers"; heap entries missing from here are dead.
    pending: HashMap<u64, Id>,

    next_seq: u64,
}

impl SleepQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, deadline: Instant, id: Id) -> SleepKey {
        let seq = self.next_seq;
        self.next_seq += 1;

        self.pending.insert(seq, id);
        self.heap.push(Reverse(Entry { deadline, seq, id }));
        SleepKey { seq }
    }

    /// Deregisters a sleep. Returns the owning task if the registration had
    /// not fired yet, `None` if it already woke (or was already cancelled).
    pub(crate) fn cancel(&mut self, key: SleepKey) -> Option<Id> {
        self.pending.remove(&key.seq)
    }

    /// Pops the earliest registration whose deadline has passed, skipping
    /// cancelled entries along the way.
    pub(crate) fn pop_expired(&mut self, now: Instant) -> Option<Id> {
        loop {
            let head = &self.heap.peek()?.0;

            if !self.pending.contains_key(&head.seq) {
                self.heap.pop();
                continue;
            }

            if head.deadline > now {
                return None;
            }

            let entry = self.heap.pop().expect("peeked entry vanished").0;
            self.pending.remove(&entry.seq);
            return Some(entry.id);
        }
    }

    /// Deadline of the earliest live registration.
    pub(crate) fn next_deadline(&mut self) -> Option<Instant> {
        loop {
            let head = &self.heap.peek()?.0;

            if !self.pending.contains_key(&head.seq) {
                self.heap.pop();
                continue;
            }

            return Some(head.deadline);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}
