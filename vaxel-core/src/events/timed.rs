//! Fire-time ordered queue.
//!
//! Entries with equal fire times come out in submission order.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::Duration;

struct Slot<T> {
    fire_at: Duration,
    seq: u64,
    item: T,
}

impl<T> PartialEq for Slot<T> {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at == other.fire_at && self.seq == other.seq
    }
}

impl<T> Eq for Slot<T> {}

impl<T> PartialOrd for Slot<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Slot<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.fire_at, self.seq).cmp(&(other.fire_at, other.seq))
    }
}

pub struct TimedQueue<T> {
    heap: BinaryHeap<Reverse<Slot<T>>>,
    next_seq: u64,
}

impl<T> Default for TimedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TimedQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    pub fn push(&mut self, fire_at: Duration, item: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Slot { fire_at, seq, item }));
    }

    /// Removes the earliest entry if its fire time is at or before `now`.
    pub fn pop_due(&mut self, now: Duration) -> Option<(Duration, T)> {
        if self.next_fire()? > now {
            return None;
        }
        self.heap
            .pop()
            .map(|Reverse(slot)| (slot.fire_at, slot.item))
    }

    pub fn next_fire(&self) -> Option<Duration> {
        self.heap.peek().map(|Reverse(slot)| slot.fire_at)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
