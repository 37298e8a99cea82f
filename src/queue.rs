//! C2 — Bounded Queue.
//!
//! A FIFO (or priority) queue with a fixed capacity and a configurable
//! overflow policy. `spark-core` does not have a direct analogue — the
//! teacher's backpressure story lives in `buffer::pool` (a leasing pool,
//! not a queue) — so this module's shape follows spec §4.2 directly, kept
//! in the teacher's idiom: small, `Copy`-friendly enums, explicit
//! `KernelResult`-free outcome types rather than booleans, and methods that
//! read as a contract (`enqueue`, `dequeue`, `peek`, `len`, `status`).

use std::collections::VecDeque;

/// What happens to an incoming item when a bounded queue is at capacity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Evict the oldest item, then append the new one.
    DropOldest,
    /// Refuse the new item; the queue is left unchanged.
    DropNewest,
    /// Fail the enqueue with [`crate::error::KernelError::QueueFull`].
    Reject,
}

use serde::{Deserialize, Serialize};

use crate::error::{KernelError, KernelResult};

/// Outcome of a single [`BoundedQueue::enqueue`] call.
#[derive(Debug, PartialEq, Eq)]
pub enum EnqueueOutcome<T> {
    /// Accepted without dropping anything.
    Accepted,
    /// Accepted by evicting `dropped` to make room (`drop-oldest`).
    AcceptedWithDrop { dropped: T },
    /// Refused; the queue was left unchanged (`drop-newest`). Carries the
    /// item that was declined, since `enqueue` otherwise consumes it.
    Refused { refused: T },
}

/// A FIFO bounded queue with overflow handling (spec §4.2).
///
/// Single-writer by contract at the facet layer ([`crate::processor`] guards
/// access behind a `parking_lot::Mutex`); this type itself performs no
/// internal locking so it can also be used as a plain in-memory buffer in
/// tests.
#[derive(Debug)]
pub struct BoundedQueue<T> {
    capacity: usize,
    policy: OverflowPolicy,
    items: VecDeque<T>,
}

/// A point-in-time view of a queue's occupancy, useful for statistics
/// facets and the scheduler's remaining-budget reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueStatus {
    pub len: usize,
    pub capacity: usize,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        assert!(capacity >= 1, "bounded queue capacity must be at least 1");
        Self {
            capacity,
            policy,
            items: VecDeque::with_capacity(capacity),
        }
    }

    /// Enqueue `item`, applying the configured overflow policy if the queue
    /// is already at capacity. Invariant (spec §8 item 6): `len <= capacity`
    /// holds both before and after this call.
    pub fn enqueue(&mut self, item: T) -> KernelResult<EnqueueOutcome<T>> {
        if self.items.len() < self.capacity {
            self.items.push_back(item);
            return Ok(EnqueueOutcome::Accepted);
        }
        match self.policy {
            OverflowPolicy::DropOldest => {
                let dropped = self
                    .items
                    .pop_front()
                    .expect("queue at capacity implies non-empty");
                self.items.push_back(item);
                Ok(EnqueueOutcome::AcceptedWithDrop { dropped })
            }
            OverflowPolicy::DropNewest => Ok(EnqueueOutcome::Refused { refused: item }),
            OverflowPolicy::Reject => Err(KernelError::QueueFull),
        }
    }

    pub fn dequeue(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    pub fn peek(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn status(&self) -> QueueStatus {
        QueueStatus {
            len: self.items.len(),
            capacity: self.capacity,
        }
    }
}

/// Priority variant of [`BoundedQueue`]: dequeues the highest-priority item
/// first, preserving FIFO order among items of equal priority (spec §4.2,
/// used by the `priority` scheduler strategy in [`crate::scheduler`]).
#[derive(Debug)]
pub struct PriorityBoundedQueue<T> {
    capacity: usize,
    policy: OverflowPolicy,
    // Kept as parallel (priority, sequence, item) tuples in a Vec rather
    // than a BinaryHeap so that `drop-oldest` can evict the true FIFO head
    // (lowest sequence number) rather than the heap's arbitrary leaf.
    items: Vec<(i64, u64, T)>,
    next_seq: u64,
}

impl<T> PriorityBoundedQueue<T> {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        assert!(capacity >= 1, "bounded queue capacity must be at least 1");
        Self {
            capacity,
            policy,
            items: Vec::with_capacity(capacity),
            next_seq: 0,
        }
    }

    pub fn enqueue(&mut self, item: T, priority: i64) -> KernelResult<EnqueueOutcome<T>> {
        if self.items.len() < self.capacity {
            let seq = self.next_seq;
            self.next_seq += 1;
            self.items.push((priority, seq, item));
            return Ok(EnqueueOutcome::Accepted);
        }
        match self.policy {
            OverflowPolicy::DropOldest => {
                let oldest_idx = self
                    .items
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, (_, seq, _))| *seq)
                    .map(|(idx, _)| idx)
                    .expect("queue at capacity implies non-empty");
                let (_, _, dropped) = self.items.remove(oldest_idx);
                let seq = self.next_seq;
                self.next_seq += 1;
                self.items.push((priority, seq, item));
                Ok(EnqueueOutcome::AcceptedWithDrop { dropped })
            }
            OverflowPolicy::DropNewest => Ok(EnqueueOutcome::Refused { refused: item }),
            OverflowPolicy::Reject => Err(KernelError::QueueFull),
        }
    }

    /// Remove and return the highest-priority item, breaking ties by
    /// earliest enqueue order (lowest sequence number).
    pub fn dequeue(&mut self) -> Option<T> {
        let idx = self
            .items
            .iter()
            .enumerate()
            .max_by_key(|(_, (priority, seq, _))| (*priority, std::cmp::Reverse(*seq)))
            .map(|(idx, _)| idx)?;
        let (_, _, item) = self.items.remove(idx);
        Some(item)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn status(&self) -> QueueStatus {
        QueueStatus {
            len: self.items.len(),
            capacity: self.capacity,
        }
    }
}
