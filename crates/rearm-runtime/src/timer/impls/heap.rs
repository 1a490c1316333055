//! BinaryHeap-based timer backend
//!
//! # Complexity
//!
//! - Insert: O(log n)
//! - Cancel: O(1) (lazy cancellation)
//! - Poll expired: O(k log n) where k = number of expired timers
//! - Next deadline: O(1)
//! - len / drain: O(n)
//!
//! # Cancellation Strategy
//!
//! Cancelled handles go into a HashSet and the entries are skipped when
//! they reach the top of the heap. An entry whose job already left the
//! `Scheduled` state is skipped the same way, so the set is only a fast
//! path. The set is cleared whenever the heap runs empty.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::time::Instant;

use parking_lot::Mutex;

use crate::timer::{TimerBackend, TimerEntry, TimerHandle};

/// Wrapper for heap ordering (min-heap by deadline)
struct HeapEntry(TimerEntry);

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.0.deadline == other.0.deadline && self.0.handle == other.0.handle
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap; ties go to the older handle
        match other.0.deadline.cmp(&self.0.deadline) {
            Ordering::Equal => other.0.handle.0.cmp(&self.0.handle.0),
            ord => ord,
        }
    }
}

struct HeapInner {
    heap: BinaryHeap<HeapEntry>,
    cancelled: HashSet<TimerHandle>,
    total_inserted: u64,
    total_fired: u64,
    total_cancelled: u64,
}

impl HeapInner {
    fn new(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity),
            cancelled: HashSet::with_capacity(capacity / 4),
            total_inserted: 0,
            total_fired: 0,
            total_cancelled: 0,
        }
    }

    #[inline]
    fn is_live(&self, entry: &TimerEntry) -> bool {
        !self.cancelled.contains(&entry.handle) && entry.job.is_pending()
    }

    fn live_count(&self) -> usize {
        self.heap.iter().filter(|e| self.is_live(&e.0)).count()
    }
}

/// BinaryHeap-based timer backend
///
/// Thread-safe via an internal mutex held only for the heap operation.
pub struct HeapTimerBackend {
    inner: Mutex<HeapInner>,
}

impl HeapTimerBackend {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(HeapInner::new(capacity)),
        }
    }

    /// Get statistics snapshot
    pub fn stats(&self) -> HeapTimerStats {
        let inner = self.inner.lock();
        HeapTimerStats {
            active: inner.live_count(),
            pending_cancellations: inner.cancelled.len(),
            total_inserted: inner.total_inserted,
            total_fired: inner.total_fired,
            total_cancelled: inner.total_cancelled,
        }
    }
}

impl Default for HeapTimerBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerBackend for HeapTimerBackend {
    fn insert(&self, entry: TimerEntry) -> bool {
        let mut inner = self.inner.lock();
        let earliest = inner
            .heap
            .peek()
            .map_or(true, |top| entry.deadline < top.0.deadline);
        inner.heap.push(HeapEntry(entry));
        inner.total_inserted += 1;
        earliest
    }

    fn cancel(&self, handle: TimerHandle) -> bool {
        let mut inner = self.inner.lock();
        let inserted = inner.cancelled.insert(handle);
        if inserted {
            inner.total_cancelled += 1;
        }
        inserted
    }

    fn poll_expired(&self, now: Instant) -> Vec<TimerEntry> {
        let mut inner = self.inner.lock();
        let mut expired = Vec::new();

        while inner.heap.peek().is_some_and(|top| top.0.deadline <= now) {
            let Some(HeapEntry(entry)) = inner.heap.pop() else {
                break;
            };
            if inner.cancelled.remove(&entry.handle) || !entry.job.is_pending() {
                continue;
            }
            inner.total_fired += 1;
            expired.push(entry);
        }

        if inner.heap.is_empty() {
            inner.cancelled.clear();
        }

        expired
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.inner.lock().heap.peek().map(|e| e.0.deadline)
    }

    fn len(&self) -> usize {
        self.inner.lock().live_count()
    }

    fn is_empty(&self) -> bool {
        let inner = self.inner.lock();
        !inner.heap.iter().any(|e| inner.is_live(&e.0))
    }

    fn drain(&self) -> Vec<TimerEntry> {
        let mut inner = self.inner.lock();
        let heap = std::mem::take(&mut inner.heap);
        let mut live: Vec<TimerEntry> = heap
            .into_iter()
            .map(|e| e.0)
            .filter(|e| inner.is_live(e))
            .collect();
        inner.cancelled.clear();
        live.sort_by_key(|e| (e.deadline, e.handle.0));
        live
    }

    fn name(&self) -> &'static str {
        "binary_heap"
    }
}

/// Statistics for HeapTimerBackend
#[derive(Debug, Clone)]
pub struct HeapTimerStats {
    /// Live (non-cancelled) timers
    pub active: usize,
    /// Cancelled handles not yet purged
    pub pending_cancellations: usize,
    pub total_inserted: u64,
    pub total_fired: u64,
    pub total_cancelled: u64,
}
