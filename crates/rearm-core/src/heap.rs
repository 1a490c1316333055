//! DeadlineHeap - lock-guarded binary min-heap keyed by deadline
//!
//! # Layout
//!
//! Storage is a 1-indexed array (slot 0 is never used), so a node at
//! `i` has its parent at `i >> 1` and children at `2i` / `2i + 1`.
//! Live entries always occupy `1..=size` with no gaps; every slot past
//! `size` is empty. Capacity is the array length and is independent of
//! `size`.
//!
//! # Growth
//!
//! Growing drops the main lock while the new array is allocated, so a
//! slow allocation never stalls other threads queued on the heap:
//!
//! ```text
//!   insert ── size >= cap-1 ──► unlock ──► try advisory flag
//!                                               │
//!                         won ◄─────────────────┴──────────► lost
//!                          │                                  │
//!               generation unchanged?                    yield once
//!               allocate new array                            │
//!                          └──────────► relock ◄──────────────┘
//!                                          │
//!                         install + copy if generation unchanged
//! ```
//!
//! The winner keeps the flag until the copy is installed, so one
//! growth episode allocates exactly once. Copying happens under the
//! main lock, so entries are never lost or duplicated.
//!
//! Identity uniqueness is not a heap concern: two entries with the same
//! identity key may coexist.

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Instant;

use parking_lot::{Mutex, MutexGuard};
use tracing::trace;

use crate::advisory::{AdvisoryFlag, AdvisoryGuard};
use crate::binding::TaskBinding;
use crate::descriptor::{CallbackDescriptor, HeadTask};
use crate::error::{SchedError, SchedResult};

/// Capacity used by `DeadlineHeap::default()`
pub const DEFAULT_INITIAL_CAPACITY: usize = 11;

/// Largest array the heap will ever allocate
pub const MAX_CAPACITY: usize = i32::MAX as usize - 8;

/// Index of the head
pub const ROOT: usize = 1;

type Slot = Option<CallbackDescriptor>;

/// State protected by the main lock
struct HeapInner {
    queue: Vec<Slot>,
    size: usize,
    /// Bumped every time `queue` is replaced by a grown array
    generation: u64,
}

impl HeapInner {
    #[inline]
    fn capacity(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    fn node(&self, i: usize) -> &CallbackDescriptor {
        match self.queue[i] {
            Some(ref node) => node,
            None => unreachable!("empty slot {} inside live range 1..={}", i, self.size),
        }
    }

    #[inline]
    fn deadline(&self, i: usize) -> Instant {
        self.node(i).deadline()
    }

    /// Move node at `p` toward the root while its parent is strictly later
    fn sift_up(&mut self, mut p: usize) {
        while p > ROOT {
            let parent = p >> 1;
            if self.deadline(parent) > self.deadline(p) {
                self.queue.swap(parent, p);
                p = parent;
            } else {
                break;
            }
        }
    }

    /// Move node at `p` toward the leaves while a child is strictly earlier
    fn sift_down(&mut self, mut p: usize) {
        while p << 1 <= self.size {
            let mut child = p << 1;
            let right = child + 1;
            if right <= self.size && self.deadline(right) < self.deadline(child) {
                child = right;
            }
            if self.deadline(child) < self.deadline(p) {
                self.queue.swap(p, child);
                p = child;
            } else {
                break;
            }
        }
    }

    /// Remove the node at `index`, filling the hole with the last node
    fn take_at(&mut self, index: usize) -> Slot {
        let last = self.size;
        if index == 0 || index > last {
            return None;
        }

        self.queue.swap(index, last);
        let removed = self.queue[last].take();
        self.size = last - 1;

        if index <= self.size {
            // The moved leaf may belong above or below the hole
            self.sift_down(index);
            self.sift_up(index);
        }
        removed
    }

    fn position_of(&self, target: &TaskBinding) -> Option<usize> {
        (ROOT..=self.size).find(|&i| self.node(i).binding().same_identity(target))
    }
}

/// Concurrent deadline-ordered heap of callback descriptors
pub struct DeadlineHeap {
    inner: Mutex<HeapInner>,
    /// Only the owner of this flag allocates grown storage
    allocation: AdvisoryFlag,
    /// Mirror of `HeapInner::generation`, readable without the main lock
    generation: AtomicU64,
    max_capacity: usize,
    #[cfg(test)]
    allocations: std::sync::atomic::AtomicUsize,
}

impl DeadlineHeap {
    /// Create a heap with room for `initial_capacity - 1` entries
    pub fn new(initial_capacity: usize) -> SchedResult<Self> {
        Self::with_max_capacity(initial_capacity, MAX_CAPACITY)
    }

    /// Create a heap whose storage may never exceed `max_capacity` slots
    pub fn with_max_capacity(initial_capacity: usize, max_capacity: usize) -> SchedResult<Self> {
        if initial_capacity < 1 {
            return Err(SchedError::InvalidArgument("initial capacity must be at least 1"));
        }
        if initial_capacity > max_capacity {
            return Err(SchedError::InvalidArgument(
                "initial capacity exceeds maximum capacity",
            ));
        }

        Ok(Self::build(initial_capacity, max_capacity))
    }

    fn build(initial_capacity: usize, max_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(HeapInner {
                queue: empty_slots(initial_capacity),
                size: 0,
                generation: 0,
            }),
            allocation: AdvisoryFlag::new(),
            generation: AtomicU64::new(0),
            max_capacity,
            #[cfg(test)]
            allocations: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Insert a descriptor, growing storage as needed
    ///
    /// Fails only with `CapacityExhausted`.
    pub fn insert(&self, descriptor: CallbackDescriptor) -> SchedResult<()> {
        let mut inner = self.inner.lock();
        while inner.size >= inner.capacity() - 1 {
            self.try_grow(&mut inner)?;
        }

        let n = inner.size + 1;
        inner.queue[n] = Some(descriptor);
        inner.size = n;
        inner.sift_up(n);
        Ok(())
    }

    /// Remove the head; false if the heap was empty
    pub fn remove_head(&self) -> bool {
        self.pop_head().is_some()
    }

    /// Remove and return the head
    pub fn pop_head(&self) -> Option<CallbackDescriptor> {
        self.inner.lock().take_at(ROOT)
    }

    /// Remove the first entry whose identity key matches `target`
    ///
    /// Returns the index the entry occupied before removal, so callers
    /// can tell whether they just removed the head (index 1).
    pub fn remove_by_identity(&self, target: &TaskBinding) -> Option<usize> {
        let mut inner = self.inner.lock();
        let index = inner.position_of(target)?;
        inner.take_at(index);
        Some(index)
    }

    /// Compare `t` against the head deadline
    pub fn compare_first_time(&self, t: Instant) -> SchedResult<CmpOrdering> {
        let inner = self.inner.lock();
        if inner.size == 0 {
            return Err(SchedError::EmptyHeap);
        }
        Ok(t.cmp(&inner.deadline(ROOT)))
    }

    /// Snapshot the head with its delay computed from the current time
    pub fn peek_head(&self) -> SchedResult<HeadTask> {
        let inner = self.inner.lock();
        if inner.size == 0 {
            return Err(SchedError::EmptyHeap);
        }
        let descriptor = inner.node(ROOT).clone();
        let delay = descriptor.delay_from(Instant::now());
        Ok(HeadTask { descriptor, delay })
    }

    /// Number of live entries
    pub fn size(&self) -> usize {
        self.inner.lock().size
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Current storage length (including the unused slot 0)
    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity()
    }

    /// One growth attempt; the caller re-checks whether it was enough
    fn try_grow(&self, inner: &mut MutexGuard<'_, HeapInner>) -> SchedResult<()> {
        let old_cap = inner.capacity();
        let observed = inner.generation;

        let grown = MutexGuard::unlocked(inner, || self.allocate(old_cap, observed))?;

        if let Some((_owner, array)) = grown {
            if inner.generation == observed {
                let old = std::mem::replace(&mut inner.queue, array);
                for (slot, node) in inner.queue.iter_mut().zip(old) {
                    *slot = node;
                }
                inner.generation += 1;
                self.generation.store(inner.generation, Ordering::Release);
                trace!(old_cap, new_cap = inner.capacity(), size = inner.size, "deadline heap grown");
            }
        }
        Ok(())
    }

    /// Runs without the main lock held
    fn allocate(
        &self,
        old_cap: usize,
        observed: u64,
    ) -> SchedResult<Option<(AdvisoryGuard<'_>, Vec<Slot>)>> {
        if let Some(owner) = self.allocation.try_acquire() {
            let new_cap = grown_capacity(old_cap, self.max_capacity)?;
            if new_cap > old_cap && self.generation.load(Ordering::Acquire) == observed {
                #[cfg(test)]
                self.allocations.fetch_add(1, Ordering::Relaxed);
                return Ok(Some((owner, empty_slots(new_cap))));
            }
        }
        thread::yield_now();
        Ok(None)
    }
}

impl Default for DeadlineHeap {
    fn default() -> Self {
        Self::build(DEFAULT_INITIAL_CAPACITY, MAX_CAPACITY)
    }
}

impl std::fmt::Debug for DeadlineHeap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("DeadlineHeap")
            .field("size", &inner.size)
            .field("capacity", &inner.capacity())
            .field("generation", &inner.generation)
            .finish()
    }
}

fn empty_slots(len: usize) -> Vec<Slot> {
    let mut slots = Vec::with_capacity(len);
    slots.resize_with(len, || None);
    slots
}

/// Small heaps double (plus two), large ones grow by half, clamped to `max`
fn grown_capacity(old_cap: usize, max: usize) -> SchedResult<usize> {
    let grow_by = if old_cap < 64 { old_cap + 2 } else { old_cap >> 1 };
    let new_cap = old_cap.saturating_add(grow_by);
    if new_cap <= max {
        return Ok(new_cap);
    }
    let min_cap = old_cap + 1;
    if min_cap > max {
        return Err(SchedError::CapacityExhausted {
            requested: min_cap,
            max,
        });
    }
    Ok(max)
}
