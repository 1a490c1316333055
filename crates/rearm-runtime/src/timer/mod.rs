//! Timer subsystem of the executor substrate
//!
//! Holds every pending job of a `ScheduledThreadPool` ordered by deadline.
//! A single timer thread polls the backend and hands due entries to the
//! worker queue.
//!
//! # Architecture
//!
//! ```text
//!   ScheduledThreadPool::schedule_*()
//!                 │ insert
//!                 ▼
//!     ┌───────────────────────┐
//!     │   dyn TimerBackend    │  ◄── HeapTimerBackend (lazy cancel)
//!     └───────────────────────┘
//!                 │ poll_expired()
//!                 ▼
//!           TimerThread ──on_timer_expired()──► ready queue ──► workers
//!                                                                 │
//!              periodic jobs re-enter the backend after each run ◄┘
//! ```

mod entry;
pub mod impls;
mod worker;

pub(crate) use entry::deadline_after;
pub use entry::{TimerEntry, TimerHandle, TimerType};
pub use impls::{create_backend, HeapTimerBackend, TimerBackendType};
pub use worker::{
    spawn_timer_thread, TimerControl, TimerMode, TimerStats, TimerThreadConfig,
    TimerThreadHandle, TimerWakeCallback,
};

use std::time::Instant;

/// Core timer trait - implement this for different backends
///
/// The timer thread polls, pool callers insert and cancel, workers
/// re-insert periodic entries; all of it concurrently.
pub trait TimerBackend: Send + Sync {
    /// Insert a timer entry
    ///
    /// Returns true if it is now the earliest deadline in the backend; the
    /// caller then wakes the timer thread.
    fn insert(&self, entry: TimerEntry) -> bool;

    /// Cancel a timer by handle (best-effort, may already have fired)
    /// Returns true if the handle was newly marked cancelled
    fn cancel(&self, handle: TimerHandle) -> bool;

    /// Remove and return every due, non-cancelled entry in deadline order
    fn poll_expired(&self, now: Instant) -> Vec<TimerEntry>;

    /// Earliest deadline in the backend, None if nothing is scheduled
    ///
    /// May be a cancelled entry's; the timer thread then wakes early and
    /// finds nothing.
    fn next_deadline(&self) -> Option<Instant>;

    /// Number of live (non-cancelled) timers
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and return every live entry (shutdown)
    fn drain(&self) -> Vec<TimerEntry>;

    /// Backend name for logs
    fn name(&self) -> &'static str {
        "unknown"
    }
}
