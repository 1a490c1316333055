//! Timer thread
//!
//! Single thread that polls the timer backend and hands due entries to
//! the pool through a `TimerWakeCallback`.
//!
//! # Design
//!
//! The timer thread:
//! 1. Polls the backend for expired entries
//! 2. Calls `on_timer_expired(entry)` for each, in deadline order
//! 3. Parks until the next deadline, or indefinitely when nothing is pending
//!
//! Inserting an entry that becomes the earliest deadline must be followed
//! by `TimerControl::wake()`. The park is epoch based (see `parking`), so a
//! wake that lands while the thread is still polling is not lost.
//!
//! It exits when the control is switched to `Stop`, or to `Drain` and the
//! backend has nothing left. `on_timer_stopped()` runs on the way out,
//! including when the loop panics.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rearm_core::{SchedError, SchedResult};
use tracing::{debug, trace};

use crate::parking::{new_parking, WorkerParking};
use crate::timer::{TimerBackend, TimerEntry};

/// Configuration for the timer thread
#[derive(Debug, Clone)]
pub struct TimerThreadConfig {
    /// Longest single park while entries are pending
    pub max_poll_interval: Duration,

    /// Minimum sleep time (prevents busy-spinning)
    pub min_sleep: Duration,

    pub thread_name: String,

    /// Stack size for timer thread (None = system default)
    pub stack_size: Option<usize>,
}

impl Default for TimerThreadConfig {
    fn default() -> Self {
        Self {
            max_poll_interval: Duration::from_secs(1),
            min_sleep: Duration::from_micros(50),
            thread_name: "rearm-timer".into(),
            stack_size: None,
        }
    }
}

/// Timer thread run mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerMode {
    /// Normal operation
    Running,
    /// Exit once the backend is empty
    Drain,
    /// Exit now
    Stop,
}

/// Shared run mode plus the timer thread's wake-up
///
/// The mode only ever moves forward (Running -> Drain -> Stop), and every
/// switch wakes the timer thread.
pub struct TimerControl {
    mode: AtomicU8,
    wake: Box<dyn WorkerParking>,
    /// Held while the pool reshuffles the backend on shutdown, so the
    /// timer thread never sees the transient empty state
    transition: Mutex<()>,
}

impl TimerControl {
    pub fn new() -> Self {
        Self {
            mode: AtomicU8::new(TimerMode::Running as u8),
            wake: new_parking(),
            transition: Mutex::new(()),
        }
    }

    #[inline]
    pub fn mode(&self) -> TimerMode {
        match self.mode.load(Ordering::Acquire) {
            0 => TimerMode::Running,
            1 => TimerMode::Drain,
            _ => TimerMode::Stop,
        }
    }

    /// Switch to `Drain`; false if already draining or stopped
    pub fn request_drain(&self) -> bool {
        self.drain_with(|| ())
    }

    /// Switch to `Drain` and run `reshuffle` before the timer thread may
    /// decide the backend is empty
    pub fn drain_with<F: FnOnce()>(&self, reshuffle: F) -> bool {
        let _transition = self.transition.lock();
        let switched = self.advance(TimerMode::Drain);
        if switched {
            reshuffle();
        }
        self.wake();
        switched
    }

    /// Switch to `Stop`; false if already stopped
    pub fn request_stop(&self) -> bool {
        let switched = self.advance(TimerMode::Stop);
        self.wake();
        switched
    }

    /// Cut the timer thread's current park short
    #[inline]
    pub fn wake(&self) {
        self.wake.wake_one();
    }

    fn advance(&self, to: TimerMode) -> bool {
        self.mode.fetch_max(to as u8, Ordering::AcqRel) < to as u8
    }

    /// Drain mode is finished once the backend holds nothing live
    fn drained(&self, backend: &dyn TimerBackend) -> bool {
        let _transition = self.transition.lock();
        backend.is_empty()
    }
}

impl std::fmt::Debug for TimerControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerControl")
            .field("mode", &self.mode())
            .finish()
    }
}

impl Default for TimerControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver of expired timers
///
/// The pool implements this to queue due jobs for its workers.
pub trait TimerWakeCallback: Send + Sync {
    /// Called for each expired entry
    fn on_timer_expired(&self, entry: TimerEntry);

    /// Called once when the timer thread exits
    fn on_timer_stopped(&self) {}
}

/// Handle to a running timer thread
pub struct TimerThreadHandle {
    handle: JoinHandle<TimerStats>,
}

impl TimerThreadHandle {
    /// Wait for the timer thread to exit
    ///
    /// Does not request anything; switch the `TimerControl` first.
    pub fn join(self) -> SchedResult<TimerStats> {
        self.handle.join().map_err(|_| SchedError::WorkerPanicked)
    }

    pub fn thread_id(&self) -> thread::ThreadId {
        self.handle.thread().id()
    }
}

/// Statistics from timer thread execution
#[derive(Debug, Clone, Default)]
pub struct TimerStats {
    /// Total poll iterations
    pub poll_count: u64,

    /// Total entries handed out
    pub timers_fired: u64,

    /// Total time spent in poll_expired() and dispatch
    pub poll_time: Duration,

    /// Largest number of entries handed out by one poll
    pub max_batch_size: usize,
}

/// Spawn the timer thread
pub fn spawn_timer_thread<W>(
    backend: Arc<dyn TimerBackend>,
    wake_callback: Arc<W>,
    control: Arc<TimerControl>,
    config: TimerThreadConfig,
) -> SchedResult<TimerThreadHandle>
where
    W: TimerWakeCallback + 'static,
{
    let mut builder = thread::Builder::new().name(config.thread_name.clone());
    if let Some(stack_size) = config.stack_size {
        builder = builder.stack_size(stack_size);
    }

    let handle = builder
        .spawn(move || {
            let _stopped = StoppedNotice(Arc::clone(&wake_callback));
            timer_loop(backend, wake_callback, control, config)
        })
        .map_err(|e| SchedError::SpawnFailed(e.to_string()))?;

    Ok(TimerThreadHandle { handle })
}

struct StoppedNotice<W: TimerWakeCallback>(Arc<W>);

impl<W: TimerWakeCallback> Drop for StoppedNotice<W> {
    fn drop(&mut self) {
        self.0.on_timer_stopped();
    }
}

fn timer_loop<W>(
    backend: Arc<dyn TimerBackend>,
    wake_callback: Arc<W>,
    control: Arc<TimerControl>,
    config: TimerThreadConfig,
) -> TimerStats
where
    W: TimerWakeCallback,
{
    let mut stats = TimerStats::default();
    debug!(thread = %config.thread_name, backend = backend.name(), "timer thread started");

    loop {
        let epoch = control.wake.prepare();
        match control.mode() {
            TimerMode::Stop => break,
            TimerMode::Drain if control.drained(backend.as_ref()) => break,
            _ => {}
        }

        let poll_start = Instant::now();
        let expired = backend.poll_expired(poll_start);
        let batch_size = expired.len();

        stats.poll_count += 1;
        stats.timers_fired += batch_size as u64;
        stats.max_batch_size = stats.max_batch_size.max(batch_size);

        if batch_size > 0 {
            trace!(batch_size, "dispatching expired timers");
        }
        for entry in expired {
            wake_callback.on_timer_expired(entry);
        }

        stats.poll_time += poll_start.elapsed();

        match calculate_sleep(backend.as_ref(), &config) {
            Some(sleep) if sleep.is_zero() => {}
            timeout => {
                control.wake.park(epoch, timeout);
            }
        }
    }

    debug!(
        polls = stats.poll_count,
        fired = stats.timers_fired,
        max_batch = stats.max_batch_size,
        "timer thread stopped"
    );
    stats
}

/// How long to park before the next poll; `None` parks until woken
#[inline]
fn calculate_sleep(backend: &dyn TimerBackend, config: &TimerThreadConfig) -> Option<Duration> {
    let deadline = backend.next_deadline()?;
    let now = Instant::now();
    if deadline <= now {
        return Some(Duration::ZERO);
    }
    Some(
        (deadline - now)
            .min(config.max_poll_interval)
            .max(config.min_sleep),
    )
}
