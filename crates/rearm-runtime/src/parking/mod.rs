//! Idle worker parking
//!
//! Workers with nothing to run park here until the timer thread
//! dispatches a due job. Parking is epoch based: a worker snapshots the
//! wake epoch with `prepare()` *before* it looks at the job queue, then
//! parks against that snapshot. A wake that lands between the queue check
//! and the park bumps the epoch, so the park returns immediately instead
//! of sleeping through it.

use std::time::Duration;

/// Platform-specific worker parking mechanism
pub trait WorkerParking: Send + Sync {
    /// Snapshot the wake epoch; pass it to `park()`
    fn prepare(&self) -> u32;

    /// Park the calling worker until the epoch moves past `epoch` or `timeout` elapses
    ///
    /// Returns `true` if woken, `false` on timeout or spurious return.
    /// Callers re-check for work either way.
    fn park(&self, epoch: u32, timeout: Option<Duration>) -> bool;

    /// Wake one parked worker
    fn wake_one(&self);

    /// Wake every parked worker (shutdown)
    fn wake_all(&self);

    /// Number of currently parked workers (hint, may be stale)
    fn parked_count(&self) -> usize;
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod futex_linux;
        pub use futex_linux::FutexParking as PlatformParking;
    } else {
        mod fallback;
        pub use fallback::FallbackParking as PlatformParking;
    }
}

/// Create a new platform-appropriate parking instance
pub fn new_parking() -> Box<dyn WorkerParking> {
    Box::new(PlatformParking::new())
}
