//! Linux futex-based worker parking
//!
//! The futex word is the wake epoch. A parker waits while the word still
//! equals its snapshot; a waker bumps the word and then issues FUTEX_WAKE
//! only if someone is parked. Both sides use SeqCst, so a waker that sees
//! `parked == 0` is ordered before the parker's FUTEX_WAIT value check and
//! that check fails fast.

use super::WorkerParking;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

pub struct FutexParking {
    /// Futex word: wake epoch
    epoch: AtomicU32,

    /// Workers currently inside `park()`
    parked: AtomicUsize,
}

impl FutexParking {
    pub fn new() -> Self {
        Self {
            epoch: AtomicU32::new(0),
            parked: AtomicUsize::new(0),
        }
    }

    fn bump_and_wake(&self, waiters: i32) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if self.parked.load(Ordering::SeqCst) == 0 {
            return;
        }
        // SAFETY: the futex word lives as long as `self`; FUTEX_WAKE only
        // reads the address.
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.epoch.as_ptr(),
                libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
                waiters,
                std::ptr::null::<libc::timespec>(),
                std::ptr::null::<u32>(),
                0u32,
            );
        }
    }
}

impl Default for FutexParking {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerParking for FutexParking {
    #[inline]
    fn prepare(&self) -> u32 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn park(&self, epoch: u32, timeout: Option<Duration>) -> bool {
        self.parked.fetch_add(1, Ordering::SeqCst);

        let timespec = timeout.map(|d| libc::timespec {
            tv_sec: d.as_secs() as libc::time_t,
            tv_nsec: d.subsec_nanos() as libc::c_long,
        });
        let timespec_ptr = match &timespec {
            Some(ts) => ts as *const libc::timespec,
            None => std::ptr::null(),
        };

        // SAFETY: valid futex word and a timespec that outlives the call.
        // FUTEX_WAIT returns EAGAIN at once if the epoch already moved.
        let result = unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.epoch.as_ptr(),
                libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
                epoch,
                timespec_ptr,
                std::ptr::null::<u32>(),
                0u32,
            )
        };

        self.parked.fetch_sub(1, Ordering::SeqCst);

        if result == 0 {
            return true;
        }
        // ETIMEDOUT, EINTR or EAGAIN: report woken only if the epoch moved
        self.epoch.load(Ordering::SeqCst) != epoch
    }

    fn wake_one(&self) {
        self.bump_and_wake(1);
    }

    fn wake_all(&self) {
        self.bump_and_wake(i32::MAX);
    }

    fn parked_count(&self) -> usize {
        self.parked.load(Ordering::Relaxed)
    }
}
