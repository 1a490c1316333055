//! Single-owner advisory flag
//!
//! A try-only lock with no payload: whoever wins the compare-and-set
//! owns the side effect it guards (heap storage allocation) until the
//! guard is dropped. Losers never wait, they back off and retry later.

use core::sync::atomic::{AtomicBool, Ordering};

/// Advisory flag, free or busy
#[derive(Debug, Default)]
pub struct AdvisoryFlag {
    busy: AtomicBool,
}

impl AdvisoryFlag {
    /// Create a free flag
    #[inline]
    pub const fn new() -> Self {
        AdvisoryFlag {
            busy: AtomicBool::new(false),
        }
    }

    /// Try to take ownership without spinning
    ///
    /// Returns `None` if another thread currently owns the flag.
    #[inline]
    pub fn try_acquire(&self) -> Option<AdvisoryGuard<'_>> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(AdvisoryGuard { flag: self })
        } else {
            None
        }
    }

    /// Check whether some thread owns the flag right now
    #[inline]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Relaxed)
    }
}

/// Releases the flag when dropped
pub struct AdvisoryGuard<'a> {
    flag: &'a AdvisoryFlag,
}

impl Drop for AdvisoryGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.flag.busy.store(false, Ordering::Release);
    }
}
