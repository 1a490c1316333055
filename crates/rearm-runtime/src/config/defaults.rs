//! Compile-time defaults for the pool configuration
//!
//! Every value here can be overridden through the matching `REARM_*`
//! environment variable or a builder method on `PoolConfig`.

/// Worker threads executing callbacks
pub const POOL_SIZE: usize = 1;

/// Prefix for worker and timer thread names
pub const THREAD_NAME_PREFIX: &str = "rearm-";

/// Initial slot count of the deadline heap
pub const HEAP_CAPACITY: usize = rearm_core::DEFAULT_INITIAL_CAPACITY;

/// Longest single timer thread park while entries are pending
pub const MAX_POLL_INTERVAL_US: u64 = 1_000_000;

/// Shortest timer thread sleep (no busy spinning)
pub const MIN_SLEEP_US: u64 = 50;

/// Let already-due one-shot jobs finish on shutdown
pub const WAIT_FOR_TASKS_ON_SHUTDOWN: bool = false;

/// Seconds to wait for pool termination on shutdown (0 = don't wait)
pub const AWAIT_TERMINATION_SECS: u64 = 0;
