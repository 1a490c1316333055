//! Runtime configuration with environment variable support
//!
//! Configuration is resolved in order of priority:
//! 1. Programmatic builder methods (highest)
//! 2. Environment variables (`REARM_*`)
//! 3. Compile-time defaults (lowest)
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `REARM_POOL_SIZE` | 1 | Worker threads (values <= 0 ignored) |
//! | `REARM_THREAD_NAME` | - | Bare thread name, becomes the prefix `name-` |
//! | `REARM_THREAD_PREFIX` | `rearm-` | Explicit thread name prefix |
//! | `REARM_STACK_SIZE` | system | Thread stack size in bytes |
//! | `REARM_HEAP_CAPACITY` | 11 | Initial deadline heap capacity |
//! | `REARM_MAX_POLL_US` | 1000000 | Longest timer thread park with entries pending |
//! | `REARM_MIN_SLEEP_US` | 50 | Min timer thread sleep |
//! | `REARM_PARK_TIMEOUT_MS` | - | Idle worker park timeout, unset or 0 = until woken |
//! | `REARM_WAIT_ON_SHUTDOWN` | false | Drain due one-shot jobs on shutdown |
//! | `REARM_AWAIT_TERMINATION_SECS` | 0 | Shutdown wait, 0 = don't wait |

pub mod defaults;

use std::time::Duration;

use rearm_core::{env_get, env_get_bool, env_get_opt, env_get_str, SchedError, SchedResult};
use tracing::info;

use crate::timer::TimerThreadConfig;

/// Pool and scheduler configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of worker threads
    pub pool_size: usize,

    /// Thread name prefix; workers are `{prefix}{n}`, the timer thread `{prefix}timer`
    pub thread_name_prefix: String,

    /// Set once a prefix was given explicitly; a bare thread name no longer overrides it
    prefix_explicit: bool,

    /// Stack size for spawned threads (None = system default)
    pub thread_stack_size: Option<usize>,

    /// Initial deadline heap capacity
    pub heap_capacity: usize,

    /// Longest timer thread park while entries are pending; an empty
    /// backend parks until an insert wakes it
    pub max_poll_interval: Duration,

    /// Shortest timer thread sleep
    pub min_sleep: Duration,

    /// Idle worker park timeout (None = until a job is queued)
    pub park_timeout: Option<Duration>,

    /// Graceful (true) or immediate (false) pool shutdown
    pub wait_for_tasks_on_shutdown: bool,

    /// How long shutdown waits for termination (zero = don't wait)
    pub await_termination: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl PoolConfig {
    /// Create config from environment variables with defaults.
    pub fn from_env() -> Self {
        let mut config = Self::new();

        let pool_size: i64 = env_get("REARM_POOL_SIZE", config.pool_size as i64);
        if pool_size > 0 {
            config.pool_size = pool_size as usize;
        }
        if let Some(prefix) = env_get_str("REARM_THREAD_PREFIX") {
            config = config.thread_name_prefix(prefix);
        }
        if let Some(name) = env_get_str("REARM_THREAD_NAME") {
            config = config.thread_name(&name);
        }
        config.thread_stack_size = env_get_opt("REARM_STACK_SIZE");
        config.heap_capacity = env_get("REARM_HEAP_CAPACITY", config.heap_capacity);
        config.max_poll_interval =
            Duration::from_micros(env_get("REARM_MAX_POLL_US", defaults::MAX_POLL_INTERVAL_US));
        config.min_sleep = Duration::from_micros(env_get("REARM_MIN_SLEEP_US", defaults::MIN_SLEEP_US));
        config.park_timeout = env_get_opt::<u64>("REARM_PARK_TIMEOUT_MS")
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);
        config.wait_for_tasks_on_shutdown =
            env_get_bool("REARM_WAIT_ON_SHUTDOWN", defaults::WAIT_FOR_TASKS_ON_SHUTDOWN);
        config.await_termination = Duration::from_secs(env_get(
            "REARM_AWAIT_TERMINATION_SECS",
            defaults::AWAIT_TERMINATION_SECS,
        ));
        config
    }

    /// Create config with explicit defaults (no env override).
    pub fn new() -> Self {
        Self {
            pool_size: defaults::POOL_SIZE,
            thread_name_prefix: defaults::THREAD_NAME_PREFIX.to_string(),
            prefix_explicit: false,
            thread_stack_size: None,
            heap_capacity: defaults::HEAP_CAPACITY,
            max_poll_interval: Duration::from_micros(defaults::MAX_POLL_INTERVAL_US),
            min_sleep: Duration::from_micros(defaults::MIN_SLEEP_US),
            park_timeout: None,
            wait_for_tasks_on_shutdown: defaults::WAIT_FOR_TASKS_ON_SHUTDOWN,
            await_termination: Duration::from_secs(defaults::AWAIT_TERMINATION_SECS),
        }
    }

    // Builder methods

    pub fn pool_size(mut self, n: usize) -> Self {
        self.pool_size = n;
        self
    }

    /// Explicit thread name prefix, used verbatim
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self.prefix_explicit = true;
        self
    }

    /// Bare thread name; becomes the prefix `name-` unless a prefix was set
    pub fn thread_name(mut self, name: &str) -> Self {
        if !self.prefix_explicit {
            self.thread_name_prefix = format!("{}-", name);
        }
        self
    }

    pub fn thread_stack_size(mut self, size: usize) -> Self {
        self.thread_stack_size = Some(size);
        self
    }

    pub fn heap_capacity(mut self, cap: usize) -> Self {
        self.heap_capacity = cap;
        self
    }

    pub fn max_poll_interval(mut self, d: Duration) -> Self {
        self.max_poll_interval = d;
        self
    }

    pub fn min_sleep(mut self, d: Duration) -> Self {
        self.min_sleep = d;
        self
    }

    pub fn park_timeout(mut self, d: Duration) -> Self {
        self.park_timeout = Some(d);
        self
    }

    pub fn wait_for_tasks_on_shutdown(mut self, wait: bool) -> Self {
        self.wait_for_tasks_on_shutdown = wait;
        self
    }

    pub fn await_termination(mut self, d: Duration) -> Self {
        self.await_termination = d;
        self
    }

    /// Validate configuration and return errors if invalid.
    pub fn validate(&self) -> SchedResult<()> {
        if self.pool_size == 0 {
            return Err(SchedError::InvalidArgument("pool_size must be > 0"));
        }
        if self.heap_capacity == 0 {
            return Err(SchedError::InvalidArgument("heap_capacity must be > 0"));
        }
        if self.heap_capacity > rearm_core::MAX_CAPACITY {
            return Err(SchedError::InvalidArgument("heap_capacity exceeds the maximum"));
        }
        if self.max_poll_interval.is_zero() {
            return Err(SchedError::InvalidArgument("max_poll_interval must be > 0"));
        }
        if self.min_sleep > self.max_poll_interval {
            return Err(SchedError::InvalidArgument(
                "min_sleep must be <= max_poll_interval",
            ));
        }
        if self.park_timeout.is_some_and(|d| d.is_zero()) {
            return Err(SchedError::InvalidArgument("park_timeout must be > 0"));
        }
        Ok(())
    }

    /// Timer thread settings derived from this config
    pub fn timer_thread_config(&self) -> TimerThreadConfig {
        TimerThreadConfig {
            max_poll_interval: self.max_poll_interval,
            min_sleep: self.min_sleep,
            thread_name: format!("{}timer", self.thread_name_prefix),
            stack_size: self.thread_stack_size,
        }
    }

    /// Log the resolved configuration
    pub fn log(&self) {
        info!(
            pool_size = self.pool_size,
            thread_name_prefix = %self.thread_name_prefix,
            thread_stack_size = ?self.thread_stack_size,
            heap_capacity = self.heap_capacity,
            max_poll_interval = ?self.max_poll_interval,
            min_sleep = ?self.min_sleep,
            park_timeout = ?self.park_timeout,
            wait_for_tasks_on_shutdown = self.wait_for_tasks_on_shutdown,
            await_termination = ?self.await_termination,
            "rearm configuration"
        );
    }
}
