//! # rearm-runtime
//!
//! Threaded runtime for the rearm deadline scheduler.
//!
//! This crate provides:
//! - A scheduled thread pool (the executor substrate)
//! - The timer thread and its backend
//! - Worker parking (futex on Linux, condvar elsewhere)
//! - The lazy re-arming `Scheduler` and its `RearmTrigger`

pub mod config;
pub mod executor;
pub mod parking;
pub mod rearm;
pub mod scheduler;
pub mod timer;
pub mod worker;

// Re-exports
pub use config::PoolConfig;
pub use executor::{
    CancellableHandle, ExecutorSubstrate, FnJob, InitialTask, JobStatus, PoolStats, Runnable,
    ScheduledHandle, ScheduledJob, ScheduledThreadPool,
};
pub use parking::{new_parking, WorkerParking};
pub use rearm::{RearmTrigger, TRIGGER_NAME};
pub use scheduler::Scheduler;
pub use worker::{current_job_token, current_worker_id, is_current_job_cancelled, WorkerPool};
