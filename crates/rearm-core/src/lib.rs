//! # rearm-core
//!
//! Core types for the rearm deadline scheduler.
//!
//! This crate owns no threads. It holds the pieces every layer shares:
//! the deadline heap and what gets stored in it.
//!
//! ## Modules
//!
//! - `heap` - Concurrent binary min-heap keyed by deadline
//! - `descriptor` - Per-entry value: deadline, binding, recurrence
//! - `binding` - Callback binding with an identity key
//! - `time_unit` - Units for recurrence periods
//! - `cancel` - Cancellation token for cooperative cancellation
//! - `advisory` - Single-owner advisory flag (heap growth)
//! - `error` - Error types
//! - `env` - Environment variable utilities

pub mod advisory;
pub mod binding;
pub mod cancel;
pub mod descriptor;
pub mod env;
pub mod error;
pub mod heap;
pub mod time_unit;

// Re-exports for convenience
pub use advisory::AdvisoryFlag;
pub use binding::TaskBinding;
pub use cancel::CancellationToken;
pub use descriptor::{CallbackDescriptor, HeadTask, Recurrence};
pub use env::{env_get, env_get_bool, env_get_opt, env_get_str};
pub use error::{SchedError, SchedResult};
pub use heap::{DeadlineHeap, DEFAULT_INITIAL_CAPACITY, MAX_CAPACITY, ROOT};
pub use time_unit::TimeUnit;
