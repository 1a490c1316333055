//! Error types for the rearm scheduler

use thiserror::Error;

/// Result type for scheduler operations
pub type SchedResult<T> = Result<T, SchedError>;

/// Errors that can occur in heap, executor and scheduler operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedError {
    /// Caller supplied an unusable value (zero capacity, empty function id, ...)
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Head-dependent operation on an empty heap.
    ///
    /// Callers are expected to check `size()` first, so seeing this
    /// means the coordinator has a bug.
    #[error("deadline heap is empty")]
    EmptyHeap,

    /// Growing the heap storage would exceed the maximum capacity
    #[error("heap capacity exhausted: need {requested} slots, max is {max}")]
    CapacityExhausted { requested: usize, max: usize },

    /// Executor no longer accepts work
    #[error("task rejected: {0}")]
    Rejected(&'static str),

    /// Worker or timer thread could not be spawned
    #[error("failed to spawn thread: {0}")]
    SpawnFailed(String),

    /// Worker or timer thread panicked (observed while joining)
    #[error("worker thread panicked")]
    WorkerPanicked,

    /// User callback returned an error or panicked
    #[error("callback `{function}` failed: {message}")]
    CallbackFailed { function: String, message: String },
}

impl SchedError {
    /// Build a `CallbackFailed` from the function id and the callback's error
    pub fn callback_failed(function: &str, err: &anyhow::Error) -> Self {
        SchedError::CallbackFailed {
            function: function.to_string(),
            message: format!("{:#}", err),
        }
    }
}
