//! Timer backend implementations
//!
//! Currently provides:
//! - `HeapTimerBackend` - BinaryHeap with lazy cancellation

mod heap;

pub use heap::{HeapTimerBackend, HeapTimerStats};

use std::sync::Arc;

use crate::timer::TimerBackend;

/// Backend selector for configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerBackendType {
    /// BinaryHeap-based implementation
    ///
    /// - O(log n) insert
    /// - O(1) peek next deadline
    /// - O(log n) pop expired
    /// - O(1) cancel (lazy, marked in HashSet)
    #[default]
    BinaryHeap,
}

impl TimerBackendType {
    pub fn name(&self) -> &'static str {
        match self {
            TimerBackendType::BinaryHeap => "binary_heap",
        }
    }
}

/// Create a timer backend based on type
pub fn create_backend(backend_type: TimerBackendType) -> Arc<dyn TimerBackend> {
    match backend_type {
        TimerBackendType::BinaryHeap => Arc::new(HeapTimerBackend::new()),
    }
}
