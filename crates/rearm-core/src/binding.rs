//! Callback bindings
//!
//! A `TaskBinding` is the unit the scheduler hands to the executor: a
//! function id, an optional receiver and an argument value, all captured
//! once at construction and never mutated afterwards.
//!
//! Two bindings denote the same logical task when their identity keys
//! match: same function id, same receiver instance (pointer identity of
//! the shared receiver) and equal arguments. The deadline is not part of
//! the key, which is what lets `add_task` replace a pending entry.
//!
//! ```ignore
//! let ledger = Arc::new(Ledger::open()?);
//! let expire = TaskBinding::new("ledger::expire", ledger, InvoiceId(42), |l, id| {
//!     l.expire(*id)
//! })?;
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::{SchedError, SchedResult};

type Invoke = dyn Fn() -> anyhow::Result<()> + Send + Sync;

/// Type-erased argument value that still supports equality
trait BindingArgs: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn eq_args(&self, other: &dyn BindingArgs) -> bool;
    fn fmt_args(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
}

impl<A> BindingArgs for A
where
    A: PartialEq + fmt::Debug + Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_args(&self, other: &dyn BindingArgs) -> bool {
        other
            .as_any()
            .downcast_ref::<A>()
            .is_some_and(|other| self == other)
    }

    fn fmt_args(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Immutable, invocable callback with an identity key
#[derive(Clone)]
pub struct TaskBinding {
    function: &'static str,
    receiver: Option<usize>,
    args: Arc<dyn BindingArgs>,
    invoke: Arc<Invoke>,
}

impl TaskBinding {
    /// Bind `f` to a shared receiver and an argument value
    pub fn new<R, A, F>(function: &'static str, receiver: Arc<R>, args: A, f: F) -> SchedResult<Self>
    where
        R: Send + Sync + 'static,
        A: PartialEq + fmt::Debug + Send + Sync + 'static,
        F: Fn(&R, &A) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        check_function(function)?;
        let receiver_id = Arc::as_ptr(&receiver) as *const () as usize;
        let args = Arc::new(args);
        let captured = Arc::clone(&args);
        Ok(Self {
            function,
            receiver: Some(receiver_id),
            args,
            invoke: Arc::new(move || f(&receiver, &captured)),
        })
    }

    /// Bind `f` to an argument value, no receiver
    pub fn with_args<A, F>(function: &'static str, args: A, f: F) -> SchedResult<Self>
    where
        A: PartialEq + fmt::Debug + Send + Sync + 'static,
        F: Fn(&A) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        check_function(function)?;
        let args = Arc::new(args);
        let captured = Arc::clone(&args);
        Ok(Self {
            function,
            receiver: None,
            args,
            invoke: Arc::new(move || f(&captured)),
        })
    }

    /// Bind a plain closure; identity is the function id alone
    pub fn from_fn<F>(function: &'static str, f: F) -> SchedResult<Self>
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        check_function(function)?;
        Ok(Self {
            function,
            receiver: None,
            args: Arc::new(()),
            invoke: Arc::new(f),
        })
    }

    /// Run the bound callback on the current thread
    #[inline]
    pub fn invoke(&self) -> anyhow::Result<()> {
        (self.invoke)()
    }

    /// Stable function id
    #[inline]
    pub fn function(&self) -> &'static str {
        self.function
    }

    /// Compare identity keys (function, receiver, arguments)
    pub fn same_identity(&self, other: &TaskBinding) -> bool {
        self.function == other.function
            && self.receiver == other.receiver
            && self.args.eq_args(other.args.as_ref())
    }
}

#[inline]
fn check_function(function: &'static str) -> SchedResult<()> {
    if function.is_empty() {
        return Err(SchedError::InvalidArgument("function id must not be empty"));
    }
    Ok(())
}

struct ArgsDebug<'a>(&'a dyn BindingArgs);

impl fmt::Debug for ArgsDebug<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt_args(f)
    }
}

impl fmt::Debug for TaskBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskBinding")
            .field("function", &self.function)
            .field("receiver", &self.receiver.map(|r| format!("{:#x}", r)))
            .field("args", &ArgsDebug(self.args.as_ref()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        hits: AtomicUsize,
    }

    fn counter() -> Arc<Counter> {
        Arc::new(Counter {
            hits: AtomicUsize::new(0),
        })
    }

    fn bump(c: &Counter, by: &usize) -> anyhow::Result<()> {
        c.hits.fetch_add(*by, Ordering::SeqCst);
        Ok(())
    }

    #[test]
    fn test_invoke_uses_captured_state() {
        let c = counter();
        let binding = TaskBinding::new("counter::bump", Arc::clone(&c), 3usize, bump).unwrap();

        binding.invoke().unwrap();
        binding.clone().invoke().unwrap();
        assert_eq!(c.hits.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_identity_ignores_closure_instance() {
        let c = counter();
        let a = TaskBinding::new("counter::bump", Arc::clone(&c), 1usize, bump).unwrap();
        let b = TaskBinding::new("counter::bump", Arc::clone(&c), 1usize, |_, _| Ok(())).unwrap();
        assert!(a.same_identity(&b));
    }

    #[test]
    fn test_identity_distinguishes_parts() {
        let c = counter();
        let other = counter();
        let base = TaskBinding::new("counter::bump", Arc::clone(&c), 1usize, bump).unwrap();

        let diff_args = TaskBinding::new("counter::bump", Arc::clone(&c), 2usize, bump).unwrap();
        let diff_fn = TaskBinding::new("counter::reset", Arc::clone(&c), 1usize, bump).unwrap();
        let diff_recv = TaskBinding::new("counter::bump", other, 1usize, bump).unwrap();
        let diff_type = TaskBinding::new("counter::bump", c, 1u32, |_, _| Ok(())).unwrap();

        assert!(!base.same_identity(&diff_args));
        assert!(!base.same_identity(&diff_fn));
        assert!(!base.same_identity(&diff_recv));
        assert!(!base.same_identity(&diff_type));
    }

    #[test]
    fn test_receiverless_bindings() {
        let a = TaskBinding::with_args("report::send", "daily".to_string(), |_| Ok(())).unwrap();
        let b = TaskBinding::with_args("report::send", "daily".to_string(), |_| Ok(())).unwrap();
        let c = TaskBinding::from_fn("report::send", || Ok(())).unwrap();

        assert!(a.same_identity(&b));
        assert!(!a.same_identity(&c));
    }

    #[test]
    fn test_empty_function_rejected() {
        let err = TaskBinding::from_fn("", || Ok(())).unwrap_err();
        assert!(matches!(err, SchedError::InvalidArgument(_)));
    }

    #[test]
    fn test_errors_propagate() {
        let binding = TaskBinding::from_fn("always::fails", || anyhow::bail!("boom")).unwrap();
        let err = binding.invoke().unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_debug_shows_args() {
        let binding = TaskBinding::with_args("report::send", 7u8, |_| Ok(())).unwrap();
        let debug = format!("{:?}", binding);
        assert!(debug.contains("report::send"));
        assert!(debug.contains("7"));
    }
}
