//! Lazy re-arming deadline scheduler
//!
//! Every pending callback lives in a `DeadlineHeap`, but only the head is
//! ever known to the executor. The scheduler is in one of two regimes:
//!
//! - **Idle**: heap empty, nothing outstanding
//! - **Armed**: heap non-empty, one pair outstanding (the head's callback
//!   plus a `RearmTrigger`, both due after the head's delay)
//!
//! When the pair fires, the trigger pops the head and arms the next one.
//! Inserting an entry that becomes the new head cancels the pair and
//! arms the new head instead.
//!
//! All decisions run under one arm lock, and each pair carries an epoch.
//! A trigger that fires after its pair was replaced sees a stale epoch
//! and does nothing.
//!
//! # Recurring heads
//!
//! A fixed-rate or fixed-delay head is armed through the executor's
//! periodic primitive. When its trigger retires it from the heap the
//! periodic job is detached and keeps running on its own. `add_task`
//! with the same identity cancels the detached job; `stop_task` does not.

use std::cmp::Ordering as CmpOrdering;
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::Mutex;
use rearm_core::{
    CallbackDescriptor, DeadlineHeap, HeadTask, SchedResult, TaskBinding, ROOT,
};
use tracing::{debug, warn};

use crate::executor::{CancellableHandle, ExecutorSubstrate};
use crate::rearm::RearmTrigger;

/// The outstanding pair for the current head
struct ArmedPair<H> {
    epoch: u64,
    deadline: Instant,
    binding: TaskBinding,
    recurring: bool,
    callback: H,
    trigger: H,
}

/// Recurring job whose head already left the heap
struct Detached<H> {
    binding: TaskBinding,
    handle: H,
}

struct ArmState<H> {
    next_epoch: u64,
    armed: Option<ArmedPair<H>>,
    detached: Vec<Detached<H>>,
}

/// How a replaced pair is taken down
#[derive(Clone, Copy, PartialEq, Eq)]
enum Disarm {
    /// Cancel both handles
    Cancel,
    /// If the head is already due, let its callback run and retire the
    /// head here; otherwise cancel both
    RetireIfDue,
}

/// Deadline scheduler over an executor substrate
pub struct Scheduler<E: ExecutorSubstrate> {
    heap: DeadlineHeap,
    executor: Arc<E>,
    state: Mutex<ArmState<E::Handle>>,
    me: Weak<Scheduler<E>>,
}

impl<E: ExecutorSubstrate> Scheduler<E> {
    /// Scheduler with a fresh heap of `initial_capacity` slots
    pub fn new(executor: Arc<E>, initial_capacity: usize) -> SchedResult<Arc<Self>> {
        let heap = DeadlineHeap::new(initial_capacity)?;
        Ok(Self::with_heap(executor, heap))
    }

    /// Scheduler over an existing (empty) heap
    pub fn with_heap(executor: Arc<E>, heap: DeadlineHeap) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            heap,
            executor,
            state: Mutex::new(ArmState {
                next_epoch: 1,
                armed: None,
                detached: Vec::new(),
            }),
            me: me.clone(),
        })
    }

    /// Schedule `binding` at `deadline`, replacing any entry with the same identity
    pub fn add_task(&self, deadline: Instant, binding: TaskBinding) -> SchedResult<()> {
        self.add_descriptor(CallbackDescriptor::once(deadline, binding))
    }

    /// Schedule `binding` at `deadline`; existing entries with the same identity stay
    pub fn add_if_absent(&self, deadline: Instant, binding: TaskBinding) -> SchedResult<()> {
        self.add_descriptor_if_absent(CallbackDescriptor::once(deadline, binding))
    }

    /// Upsert a descriptor (one-shot or recurring)
    pub fn add_descriptor(&self, descriptor: CallbackDescriptor) -> SchedResult<()> {
        let mut state = self.state.lock();
        self.cancel_detached(&mut state, descriptor.binding());

        if !self.heap.is_empty() {
            if let Some(index) = self.heap.remove_by_identity(descriptor.binding()) {
                if index == ROOT {
                    debug!(
                        function = descriptor.binding().function(),
                        "replaced entry was the head, re-arming"
                    );
                    self.disarm(&mut state, Disarm::Cancel);
                    if !self.heap.is_empty() {
                        self.arm_head(&mut state)?;
                    }
                }
            }
        }

        self.insert_and_arm(&mut state, descriptor)
    }

    /// Insert a descriptor without identity-based replacement
    pub fn add_descriptor_if_absent(&self, descriptor: CallbackDescriptor) -> SchedResult<()> {
        let mut state = self.state.lock();
        self.insert_and_arm(&mut state, descriptor)
    }

    fn insert_and_arm(
        &self,
        state: &mut ArmState<E::Handle>,
        descriptor: CallbackDescriptor,
    ) -> SchedResult<()> {
        if self.heap.is_empty() {
            self.heap.insert(descriptor)?;
            return self.arm_head(state);
        }

        if self.heap.compare_first_time(descriptor.deadline())? == CmpOrdering::Less {
            self.disarm(state, Disarm::RetireIfDue);
            self.heap.insert(descriptor)?;
            return self.arm_head(state);
        }

        self.heap.insert(descriptor)?;
        if state.armed.is_none() {
            // stopped, or a previous arm was rejected
            self.arm_head(state)?;
        }
        Ok(())
    }

    /// Arm the current head, replacing whatever pair is outstanding
    pub fn register_head_task(&self) -> SchedResult<()> {
        let mut state = self.state.lock();
        let head = self.heap.peek_head()?;
        self.disarm(&mut state, Disarm::Cancel);
        self.arm(&mut state, head)
    }

    /// Pop the head (if any) and cancel the outstanding pair
    ///
    /// Does not arm the next head. Idempotent on an empty heap.
    pub fn destroy_head_task(&self) {
        let mut state = self.state.lock();
        if self.heap.remove_head() {
            debug!(remaining = self.heap.size(), "head destroyed");
        }
        self.disarm(&mut state, Disarm::Cancel);
    }

    /// Cancel the outstanding pair; heap contents are kept
    pub fn stop_task(&self) {
        let mut state = self.state.lock();
        self.disarm(&mut state, Disarm::Cancel);
    }

    /// Cancel the outstanding pair and every detached recurring job
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        self.disarm(&mut state, Disarm::Cancel);
        let detached = std::mem::take(&mut state.detached);
        for d in &detached {
            d.handle.cancel(true);
        }
        debug!(
            detached = detached.len(),
            pending = self.heap.size(),
            "scheduler shut down"
        );
    }

    /// Live heap entries
    #[inline]
    pub fn size(&self) -> usize {
        self.heap.size()
    }

    /// Handles currently tracked for the armed pair (0 or 2)
    pub fn outstanding(&self) -> usize {
        if self.state.lock().armed.is_some() {
            2
        } else {
            0
        }
    }

    /// Recurring jobs running detached from the heap
    pub fn detached(&self) -> usize {
        let mut state = self.state.lock();
        state.detached.retain(|d| !d.handle.is_done());
        state.detached.len()
    }

    /// Deadline of the head the outstanding pair was armed for
    pub fn armed_deadline(&self) -> Option<Instant> {
        self.state.lock().armed.as_ref().map(|p| p.deadline)
    }

    /// Head snapshot with its current delay
    pub fn peek_head(&self) -> SchedResult<HeadTask> {
        self.heap.peek_head()
    }

    pub fn executor(&self) -> &Arc<E> {
        &self.executor
    }

    /// Trigger entry point: retire the head armed under `epoch`, arm the next
    pub(crate) fn advance(&self, epoch: u64) -> SchedResult<()> {
        let mut state = self.state.lock();
        if state.armed.as_ref().map(|p| p.epoch) != Some(epoch) {
            debug!(epoch, "stale trigger ignored");
            return Ok(());
        }

        if let Some(pair) = state.armed.take() {
            self.retire(&mut state, pair);
        }
        if !self.heap.is_empty() {
            self.arm_head(&mut state)?;
        }
        Ok(())
    }

    fn arm_head(&self, state: &mut ArmState<E::Handle>) -> SchedResult<()> {
        let head = self.heap.peek_head()?;
        self.arm(state, head)
    }

    /// Submit the head's callback and a trigger, both after the head's delay
    fn arm(&self, state: &mut ArmState<E::Handle>, head: HeadTask) -> SchedResult<()> {
        let epoch = state.next_epoch;
        state.next_epoch += 1;

        let HeadTask { descriptor, delay } = head;
        let callback = self.executor.schedule_descriptor(&descriptor, delay)?;
        let trigger = RearmTrigger::new(self.me.clone(), epoch).into_job();
        let trigger = match self.executor.schedule_once(trigger, delay) {
            Ok(handle) => handle,
            Err(err) => {
                callback.cancel(false);
                return Err(err);
            }
        };

        debug!(
            function = descriptor.binding().function(),
            delay = ?delay,
            recurrence = ?descriptor.recurrence(),
            period = descriptor.period_amount(),
            unit = descriptor.unit().suffix(),
            epoch,
            "armed head"
        );
        state.armed = Some(ArmedPair {
            epoch,
            deadline: descriptor.deadline(),
            binding: descriptor.binding().clone(),
            recurring: descriptor.recurrence().is_periodic(),
            callback,
            trigger,
        });
        Ok(())
    }

    fn disarm(&self, state: &mut ArmState<E::Handle>, mode: Disarm) {
        let Some(pair) = state.armed.take() else {
            return;
        };

        if mode == Disarm::RetireIfDue && pair.deadline <= Instant::now() {
            // The callback is already due; only the trigger is withdrawn
            pair.trigger.cancel(false);
            self.retire(state, pair);
            return;
        }

        pair.callback.cancel(true);
        pair.trigger.cancel(true);
        debug!(epoch = pair.epoch, "pair cancelled");
    }

    /// Pop a head whose callback fired (or is firing)
    ///
    /// The one-shot callback handle is released without cancelling: it
    /// may still be queued behind the trigger. A recurring one is detached.
    fn retire(&self, state: &mut ArmState<E::Handle>, pair: ArmedPair<E::Handle>) {
        match self.heap.peek_head() {
            Ok(head)
                if head.descriptor.deadline() == pair.deadline
                    && head.descriptor.binding().same_identity(&pair.binding) =>
            {
                self.heap.remove_head();
            }
            _ => warn!(
                function = pair.binding.function(),
                "armed head no longer at the top, nothing retired"
            ),
        }

        if pair.recurring {
            state.detached.retain(|d| !d.handle.is_done());
            state.detached.push(Detached {
                binding: pair.binding,
                handle: pair.callback,
            });
        }
        debug!(epoch = pair.epoch, remaining = self.heap.size(), "head retired");
    }

    fn cancel_detached(&self, state: &mut ArmState<E::Handle>, binding: &TaskBinding) {
        state.detached.retain(|d| {
            if d.binding.same_identity(binding) {
                d.handle.cancel(true);
                debug!(function = binding.function(), "detached recurring job replaced");
                false
            } else {
                !d.handle.is_done()
            }
        });
    }
}
