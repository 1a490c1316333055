//! Re-arm trigger
//!
//! Second half of every armed pair. It fires together with the head's
//! callback, retires that head and arms the next one, so each firing
//! pays for the next timer and exactly one pair stays outstanding.

use std::sync::{Arc, Weak};

use rearm_core::SchedError;
use tracing::debug;

use crate::executor::{ExecutorSubstrate, Runnable};
use crate::scheduler::Scheduler;

/// Job name of every trigger
pub const TRIGGER_NAME: &str = "rearm::trigger";

/// Advances one specific scheduler when its armed head comes due
pub struct RearmTrigger<E: ExecutorSubstrate> {
    scheduler: Weak<Scheduler<E>>,
    epoch: u64,
}

impl<E: ExecutorSubstrate> RearmTrigger<E> {
    pub(crate) fn new(scheduler: Weak<Scheduler<E>>, epoch: u64) -> Self {
        Self { scheduler, epoch }
    }

    /// Arm generation this trigger belongs to
    #[inline]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub(crate) fn into_job(self) -> Arc<dyn Runnable> {
        Arc::new(self)
    }
}

impl<E: ExecutorSubstrate> Runnable for RearmTrigger<E> {
    fn run(&self) -> anyhow::Result<()> {
        let Some(scheduler) = self.scheduler.upgrade() else {
            debug!(epoch = self.epoch, "scheduler dropped, trigger ignored");
            return Ok(());
        };
        match scheduler.advance(self.epoch) {
            Err(SchedError::Rejected(reason)) => {
                debug!(epoch = self.epoch, reason, "executor shut down, chain ends");
                Ok(())
            }
            other => Ok(other?),
        }
    }

    fn name(&self) -> &str {
        TRIGGER_NAME
    }
}
