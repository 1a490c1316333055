//! Basic rearm example
//!
//! Schedules a handful of one-shot callbacks out of order, replaces one of
//! them with an earlier deadline, and adds a fixed-rate heartbeat. Only one
//! timer pair is outstanding at any moment.
//!
//! # Environment Variables
//!
//! - `REARM_LOG=debug` - Show arm/retire decisions (or use `RUST_LOG`)
//! - `REARM_POOL_SIZE=4` - Worker threads
//! - `REARM_WAIT_ON_SHUTDOWN=1` - Drain due jobs on shutdown

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rearm::{CallbackDescriptor, DeadlineService, PoolConfig, TaskBinding, TimeUnit};
use tracing::info;

/// Receiver shared by every reminder
struct Reminders {
    started: Instant,
    sent: AtomicUsize,
}

impl Reminders {
    fn send(&self, who: &&'static str) -> anyhow::Result<()> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        info!(who = *who, elapsed_ms = self.started.elapsed().as_millis() as u64, "reminder sent");
        Ok(())
    }
}

// REARM_LOG=debug cargo run -p rearm-basic
fn main() -> anyhow::Result<()> {
    rearm::init_logging();

    let config = PoolConfig::default()
        .pool_size(2)
        .await_termination(Duration::from_secs(2));
    let service = DeadlineService::start(config)?;
    let scheduler = service.scheduler();

    let reminders = Arc::new(Reminders {
        started: Instant::now(),
        sent: AtomicUsize::new(0),
    });
    let now = Instant::now();

    for (who, ms) in [("carol", 600u64), ("alice", 200), ("bob", 400), ("dave", 900)] {
        let binding = TaskBinding::new("reminders::send", Arc::clone(&reminders), who, Reminders::send)?;
        scheduler.add_task(now + Duration::from_millis(ms), binding)?;
    }
    info!(pending = scheduler.size(), outstanding = scheduler.outstanding(), "reminders queued");

    // dave moves to the front; the armed pair for alice is replaced
    let dave = TaskBinding::new("reminders::send", Arc::clone(&reminders), "dave", Reminders::send)?;
    scheduler.add_task(now + Duration::from_millis(100), dave)?;
    info!(pending = scheduler.size(), "dave rescheduled");

    let beats = Arc::new(AtomicUsize::new(0));
    let b = Arc::clone(&beats);
    let heartbeat = TaskBinding::from_fn("demo::heartbeat", move || {
        let n = b.fetch_add(1, Ordering::SeqCst) + 1;
        info!(n, "heartbeat");
        Ok(())
    })?;
    scheduler.add_descriptor(CallbackDescriptor::fixed_rate(
        now + Duration::from_millis(150),
        heartbeat,
        250,
        TimeUnit::Milliseconds,
    ))?;

    let deadline = Instant::now() + Duration::from_secs(5);
    while reminders.sent.load(Ordering::SeqCst) < 4 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(50));
    }
    std::thread::sleep(Duration::from_millis(300));

    let stats = service.pool().stats();
    info!(
        sent = reminders.sent.load(Ordering::SeqCst),
        heartbeats = beats.load(Ordering::SeqCst),
        executed = stats.executed,
        failed = stats.failed,
        "done"
    );

    if !service.shutdown() {
        anyhow::bail!("pool did not terminate");
    }
    Ok(())
}
