//! Scoped background tasks for session timers and pumps
//!
//! A [`ScopedTask`] aborts its task when dropped, so replacing the
//! `Option<ScopedTask>` that holds a timer cancels the previous instance.

use std::ops::ControlFlow;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// A spawned task tied to the lifetime of this handle
///
/// `id` lets a callback that already woke up tell whether it is still the
/// current instance: aborting only takes effect at the next await point.
#[derive(Debug)]
pub struct ScopedTask {
    id: u64,
    handle: JoinHandle<()>,
}

impl ScopedTask {
    pub fn new(id: u64, handle: JoinHandle<()>) -> Self {
        Self { id, handle }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScopedTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Run `fire` once after `delay`
pub fn after<F>(id: u64, delay: Duration, fire: F) -> ScopedTask
where
    F: FnOnce() + Send + 'static,
{
    let handle = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        fire();
    });
    ScopedTask::new(id, handle)
}

/// Run `tick` every `period` (first tick one period from now) until it breaks
pub fn every<F>(id: u64, period: Duration, mut tick: F) -> ScopedTask
where
    F: FnMut() -> ControlFlow<()> + Send + 'static,
{
    let handle = tokio::spawn(async move {
        let start = tokio::time::Instant::now() + period;
        let mut interval = tokio::time::interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if tick().is_break() {
                break;
            }
        }
    });
    ScopedTask::new(id, handle)
}
