//! Debounce timer for autosave

use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Pending timer with the generation it was armed under
#[derive(Debug, Default)]
struct TimerSlot {
    generation: u64,
    pending: Option<(u64, JoinHandle<()>)>,
}

/// Collapses bursts of edits into a single task run after a quiet window
///
/// At most one timer is armed at a time. Arming a new one aborts the previous
/// timer, and only a timer that is still current clears the slot when it fires.
/// The task itself is spawned separately once the timer expires, so cancelling a
/// later timer never interrupts a save that is already running.
#[derive(Debug)]
pub struct DebounceScheduler {
    quiet_period: Duration,
    slot: Arc<Mutex<TimerSlot>>,
}

impl DebounceScheduler {
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            slot: Arc::new(Mutex::new(TimerSlot::default())),
        }
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet_period
    }

    /// Cancel any pending timer and arm a new one that runs `task` after the quiet window
    pub fn schedule<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.slot.lock();

        if let Some((generation, handle)) = slot.pending.take() {
            handle.abort();
            tracing::trace!("Superseded autosave timer #{}", generation);
        }

        slot.generation += 1;
        let generation = slot.generation;
        let quiet_period = self.quiet_period;
        let timer_slot = Arc::clone(&self.slot);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(quiet_period).await;

            {
                let mut slot = timer_slot.lock();
                if matches!(slot.pending, Some((current, _)) if current == generation) {
                    slot.pending = None;
                }
            }

            tokio::spawn(task);
        });

        slot.pending = Some((generation, handle));
        tracing::trace!("Armed autosave timer #{} for {:?}", generation, quiet_period);
    }

    /// Abort the pending timer; returns whether one was armed
    pub fn cancel_pending(&self) -> bool {
        match self.slot.lock().pending.take() {
            Some((generation, handle)) => {
                handle.abort();
                tracing::trace!("Cancelled autosave timer #{}", generation);
                true
            }
            None => false,
        }
    }

    pub fn has_pending(&self) -> bool {
        self.slot.lock().pending.is_some()
    }
}

impl Drop for DebounceScheduler {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}
