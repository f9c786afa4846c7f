//! Completion signaling between the interrupt/DMA path and the caller.
//!
//! A single-slot channel: the calling thread empties the slot before a
//! transaction is issued and then blocks on it; the transport's
//! interrupt/DMA path is the only signaler. The producer side stores an
//! outcome and wakes one waiter - it never allocates and never blocks
//! beyond the slot lock, so it is safe to call from callback context.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::error::IoError;

/// Outcome of a transaction as reported by the interrupt/DMA path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The transfer completed.
    Ok,
    /// The hardware path reported a fault.
    Error,
}

#[derive(Default)]
struct Slot {
    outcome: Mutex<Option<Outcome>>,
    ready: Condvar,
}

fn lock(slot: &Mutex<Option<Outcome>>) -> MutexGuard<'_, Option<Outcome>> {
    // A poisoned lock only means a panicking test thread; the slot state
    // itself is always valid.
    slot.lock().unwrap_or_else(|e| e.into_inner())
}

/// Waiter side of the completion signal. One per device.
pub(crate) struct Completion {
    slot: Arc<Slot>,
}

impl Completion {
    pub(crate) fn new() -> Self {
        Self {
            slot: Arc::new(Slot::default()),
        }
    }

    /// Handle for the transport's interrupt/DMA path.
    pub(crate) fn notifier(&self) -> Notifier {
        Notifier {
            slot: Arc::clone(&self.slot),
        }
    }

    /// Empty the slot. Called before each transaction is issued.
    pub(crate) fn reset(&self) {
        *lock(&self.slot.outcome) = None;
    }

    /// Block until the notifier fires or the timeout expires.
    ///
    /// This is the calling thread's single suspension point per
    /// transaction.
    pub(crate) fn wait(&self, timeout: Duration) -> Result<(), IoError> {
        let deadline = Instant::now() + timeout;
        let mut outcome = lock(&self.slot.outcome);
        loop {
            if let Some(outcome) = outcome.take() {
                return match outcome {
                    Outcome::Ok => Ok(()),
                    Outcome::Error => Err(IoError::Bus),
                };
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(IoError::Timeout);
            }
            outcome = self
                .slot
                .ready
                .wait_timeout(outcome, deadline - now)
                .unwrap_or_else(|e| e.into_inner())
                .0;
        }
    }
}

/// Handle through which the transport's interrupt/DMA path reports the
/// outcome of the transaction in flight.
#[derive(Clone)]
pub struct Notifier {
    slot: Arc<Slot>,
}

impl Notifier {
    /// Record the outcome and wake the waiting thread.
    pub fn complete(&self, outcome: Outcome) {
        *lock(&self.slot.outcome) = Some(outcome);
        self.slot.ready.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn wake_from_other_thread() {
        let completion = Completion::new();
        let notifier = completion.notifier();

        completion.reset();
        let signaler = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            notifier.complete(Outcome::Ok);
        });

        assert_eq!(completion.wait(Duration::from_secs(5)), Ok(()));
        signaler.join().unwrap();
    }

    #[test]
    fn error_outcome_maps_to_bus_error() {
        let completion = Completion::new();
        completion.reset();
        completion.notifier().complete(Outcome::Error);
        assert_eq!(completion.wait(Duration::from_secs(1)), Err(IoError::Bus));
    }

    #[test]
    fn completion_before_wait_is_retained() {
        // The signal may fire between issue and wait; the slot must keep
        // the outcome until the waiter consumes it.
        let completion = Completion::new();
        completion.reset();
        completion.notifier().complete(Outcome::Ok);
        assert_eq!(completion.wait(Duration::from_millis(1)), Ok(()));
    }

    #[test]
    fn missing_completion_times_out() {
        let completion = Completion::new();
        completion.reset();
        assert_eq!(
            completion.wait(Duration::from_millis(20)),
            Err(IoError::Timeout)
        );
    }

    #[test]
    fn reset_discards_stale_outcome() {
        let completion = Completion::new();
        completion.notifier().complete(Outcome::Error);
        completion.reset();
        assert_eq!(
            completion.wait(Duration::from_millis(10)),
            Err(IoError::Timeout)
        );
    }
}
