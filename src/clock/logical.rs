// Lamport logical clock
//
// Strictly increasing within a node. Outbound messages carry the sender's
// post-increment value; on receive the counter merges to
// max(local, observed) + 1 before the message is dispatched.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct LogicalClock {
    counter: AtomicU64,
}

impl LogicalClock {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    /// Current value without advancing.
    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }

    /// Advance by one and return the new value. Called for every outbound
    /// message.
    pub fn tick(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Merge an observed remote value: counter becomes
    /// max(counter, observed) + 1. Returns the merged value.
    pub fn merge(&self, observed: u64) -> u64 {
        let mut current = self.counter.load(Ordering::SeqCst);
        loop {
            let next = current.max(observed) + 1;
            match self.counter.compare_exchange(
                current,
                next,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }
}
