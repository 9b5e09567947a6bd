use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::error::{Error, ErrorKind};

/// Helper for tracking fuel consumption.
pub struct FuelTracker {
    initial: u64,
    remaining: AtomicI64,
}

impl FuelTracker {
    /// Creates a new fuel tracker.
    ///
    /// The fuel tracker is always wrapped in an `Arc` so that it can be
    /// shared across nested invocations of the template evaluation.
    pub fn new(fuel: u64) -> Arc<FuelTracker> {
        Arc::new(FuelTracker {
            initial: fuel,
            remaining: AtomicI64::new(fuel as i64),
        })
    }

    /// Tracks an evaluation step.  If it runs out of fuel an error is returned.
    pub fn track(&self) -> Result<(), Error> {
        let old_fuel = self.remaining.fetch_sub(1, Ordering::Relaxed);
        if old_fuel - 1 < 0 {
            return Err(Error::from(ErrorKind::OutOfFuel));
        }
        Ok(())
    }

    /// How much fuel was consumed so far.
    pub fn consumed(&self) -> u64 {
        self.initial.saturating_sub(self.remaining())
    }

    /// How much fuel is remaining.
    pub fn remaining(&self) -> u64 {
        self.remaining.load(Ordering::Relaxed).max(0) as u64
    }
}
