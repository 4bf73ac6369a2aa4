//! Single-writer gate shared by every handle on a store.

use crate::error::{CoreError, CoreResult};
use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Grants write access to one handle at a time.
///
/// A handle that finds the gate taken waits until it is released or the
/// busy timeout passes, then fails with `Busy`.
#[derive(Debug, Default)]
pub struct WriterGate {
    owner: Mutex<Option<u64>>,
    released: Condvar,
}

impl WriterGate {
    /// An open gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the gate for `handle`, waiting up to `timeout`.
    ///
    /// # Errors
    ///
    /// Fails with `NestedTransaction` if `handle` already holds the gate,
    /// or `Busy` if another handle keeps it past the timeout.
    pub fn acquire(&self, handle: u64, timeout: Duration) -> CoreResult<()> {
        let start = Instant::now();
        let deadline = start + timeout;
        let mut owner = self.owner.lock();
        loop {
            match *owner {
                None => {
                    *owner = Some(handle);
                    return Ok(());
                }
                Some(current) if current == handle => return Err(CoreError::NestedTransaction),
                Some(_) => {
                    if self.released.wait_until(&mut owner, deadline).timed_out() && owner.is_some()
                    {
                        return Err(CoreError::Busy {
                            waited_ms: u64::try_from(start.elapsed().as_millis())
                                .unwrap_or(u64::MAX),
                        });
                    }
                }
            }
        }
    }

    /// Releases the gate if `handle` holds it.
    pub fn release(&self, handle: u64) {
        let mut owner = self.owner.lock();
        if *owner == Some(handle) {
            *owner = None;
            self.released.notify_one();
        }
    }

    /// The handle holding the gate.
    #[must_use]
    pub fn owner(&self) -> Option<u64> {
        *self.owner.lock()
    }
}
