//! Concurrent writer stress.
//!
//! Several threads, each with its own handle on one path, commit
//! transactions against the same store. Writers serialize on the store's
//! writer gate; a writer that waits longer than its busy timeout counts
//! as a failed operation.

use keepdb_core::{Config, CoreError, Realm, UpdateMode, Values};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Transactions attempted.
    pub total_ops: usize,
    /// Transactions committed.
    pub successful_ops: usize,
    /// Transactions that failed, mostly on the busy timeout.
    pub failed_ops: usize,
    /// Wall-clock duration.
    pub duration: Duration,
}

impl StressTestResult {
    fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        Self {
            total_ops: successful + failed,
            successful_ops: successful,
            failed_ops: failed,
            duration,
        }
    }

    /// Committed transactions per second.
    pub fn ops_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.successful_ops as f64 / secs
        } else {
            0.0
        }
    }
}

/// Shape of a stress run.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Writer threads, one handle each.
    pub writers: usize,
    /// Transactions per writer.
    pub transactions_per_writer: usize,
    /// Objects created per transaction.
    pub objects_per_transaction: usize,
    /// Busy timeout of every handle.
    pub busy_timeout: Duration,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            writers: 4,
            transactions_per_writer: 25,
            objects_per_transaction: 4,
            busy_timeout: Duration::from_secs(10),
        }
    }
}

/// Runs `config.writers` threads creating `IntPrimaryObject`s with
/// disjoint keys in the store at `path`.
///
/// The store must already exist with the `IntPrimaryObject` type.
pub fn concurrent_writers(path: &Path, config: &StressConfig) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let handles: Vec<_> = (0..config.writers)
        .map(|writer| {
            let path = path.to_path_buf();
            let config = config.clone();
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            thread::spawn(move || {
                let realm = match Realm::open(
                    Config::new().path(path).busy_timeout(config.busy_timeout),
                ) {
                    Ok(realm) => realm,
                    Err(_) => {
                        failed.fetch_add(config.transactions_per_writer, Ordering::SeqCst);
                        return;
                    }
                };
                for txn in 0..config.transactions_per_writer {
                    let base = (writer * config.transactions_per_writer + txn)
                        * config.objects_per_transaction;
                    let outcome = realm.write(|r| {
                        for i in 0..config.objects_per_transaction {
                            let key = (base + i) as i64;
                            r.create(
                                "IntPrimaryObject",
                                Values::new()
                                    .with("primaryCol", key)
                                    .with("valueCol", format!("w{writer}")),
                                UpdateMode::Disallowed,
                            )?;
                        }
                        Ok(())
                    });
                    match outcome {
                        Ok(()) => successful.fetch_add(1, Ordering::SeqCst),
                        Err(_) => failed.fetch_add(1, Ordering::SeqCst),
                    };
                }
                realm.close();
            })
        })
        .collect();

    for handle in handles {
        if handle.join().is_err() {
            failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    StressTestResult::new(
        successful.load(Ordering::SeqCst),
        failed.load(Ordering::SeqCst),
        start.elapsed(),
    )
}

/// Counts how often a second handle hits the busy timeout while the first
/// holds a transaction open for `hold`.
pub fn busy_contention(realm: &Realm, second: &Realm, hold: Duration) -> usize {
    let mut busy = 0;
    if realm.begin_transaction().is_err() {
        return busy;
    }
    let deadline = Instant::now() + hold;
    while Instant::now() < deadline {
        match second.begin_transaction() {
            Err(CoreError::Busy { .. }) => busy += 1,
            Ok(()) => {
                let _ = second.cancel_transaction();
                break;
            }
            Err(_) => break,
        }
    }
    let _ = realm.cancel_transaction();
    busy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{int_primary, TestRealm};

    #[test]
    fn writers_serialize_without_losing_commits() {
        let test = TestRealm::with_schema([int_primary()]);
        let config = StressConfig {
            writers: 3,
            transactions_per_writer: 10,
            objects_per_transaction: 2,
            ..StressConfig::default()
        };
        let result = concurrent_writers(&test.path(), &config);
        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.successful_ops, 30);
        assert_eq!(test.objects("IntPrimaryObject").unwrap().len().unwrap(), 60);
    }

    #[test]
    fn second_handle_sees_busy_while_first_writes() {
        let test = TestRealm::with_schema([int_primary()]);
        let second = test
            .second_handle(Config::new().busy_timeout(Duration::from_millis(5)))
            .unwrap();
        let busy = busy_contention(&test, &second, Duration::from_millis(30));
        assert!(busy >= 1);
        second.close();
    }
}
