//! Keyed call coalescer.
//!
//! The first caller for a key becomes the leader and runs the work; every
//! concurrent caller for the same key waits for the leader's published outcome
//! instead of repeating the work. The in-flight entry is cleared once the
//! outcome lands, so a later call for the same key starts fresh.
//!
//! Used by the schema registry to guarantee exactly one `CREATE TABLE` per
//! not-yet-existing metric regardless of how many writers race on it.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use tokio::sync::watch;

/// Outcome shared across coalesced callers. Errors travel as strings because
/// every waiter gets its own copy.
pub type Outcome = std::result::Result<(), String>;

#[derive(Default)]
pub struct SingleFlight {
    inflight: Mutex<HashMap<String, watch::Receiver<Option<Outcome>>>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` for `key`, coalescing with any in-flight call for the same
    /// key. All callers observe the same outcome.
    pub async fn run<F, Fut>(&self, key: &str, work: F) -> Outcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Outcome>,
    {
        let (leader_tx, mut rx) = {
            let mut inflight = self.inflight.lock();
            if let Some(rx) = inflight.get(key) {
                (None, rx.clone())
            } else {
                let (tx, rx) = watch::channel(None);
                inflight.insert(key.to_string(), rx.clone());
                (Some(tx), rx)
            }
        };

        match leader_tx {
            Some(tx) => {
                let outcome = work().await;
                // Clear the entry before publishing so late arrivals after the
                // broadcast start a new flight instead of reading a stale one.
                self.inflight.lock().remove(key);
                let _ = tx.send(Some(outcome.clone()));
                outcome
            }
            None => loop {
                if let Some(outcome) = rx.borrow_and_update().clone() {
                    return outcome;
                }
                if rx.changed().await.is_err() {
                    // Leader dropped without publishing (cancelled mid-flight).
                    return rx
                        .borrow()
                        .clone()
                        .unwrap_or_else(|| Err("in-flight call was abandoned".to_string()));
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_callers_share_one_execution() {
        let flight = Arc::new(SingleFlight::new());
        let executions = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let flight = flight.clone();
            let executions = executions.clone();
            handles.push(tokio::spawn(async move {
                flight
                    .run("key", || async {
                        executions.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(())
                    })
                    .await
            }));
        }

        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(executions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn followers_observe_leader_failure() {
        let flight = Arc::new(SingleFlight::new());

        let leader = {
            let flight = flight.clone();
            tokio::spawn(async move {
                flight
                    .run("key", || async {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Err("boom".to_string())
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let follower = flight.run("key", || async { Ok(()) }).await;

        assert_eq!(leader.await.unwrap(), Err("boom".to_string()));
        assert_eq!(follower, Err("boom".to_string()));
    }

    #[tokio::test]
    async fn completed_key_starts_a_new_flight() {
        let flight = SingleFlight::new();
        let first = flight.run("key", || async { Ok(()) }).await;
        let second = flight.run("key", || async { Err("second".to_string()) }).await;
        assert!(first.is_ok());
        assert_eq!(second, Err("second".to_string()));
    }
}
