// SPDX-License-Identifier: MIT OR Apache-2.0

// src/core/distributed/dispatch.rs

//! Data dispatch bookkeeping: how many dispatches are in flight, and which
//! member node receives which record.

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct TrackerInner {
    in_flight: AtomicUsize,
    idle: Notify,
}

/// Counts dispatch requests in flight so cleanup can wait for them to finish
#[derive(Debug, Clone, Default)]
pub struct DispatchTracker {
    inner: Arc<TrackerInner>,
}

/// Held for the duration of one dispatch
#[derive(Debug)]
pub struct DispatchGuard {
    inner: Arc<TrackerInner>,
}

impl DispatchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> DispatchGuard {
        self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
        DispatchGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Resolve once no dispatch is in flight
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        if self.inner.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}

/// Round-robin record placement with one cursor per set
#[derive(Debug, Default)]
pub struct RoundRobinPlacement {
    cursors: DashMap<String, usize>,
}

impl RoundRobinPlacement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split records across `nodes`, continuing from where the previous call
    /// for the same set stopped. Nodes that receive nothing are omitted.
    pub fn assign(
        &self,
        set_key: &str,
        nodes: &[String],
        records: Vec<Vec<u8>>,
    ) -> Vec<(String, Vec<Vec<u8>>)> {
        if nodes.is_empty() || records.is_empty() {
            return Vec::new();
        }
        let start = {
            let mut cursor = self.cursors.entry(set_key.to_string()).or_insert(0);
            let start = *cursor;
            *cursor = (start + records.len()) % nodes.len();
            start
        };

        let mut shares: Vec<Vec<Vec<u8>>> = vec![Vec::new(); nodes.len()];
        for (i, record) in records.into_iter().enumerate() {
            shares[(start + i) % nodes.len()].push(record);
        }
        nodes
            .iter()
            .cloned()
            .zip(shares)
            .filter(|(_, share)| !share.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_idle_returns_immediately_when_idle() {
        let tracker = DispatchTracker::new();
        tokio::time::timeout(Duration::from_millis(100), tracker.wait_idle())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_idle_waits_for_guards() {
        let tracker = DispatchTracker::new();
        let first = tracker.begin();
        let second = tracker.begin();
        assert_eq!(tracker.in_flight(), 2);

        let waiter = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.wait_idle().await })
        };
        drop(first);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(second);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn test_round_robin_continues_across_calls() {
        let placement = RoundRobinPlacement::new();
        let nodes = vec!["a".to_string(), "b".to_string(), "c".to_string()];

        let first = placement.assign("db:s", &nodes, vec![vec![1], vec![2]]);
        assert_eq!(
            first,
            vec![("a".to_string(), vec![vec![1]]), ("b".to_string(), vec![vec![2]])]
        );

        let second = placement.assign("db:s", &nodes, vec![vec![3], vec![4]]);
        assert_eq!(
            second,
            vec![("a".to_string(), vec![vec![4]]), ("c".to_string(), vec![vec![3]])]
        );

        // other sets keep their own cursor
        let other = placement.assign("db:t", &nodes, vec![vec![9]]);
        assert_eq!(other, vec![("a".to_string(), vec![vec![9]])]);
    }

    #[test]
    fn test_round_robin_without_nodes() {
        let placement = RoundRobinPlacement::new();
        assert!(placement.assign("db:s", &[], vec![vec![1]]).is_empty());
    }
}
