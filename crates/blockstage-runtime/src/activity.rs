//! Counter of in-flight background work (runs, scheduled continuations)

use std::sync::Arc;
use tokio::sync::watch;

/// Shared counter of outstanding work items
#[derive(Debug, Clone)]
pub struct ActivityTracker {
    tx: Arc<watch::Sender<usize>>,
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    /// Register one work item; it ends when the guard is dropped
    pub fn begin(&self) -> ActivityGuard {
        self.tx.send_modify(|count| *count += 1);
        ActivityGuard {
            tx: Arc::clone(&self.tx),
        }
    }

    pub fn pending(&self) -> usize {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.tx.subscribe()
    }
}

/// Marks one outstanding work item
#[derive(Debug)]
pub struct ActivityGuard {
    tx: Arc<watch::Sender<usize>>,
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        self.tx.send_modify(|count| *count = count.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guards_count_outstanding_work() {
        let tracker = ActivityTracker::new();
        let first = tracker.begin();
        let second = tracker.begin();
        assert_eq!(tracker.pending(), 2);
        drop(first);
        assert_eq!(tracker.pending(), 1);
        drop(second);
        assert_eq!(tracker.pending(), 0);
    }

    #[tokio::test]
    async fn test_guard_released_when_task_panics() {
        let tracker = ActivityTracker::new();
        let guard = tracker.begin();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            panic!("engine exploded");
        });
        assert!(handle.await.is_err());
        assert_eq!(tracker.pending(), 0);
    }
}
