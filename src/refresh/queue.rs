use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::storage::Feed;

/// FIFO of feeds waiting to be refreshed, shared by the orchestrator and
/// its workers.
#[derive(Debug, Default)]
pub struct WorkQueue {
    items: Mutex<VecDeque<Feed>>,
    available: Notify,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a feed and wake one waiting worker.
    pub fn push(&self, feed: Feed) {
        self.lock().push_back(feed);
        self.available.notify_one();
    }

    /// Take the next feed without waiting.
    pub fn try_pop(&self) -> Option<Feed> {
        self.lock().pop_front()
    }

    /// Take the next feed, waiting at most `wait` for one to arrive.
    ///
    /// Returns `None` on timeout so the caller can re-check whether it
    /// should keep going.
    pub async fn pop_timeout(&self, wait: Duration) -> Option<Feed> {
        let deadline = Instant::now() + wait;
        loop {
            // Register interest before checking, so a push between the
            // check and the wait is not missed.
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(feed) = self.try_pop() {
                return Some(feed);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop all pending feeds, returning how many there were.
    pub fn clear(&self) -> usize {
        let mut items = self.lock();
        let dropped = items.len();
        items.clear();
        dropped
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Feed>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::epoch;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn feed(id: i64) -> Feed {
        Feed {
            id,
            url: format!("https://example.com/{}.xml", id),
            homepage: String::new(),
            title: format!("Feed {}", id),
            description: String::new(),
            cover_url: String::new(),
            last_refresh: epoch(),
            autorefresh: true,
            folder: PathBuf::from(format!("/tmp/{}", id)),
        }
    }

    #[test]
    fn test_fifo_order() {
        let queue = WorkQueue::new();
        for id in 1..=3 {
            queue.push(feed(id));
        }
        assert_eq!(queue.len(), 3);

        let ids: Vec<i64> = std::iter::from_fn(|| queue.try_pop()).map(|f| f.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_pop_returns_queued_item_immediately() {
        let queue = WorkQueue::new();
        queue.push(feed(7));
        let got = queue.pop_timeout(Duration::from_secs(60)).await;
        assert_eq!(got.map(|f| f.id), Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pop_times_out_when_empty() {
        let queue = WorkQueue::new();
        let started = Instant::now();
        assert!(queue.pop_timeout(Duration::from_secs(3)).await.is_none());
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiting_pop_wakes_on_push() {
        let queue = Arc::new(WorkQueue::new());

        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop_timeout(Duration::from_secs(30)).await })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        queue.push(feed(42));

        let got = waiter.await.unwrap();
        assert_eq!(got.map(|f| f.id), Some(42));
    }

    #[test]
    fn test_clear_reports_dropped() {
        let queue = WorkQueue::new();
        queue.push(feed(1));
        queue.push(feed(2));
        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
    }
}
