use chrono::Local;
use std::sync::Arc;
use std::time::Duration;

use super::cycle::CycleState;
use super::queue::WorkQueue;
use super::reconcile::process_feed;
use crate::feed::FeedFetcher;
use crate::storage::{Connection, Database, DatabaseError, Feed};

/// One member of the refresh pool.
///
/// A worker owns its storage connection for its whole life. The connection
/// is acquired on first use, so an idle worker holds nothing.
pub(crate) struct Worker<F> {
    id: usize,
    db: Database,
    conn: Option<Connection>,
    fetcher: Arc<F>,
    queue: Arc<WorkQueue>,
    cycle: Arc<CycleState>,
    queue_wait: Duration,
}

impl<F: FeedFetcher> Worker<F> {
    pub(crate) fn new(
        id: usize,
        db: Database,
        fetcher: Arc<F>,
        queue: Arc<WorkQueue>,
        cycle: Arc<CycleState>,
        queue_wait: Duration,
    ) -> Self {
        Self {
            id,
            db,
            conn: None,
            fetcher,
            queue,
            cycle,
            queue_wait,
        }
    }

    /// Refresh queued feeds until the cycle ends.
    ///
    /// The cycle flag is checked between queue waits, so a worker exits at
    /// most one `queue_wait` (plus any in-flight feed) after the cycle stops.
    pub(crate) async fn run(mut self) {
        tracing::debug!(worker = self.id, "Worker started");

        while self.cycle.is_active() {
            let Some(feed) = self.queue.pop_timeout(self.queue_wait).await else {
                continue;
            };
            self.refresh_feed(&feed).await;
        }

        tracing::debug!(worker = self.id, "Worker stopped");
    }

    /// Fetch one feed, store its new episodes and stamp its refresh time.
    ///
    /// Every failure is logged and swallowed. A feed whose fetch fails keeps
    /// its old timestamp so it stays due.
    async fn refresh_feed(&mut self, feed: &Feed) {
        tracing::debug!(worker = self.id, feed_id = feed.id, url = %feed.url, "Refreshing feed");

        let parsed = match self.fetcher.fetch(&feed.url).await {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(
                    worker = self.id,
                    feed_id = feed.id,
                    url = %feed.url,
                    error = %e,
                    "Failed to fetch feed"
                );
                return;
            }
        };

        let id = self.id;
        let conn = match self.connection().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!(worker = id, error = %e, "Failed to acquire database connection");
                return;
            }
        };

        match process_feed(conn, feed, &parsed).await {
            Ok(added) if !added.is_empty() => {
                tracing::info!(
                    worker = id,
                    feed_id = feed.id,
                    title = %feed.title,
                    new_episodes = added.len(),
                    "Found new episodes"
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(
                    worker = id,
                    feed_id = feed.id,
                    error = %e,
                    "Failed to load known episodes"
                );
                return;
            }
        }

        if let Err(e) = conn.feed_set_refresh(feed.id, Local::now()).await {
            tracing::error!(
                worker = id,
                feed_id = feed.id,
                error = %e,
                "Failed to update feed refresh time"
            );
        }
    }

    async fn connection(&mut self) -> Result<&mut Connection, DatabaseError> {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => self.db.connection().await?,
        };
        Ok(self.conn.insert(conn))
    }
}
