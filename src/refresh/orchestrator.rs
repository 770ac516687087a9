use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use super::cycle::CycleState;
use super::queue::WorkQueue;
use super::worker::Worker;
use crate::config::Config;
use crate::feed::FeedFetcher;
use crate::storage::{Database, DatabaseError};

/// How a refresh cycle is run.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshOptions {
    /// Number of workers per cycle
    pub pool_size: usize,
    /// How long a worker waits on an empty queue before re-checking the cycle
    pub queue_wait: Duration,
    /// How often the orchestrator checks whether the queue has drained
    pub poll_interval: Duration,
}

impl RefreshOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            pool_size: config.workers.unwrap_or_else(default_pool_size).max(1),
            queue_wait: Duration::from_secs(config.queue_wait_secs.max(1)),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// One worker per available hardware thread, at least one.
pub fn default_pool_size() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Runs refresh cycles over every auto-refresh feed.
///
/// At most one cycle runs at a time. A cycle spawns `pool_size` workers,
/// queues the due feeds, waits for the queue to drain, then stops and joins
/// the workers before returning.
///
/// The database pool should allow `pool_size + 1` connections: one per
/// worker plus one for listing due feeds.
pub struct Orchestrator<F> {
    db: Database,
    fetcher: Arc<F>,
    options: RefreshOptions,
    cycle: Arc<CycleState>,
    queue: Arc<WorkQueue>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<F: FeedFetcher> Orchestrator<F> {
    pub fn new(db: Database, fetcher: Arc<F>, options: RefreshOptions) -> Self {
        Self {
            db,
            fetcher,
            options,
            cycle: Arc::new(CycleState::new()),
            queue: Arc::new(WorkQueue::new()),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Whether a cycle is running right now.
    pub fn is_active(&self) -> bool {
        self.cycle.is_active()
    }

    /// Workers spawned by the running cycle, 0 between cycles.
    pub fn worker_count(&self) -> usize {
        self.lock_workers().len()
    }

    /// Feeds still waiting for a worker.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// End the running cycle early.
    ///
    /// Workers finish the feed they are on and exit. Feeds still queued are
    /// dropped and stay due for the next cycle.
    pub fn stop(&self) {
        if self.cycle.is_active() {
            tracing::info!("Stopping refresh cycle");
        }
        self.cycle.stop();
    }

    /// Run one refresh cycle over all auto-refresh feeds.
    ///
    /// Returns once the cycle is over and every worker has exited. If a
    /// cycle is already running this logs and returns immediately; nothing
    /// is queued twice.
    ///
    /// Dropping the returned future ends the cycle: workers are aborted,
    /// queued feeds are dropped and the next call starts a fresh cycle.
    pub async fn refresh_all(&self) {
        if !self.cycle.start() {
            tracing::info!("Refresh already in progress, not starting another cycle");
            return;
        }
        let _guard = CycleGuard { orchestrator: self };

        let started = Instant::now();
        tracing::info!(workers = self.options.pool_size, "Starting refresh cycle");

        self.spawn_workers();

        match self.enqueue_due_feeds().await {
            Ok(queued) => tracing::info!(feeds = queued, "Queued feeds for refresh"),
            Err(e) => tracing::error!(error = %e, "Failed to list feeds due for refresh"),
        }

        while self.cycle.is_active() && !self.queue.is_empty() {
            tokio::time::sleep(self.options.poll_interval).await;
        }

        self.cycle.stop();
        self.join_workers().await;

        let dropped = self.queue.clear();
        if dropped > 0 {
            tracing::info!(feeds = dropped, "Cycle stopped with feeds still queued");
        }

        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Refresh cycle finished"
        );
    }

    fn spawn_workers(&self) {
        let mut workers = self.lock_workers();
        for id in 0..self.options.pool_size.max(1) {
            let worker = Worker::new(
                id,
                self.db.clone(),
                self.fetcher.clone(),
                self.queue.clone(),
                self.cycle.clone(),
                self.options.queue_wait,
            );
            workers.push(tokio::spawn(worker.run()));
        }
    }

    async fn enqueue_due_feeds(&self) -> Result<usize, DatabaseError> {
        let feeds = {
            let mut conn = self.db.connection().await?;
            conn.feed_get_autorefresh().await?
        };

        let count = feeds.len();
        for feed in feeds {
            tracing::debug!(feed_id = feed.id, title = %feed.title, "Queue feed");
            self.queue.push(feed);
        }
        Ok(count)
    }

    async fn join_workers(&self) {
        let handles = std::mem::take(&mut *self.lock_workers());
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Refresh worker terminated abnormally");
            }
        }
    }

    fn lock_workers(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Ends the cycle when `refresh_all` finishes or is cancelled.
struct CycleGuard<'a, F> {
    orchestrator: &'a Orchestrator<F>,
}

impl<F> Drop for CycleGuard<'_, F> {
    fn drop(&mut self) {
        let orchestrator = self.orchestrator;
        orchestrator.cycle.stop();

        let handles = std::mem::take(
            &mut *orchestrator
                .workers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        if !handles.is_empty() {
            tracing::warn!(workers = handles.len(), "Refresh cycle cancelled, aborting workers");
            for handle in handles {
                handle.abort();
            }
        }
        orchestrator.queue.clear();
    }
}
