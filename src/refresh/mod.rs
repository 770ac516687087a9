//! Concurrent refresh of subscribed feeds.
//!
//! A refresh cycle is run by the [`Orchestrator`]: it marks the cycle active
//! in a [`CycleState`], spawns a pool of workers, fills a [`WorkQueue`] with
//! every auto-refresh feed, and waits until the queue drains.
//!
//! Each worker pops a feed, fetches it through a [`FeedFetcher`](crate::feed::FeedFetcher),
//! hands the document to [`process_feed`] to store new episodes, and stamps
//! the feed's refresh time. Failures are per feed: they are logged and the
//! worker moves on.

mod cycle;
mod orchestrator;
mod queue;
mod reconcile;
mod worker;

pub use cycle::CycleState;
pub use orchestrator::{default_pool_size, Orchestrator, RefreshOptions};
pub use queue::WorkQueue;
pub use reconcile::{episode_number, extension_for_mime, process_feed, reconcile, DEFAULT_MIME_TYPE};
