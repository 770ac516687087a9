//! Feed retrieval for the podcast aggregator.
//!
//! - [`parser`] - reduces RSS/Atom documents (via `feed-rs`) to [`ParsedFeed`]
//! - [`fetcher`] - the [`FeedFetcher`] seam and its HTTP implementation
//! - [`subscribe`] - registers a new feed after a one-time fetch
//!
//! # Example
//!
//! ```ignore
//! use podroll::feed::{subscribe, HttpFetcher};
//!
//! let fetcher = HttpFetcher::new(Duration::from_secs(30))?;
//! let feed = subscribe(&db, &fetcher, "https://example.com/podcast.xml", &downloads).await?;
//! ```

mod fetcher;
mod parser;
mod subscribe;

pub use fetcher::{FeedFetcher, FetchError, HttpFetcher};
pub use parser::{parse_feed, EntryLink, ParsedEntry, ParsedFeed, ENCLOSURE_REL};
pub use subscribe::{subscribe, SubscribeError};
