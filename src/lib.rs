//! Podcast feed aggregator core.
//!
//! Subscribed feeds live in a SQLite database ([`storage`]). A refresh
//! cycle ([`refresh::Orchestrator`]) fetches every auto-refresh feed on a
//! pool of workers ([`feed`]) and records episodes it hasn't seen before.

pub mod config;
pub mod feed;
pub mod logging;
pub mod refresh;
pub mod storage;
pub mod util;
