//! SQLite storage for feeds and episodes.
//!
//! [`Database`] owns the connection pool; every query runs on a
//! [`Connection`] so callers decide how long they keep one.

mod episodes;
mod feeds;
mod schema;
mod types;

pub use schema::{Connection, Database};
pub use types::{epoch, DatabaseError, Episode, Feed};
