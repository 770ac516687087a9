use chrono::{DateTime, Local, Utc};
use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds a lock on the database file
    #[error("The database is locked by another process. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_error(&err.to_string()) {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }
}

/// SQLITE_BUSY (5), SQLITE_LOCKED (6) and SQLITE_CANTOPEN (14) all surface
/// as one of these messages.
pub(crate) fn is_lock_error(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
        || message.contains("unable to open database file")
}

/// Convert stored Unix seconds into local calendar time.
///
/// Out-of-range values collapse to the epoch rather than failing the row.
pub(crate) fn local_from_unix(secs: i64) -> DateTime<Local> {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .unwrap_or_default()
        .with_timezone(&Local)
}

/// The Unix epoch in local time, used for "never refreshed" and for
/// entries without a publish time.
pub fn epoch() -> DateTime<Local> {
    local_from_unix(0)
}

// ============================================================================
// Data Structures
// ============================================================================

/// A subscribed podcast feed.
///
/// `id == 0` means the record has not been stored yet. Both `url` and
/// `folder` are unique across all feeds.
#[derive(Debug, Clone, PartialEq)]
pub struct Feed {
    pub id: i64,
    /// Source locator the feed document is fetched from
    pub url: String,
    pub homepage: String,
    pub title: String,
    pub description: String,
    pub cover_url: String,
    pub last_refresh: DateTime<Local>,
    pub autorefresh: bool,
    /// Destination folder for downloaded media
    pub folder: PathBuf,
}

impl Feed {
    /// Time elapsed since the feed was last refreshed.
    pub fn age(&self) -> chrono::Duration {
        Local::now() - self.last_refresh
    }
}

/// One downloadable item of a feed, keyed uniquely by its enclosure URL.
#[derive(Debug, Clone, PartialEq)]
pub struct Episode {
    pub id: i64,
    pub feed_id: i64,
    /// Best-effort episode number, 0 if unknown
    pub number: i64,
    pub title: String,
    /// Enclosure URL (the de-duplication key)
    pub url: String,
    pub published: DateTime<Local>,
    /// Secondary link, usually the episode's web page. Empty if absent.
    pub link: String,
    pub mime_type: String,
    /// Playback position in seconds
    pub cur_pos: i64,
    pub finished: bool,
    pub path: PathBuf,
    /// Exempt from cleanup
    pub keep: bool,
    pub description: String,
}

// ============================================================================
// Row Types
// ============================================================================

/// Internal row type for feed queries (used by sqlx FromRow)
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeedRow {
    pub id: i64,
    pub url: String,
    pub homepage: String,
    pub title: String,
    pub description: String,
    pub cover_url: String,
    pub last_refresh: i64,
    pub autorefresh: bool,
    pub folder: String,
}

impl FeedRow {
    pub(crate) fn into_feed(self) -> Feed {
        Feed {
            id: self.id,
            url: self.url,
            homepage: self.homepage,
            title: self.title,
            description: self.description,
            cover_url: self.cover_url,
            last_refresh: local_from_unix(self.last_refresh),
            autorefresh: self.autorefresh,
            folder: PathBuf::from(self.folder),
        }
    }
}

/// Internal row type for episode queries (used by sqlx FromRow)
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct EpisodeRow {
    pub id: i64,
    pub feed_id: i64,
    pub number: i64,
    pub title: String,
    pub url: String,
    pub published: i64,
    pub link: String,
    pub mime: String,
    pub cur_pos: i64,
    pub finished: bool,
    pub path: String,
    pub keep: bool,
    pub description: String,
}

impl EpisodeRow {
    pub(crate) fn into_episode(self) -> Episode {
        Episode {
            id: self.id,
            feed_id: self.feed_id,
            number: self.number,
            title: self.title,
            url: self.url,
            published: local_from_unix(self.published),
            link: self.link,
            mime_type: self.mime,
            cur_pos: self.cur_pos,
            finished: self.finished,
            path: PathBuf::from(self.path),
            keep: self.keep,
            description: self.description,
        }
    }
}
