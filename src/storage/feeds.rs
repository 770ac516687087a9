use chrono::{DateTime, Local};
use sqlx::Connection as _;

use super::schema::Connection;
use super::types::{DatabaseError, Feed, FeedRow};

const FEED_COLUMNS: &str =
    "id, url, homepage, title, description, cover_url, last_refresh, autorefresh, folder";

impl Connection {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Insert a new feed and store the assigned id in `feed.id`.
    ///
    /// The feed's `last_refresh` is written as given (new feeds start at the
    /// epoch). Fails with a unique-constraint error if the URL or folder is
    /// already taken.
    pub async fn feed_add(&mut self, feed: &mut Feed) -> Result<(), DatabaseError> {
        let mut tx = self.raw().begin().await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO feed (url, homepage, title, description, cover_url, last_refresh, autorefresh, folder)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
        "#,
        )
        .bind(&feed.url)
        .bind(&feed.homepage)
        .bind(&feed.title)
        .bind(&feed.description)
        .bind(&feed.cover_url)
        .bind(feed.last_refresh.timestamp())
        .bind(feed.autorefresh)
        .bind(feed.folder.to_string_lossy().as_ref())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        feed.id = id;

        tracing::debug!(feed_id = id, url = %feed.url, "Added feed");
        Ok(())
    }

    /// Get all feeds, ordered by title
    pub async fn feed_get_all(&mut self) -> Result<Vec<Feed>, DatabaseError> {
        let rows = sqlx::query_as::<_, FeedRow>(&format!(
            "SELECT {} FROM feed ORDER BY title, id",
            FEED_COLUMNS
        ))
        .fetch_all(self.raw())
        .await?;

        Ok(rows.into_iter().map(FeedRow::into_feed).collect())
    }

    /// Look up a single feed by id
    pub async fn feed_get_by_id(&mut self, feed_id: i64) -> Result<Option<Feed>, DatabaseError> {
        let row = sqlx::query_as::<_, FeedRow>(&format!(
            "SELECT {} FROM feed WHERE id = ?",
            FEED_COLUMNS
        ))
        .bind(feed_id)
        .fetch_optional(self.raw())
        .await?;

        Ok(row.map(FeedRow::into_feed))
    }

    /// Feeds due for refresh: every feed with auto-refresh enabled, in id order.
    pub async fn feed_get_autorefresh(&mut self) -> Result<Vec<Feed>, DatabaseError> {
        let rows = sqlx::query_as::<_, FeedRow>(&format!(
            "SELECT {} FROM feed WHERE autorefresh <> 0 ORDER BY id",
            FEED_COLUMNS
        ))
        .fetch_all(self.raw())
        .await?;

        Ok(rows.into_iter().map(FeedRow::into_feed).collect())
    }

    /// Enable or disable automatic refresh for a feed
    pub async fn feed_set_autorefresh(
        &mut self,
        feed_id: i64,
        autorefresh: bool,
    ) -> Result<(), DatabaseError> {
        let mut tx = self.raw().begin().await?;
        sqlx::query("UPDATE feed SET autorefresh = ? WHERE id = ?")
            .bind(autorefresh)
            .bind(feed_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Stamp a feed's last-refresh time
    pub async fn feed_set_refresh(
        &mut self,
        feed_id: i64,
        stamp: DateTime<Local>,
    ) -> Result<(), DatabaseError> {
        let mut tx = self.raw().begin().await?;
        sqlx::query("UPDATE feed SET last_refresh = ? WHERE id = ?")
            .bind(stamp.timestamp())
            .bind(feed_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Delete a feed together with its episodes.
    ///
    /// Administrative only; the refresh cycle never deletes anything.
    pub async fn feed_delete(&mut self, feed_id: i64) -> Result<(), DatabaseError> {
        let mut tx = self.raw().begin().await?;
        sqlx::query("DELETE FROM episode WHERE feed_id = ?")
            .bind(feed_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM feed WHERE id = ?")
            .bind(feed_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(feed_id, "Deleted feed");
        Ok(())
    }
}
