use sqlx::Connection as _;

use super::schema::Connection;
use super::types::{DatabaseError, Episode, EpisodeRow};

const EPISODE_COLUMNS: &str = "id, feed_id, number, title, url, published, link, mime, \
                               cur_pos, finished, path, keep, description";

impl Connection {
    // ========================================================================
    // Episode Operations
    // ========================================================================

    /// Insert a new episode.
    ///
    /// Returns the assigned id (also written to `episode.id`), or `None` if
    /// storage rejected the row because its URL or path already exists.
    /// A rejection is not an error: concurrent refreshes and feeds that list
    /// the same enclosure twice both end up here.
    pub async fn episode_add(&mut self, episode: &mut Episode) -> Result<Option<i64>, DatabaseError> {
        let mut tx = self.raw().begin().await?;

        let inserted = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO episode (feed_id, number, title, url, published, link, mime,
                                 cur_pos, finished, path, keep, description)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
        "#,
        )
        .bind(episode.feed_id)
        .bind(episode.number)
        .bind(&episode.title)
        .bind(&episode.url)
        .bind(episode.published.timestamp())
        .bind(&episode.link)
        .bind(&episode.mime_type)
        .bind(episode.cur_pos)
        .bind(episode.finished)
        .bind(episode.path.to_string_lossy().as_ref())
        .bind(episode.keep)
        .bind(&episode.description)
        .fetch_one(&mut *tx)
        .await;

        // Dropping `tx` on the error paths rolls the insert back.
        let id = match inserted {
            Ok(id) => id,
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                tracing::debug!(
                    feed_id = episode.feed_id,
                    url = %episode.url,
                    error = %e,
                    "Episode rejected by uniqueness constraint"
                );
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        tx.commit().await?;
        episode.id = id;
        Ok(Some(id))
    }

    /// Get all episodes of a feed, newest first
    pub async fn episode_get_by_feed(&mut self, feed_id: i64) -> Result<Vec<Episode>, DatabaseError> {
        let rows = sqlx::query_as::<_, EpisodeRow>(&format!(
            "SELECT {} FROM episode WHERE feed_id = ? ORDER BY published DESC, id DESC",
            EPISODE_COLUMNS
        ))
        .bind(feed_id)
        .fetch_all(self.raw())
        .await?;

        Ok(rows.into_iter().map(EpisodeRow::into_episode).collect())
    }

    /// Get every stored episode, newest first
    pub async fn episode_get_all(&mut self) -> Result<Vec<Episode>, DatabaseError> {
        let rows = sqlx::query_as::<_, EpisodeRow>(&format!(
            "SELECT {} FROM episode ORDER BY published DESC, id DESC",
            EPISODE_COLUMNS
        ))
        .fetch_all(self.raw())
        .await?;

        Ok(rows.into_iter().map(EpisodeRow::into_episode).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::{epoch, local_from_unix};
    use crate::storage::{Database, Feed};
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    async fn conn_with_feed() -> (Connection, Feed) {
        let db = Database::open(":memory:", 2).await.unwrap();
        let mut conn = db.connection().await.unwrap();
        let mut feed = Feed {
            id: 0,
            url: "https://www.example.com/podcast.feed?audio=opus".into(),
            homepage: "https://www.example.com/".into(),
            title: "The Example Podcast".into(),
            description: String::new(),
            cover_url: String::new(),
            last_refresh: epoch(),
            autorefresh: true,
            folder: PathBuf::from("/tmp/podcast"),
        };
        conn.feed_add(&mut feed).await.unwrap();
        (conn, feed)
    }

    fn test_episode(feed: &Feed, n: i64) -> Episode {
        Episode {
            id: 0,
            feed_id: feed.id,
            number: n,
            title: format!("Episode {}", n),
            url: format!("https://cdn.example.com/ep{}.mp3", n),
            published: local_from_unix(1_700_000_000 + n * 86_400),
            link: format!("https://www.example.com/ep{}", n),
            mime_type: "audio/mpeg".into(),
            cur_pos: 0,
            finished: false,
            path: feed.folder.join(format!("Episode {}.mp3", n)),
            keep: false,
            description: "Test summary".into(),
        }
    }

    #[tokio::test]
    async fn test_episode_add_assigns_id() {
        let (mut conn, feed) = conn_with_feed().await;
        let mut ep = test_episode(&feed, 1);

        let id = conn.episode_add(&mut ep).await.unwrap();
        assert_eq!(id, Some(ep.id));
        assert!(ep.id > 0);

        let stored = conn.episode_get_by_feed(feed.id).await.unwrap();
        assert_eq!(stored, vec![ep]);
    }

    #[tokio::test]
    async fn test_episode_duplicate_url_is_rejected_not_failed() {
        let (mut conn, feed) = conn_with_feed().await;
        let mut first = test_episode(&feed, 1);
        conn.episode_add(&mut first).await.unwrap();

        let mut dup = test_episode(&feed, 2);
        dup.url = first.url.clone();
        assert_eq!(conn.episode_add(&mut dup).await.unwrap(), None);
        assert_eq!(dup.id, 0);

        // The connection stays usable after the rolled-back insert.
        let mut other = test_episode(&feed, 3);
        assert!(conn.episode_add(&mut other).await.unwrap().is_some());
        assert_eq!(conn.episode_get_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_episode_duplicate_path_is_rejected() {
        let (mut conn, feed) = conn_with_feed().await;
        let mut first = test_episode(&feed, 1);
        conn.episode_add(&mut first).await.unwrap();

        let mut dup = test_episode(&feed, 2);
        dup.path = first.path.clone();
        assert_eq!(conn.episode_add(&mut dup).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_episode_unknown_feed_is_an_error() {
        let (mut conn, feed) = conn_with_feed().await;
        let mut orphan = test_episode(&feed, 1);
        orphan.feed_id = feed.id + 100;

        // Foreign key violations are real failures, not duplicates.
        assert!(conn.episode_add(&mut orphan).await.is_err());
    }

    #[tokio::test]
    async fn test_episode_get_by_feed_newest_first() {
        let (mut conn, feed) = conn_with_feed().await;
        for n in 1..=3 {
            conn.episode_add(&mut test_episode(&feed, n)).await.unwrap();
        }

        let numbers: Vec<i64> = conn
            .episode_get_by_feed(feed.id)
            .await
            .unwrap()
            .iter()
            .map(|e| e.number)
            .collect();
        assert_eq!(numbers, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn test_feed_delete_removes_episodes() {
        let (mut conn, feed) = conn_with_feed().await;
        conn.episode_add(&mut test_episode(&feed, 1)).await.unwrap();

        conn.feed_delete(feed.id).await.unwrap();
        assert!(conn.episode_get_all().await.unwrap().is_empty());
    }
}
