use std::path::Path;
use thiserror::Error;

use crate::feed::fetcher::{FeedFetcher, FetchError};
use crate::storage::{epoch, Database, DatabaseError, Feed};
use crate::util::{sanitize_filename, validate_url, UrlValidationError};

/// Errors that can occur while registering a new feed.
#[derive(Debug, Error)]
pub enum SubscribeError {
    #[error(transparent)]
    InvalidUrl(#[from] UrlValidationError),
    #[error("Failed to load feed: {0}")]
    Fetch(#[from] FetchError),
    /// The document has no title to name the feed and its folder after
    #[error("Feed has no title")]
    MissingTitle,
    /// Storage failure, including a URL or folder that is already registered
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Register a new feed.
///
/// Fetches the document once to fill in the feed's metadata, then stores
/// it with auto-refresh disabled and a last-refresh time of the epoch.
/// Media for the feed goes into a folder under `download_root` named after
/// the feed title.
///
/// # Errors
///
/// Fails if the URL is not http(s), the fetch fails, the document has no
/// title, or the URL or folder is already taken by another feed.
pub async fn subscribe<F: FeedFetcher>(
    db: &Database,
    fetcher: &F,
    url: &str,
    download_root: &Path,
) -> Result<Feed, SubscribeError> {
    let url = validate_url(url)?;
    tracing::info!(url = %url, "Add feed");

    let parsed = fetcher.fetch(url.as_str()).await.map_err(|e| {
        tracing::error!(url = %url, error = %e, "Error trying to load podcast");
        e
    })?;

    let title = parsed
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or(SubscribeError::MissingTitle)?;
    let folder = download_root.join(sanitize_filename(&title));

    tracing::debug!(
        title = %title,
        folder = %folder.display(),
        "Episodes will be saved in feed folder"
    );

    let mut feed = Feed {
        id: 0,
        url: url.to_string(),
        homepage: parsed.link.unwrap_or_default(),
        title,
        description: parsed.description.unwrap_or_default(),
        cover_url: parsed.image.unwrap_or_default(),
        last_refresh: epoch(),
        autorefresh: false,
        folder,
    };

    let mut conn = db.connection().await?;
    conn.feed_add(&mut feed).await?;

    Ok(feed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::HttpFetcher;
    use std::time::Duration;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SHOW_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>Sternengeschichten</title>
    <link>https://www.example.com/</link>
    <description>Geschichten über Sterne</description>
    <image><url>https://static.example.com/cover.jpg</url><title>x</title><link>https://www.example.com/</link></image>
</channel></rss>"#;

    async fn serve(body: &str) -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&mock_server)
            .await;
        mock_server
    }

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_subscribe_populates_metadata() {
        let server = serve(SHOW_RSS).await;
        let db = Database::open(":memory:", 2).await.unwrap();
        let url = format!("{}/feed", server.uri());

        let feed = subscribe(&db, &fetcher(), &url, Path::new("/data/downloads"))
            .await
            .unwrap();

        assert!(feed.id > 0);
        assert_eq!(feed.url, url);
        assert_eq!(feed.title, "Sternengeschichten");
        assert_eq!(feed.homepage, "https://www.example.com/");
        assert_eq!(feed.description, "Geschichten über Sterne");
        assert_eq!(feed.cover_url, "https://static.example.com/cover.jpg");
        assert_eq!(feed.last_refresh, epoch());
        assert!(!feed.autorefresh);
        assert_eq!(
            feed.folder,
            Path::new("/data/downloads").join("Sternengeschichten")
        );

        let mut conn = db.connection().await.unwrap();
        let stored = conn.feed_get_by_id(feed.id).await.unwrap().unwrap();
        assert_eq!(stored, feed);
    }

    #[tokio::test]
    async fn test_subscribe_twice_fails() {
        let server = serve(SHOW_RSS).await;
        let db = Database::open(":memory:", 2).await.unwrap();
        let url = format!("{}/feed", server.uri());

        subscribe(&db, &fetcher(), &url, Path::new("/data"))
            .await
            .unwrap();
        let again = subscribe(&db, &fetcher(), &url, Path::new("/data")).await;
        assert!(matches!(again, Err(SubscribeError::Database(_))));
    }

    #[tokio::test]
    async fn test_subscribe_untitled_feed_fails() {
        let server = serve(r#"<rss version="2.0"><channel></channel></rss>"#).await;
        let db = Database::open(":memory:", 2).await.unwrap();

        let result = subscribe(
            &db,
            &fetcher(),
            &format!("{}/feed", server.uri()),
            Path::new("/data"),
        )
        .await;
        assert!(matches!(result, Err(SubscribeError::MissingTitle)));
    }

    #[tokio::test]
    async fn test_subscribe_rejects_bad_url() {
        let db = Database::open(":memory:", 2).await.unwrap();
        let result = subscribe(&db, &fetcher(), "ftp://example.com/feed", Path::new("/data")).await;
        assert!(matches!(result, Err(SubscribeError::InvalidUrl(_))));
    }
}
