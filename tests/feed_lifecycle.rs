//! Integration tests for the feed lifecycle: subscribe, enable auto-refresh,
//! refresh over HTTP, delete.
//!
//! Feeds are served by a wiremock server and fetched with the real
//! `HttpFetcher`, so these cover the whole path from bytes on the wire to
//! rows in the database.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use podroll::feed::{subscribe, HttpFetcher, SubscribeError};
use podroll::refresh::{Orchestrator, RefreshOptions};
use podroll::storage::{epoch, Database};
use pretty_assertions::assert_eq;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PODCAST_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Late Night Radio</title>
    <link>https://radio.example.com/</link>
    <description>Talk after midnight</description>
    <item>
      <title>Episode 2: Owls</title>
      <link>https://radio.example.com/2</link>
      <description>All about owls</description>
      <pubDate>Tue, 14 Nov 2023 23:00:00 GMT</pubDate>
      <enclosure url="https://cdn.example.com/radio/2.mp3" type="audio/mpeg" length="100"/>
    </item>
    <item>
      <title>Episode 1: Bats</title>
      <link>https://radio.example.com/1</link>
      <pubDate>Tue, 07 Nov 2023 23:00:00 GMT</pubDate>
      <enclosure url="https://cdn.example.com/radio/1.ogg" type="audio/ogg" length="100"/>
    </item>
    <item>
      <title>Housekeeping</title>
      <link>https://radio.example.com/news</link>
    </item>
  </channel>
</rss>"#;

async fn serve(route: &str, body: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;
    server
}

fn fetcher() -> HttpFetcher {
    HttpFetcher::new(Duration::from_secs(5)).unwrap()
}

async fn file_db(dir: &tempfile::TempDir, connections: u32) -> Database {
    let path = dir.path().join("podroll.db");
    Database::open(path.to_str().unwrap(), connections).await.unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_subscribe_then_refresh_records_episodes() {
    let server = serve("/radio.xml", PODCAST_RSS).await;
    let dir = tempfile::tempdir().unwrap();
    let db = file_db(&dir, 3).await;
    let url = format!("{}/radio.xml", server.uri());

    let feed = subscribe(&db, &fetcher(), &url, Path::new("/media/podcasts"))
        .await
        .unwrap();
    assert_eq!(feed.title, "Late Night Radio");
    assert_eq!(feed.folder, Path::new("/media/podcasts/Late Night Radio"));

    // Subscribing alone stores no episodes and leaves the feed out of refreshes.
    let mut conn = db.connection().await.unwrap();
    assert!(conn.episode_get_by_feed(feed.id).await.unwrap().is_empty());
    assert!(conn.feed_get_autorefresh().await.unwrap().is_empty());

    conn.feed_set_autorefresh(feed.id, true).await.unwrap();
    let due = conn.feed_get_autorefresh().await.unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].id, feed.id);
    drop(conn);

    let options = RefreshOptions {
        pool_size: 2,
        queue_wait: Duration::from_millis(100),
        poll_interval: Duration::from_millis(20),
    };
    Orchestrator::new(db.clone(), Arc::new(fetcher()), options)
        .refresh_all()
        .await;

    let mut conn = db.connection().await.unwrap();
    let episodes = conn.episode_get_by_feed(feed.id).await.unwrap();
    let titles: Vec<&str> = episodes.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, vec!["Episode 2: Owls", "Episode 1: Bats"]);

    let owls = &episodes[0];
    assert_eq!(owls.number, 2);
    assert_eq!(owls.url, "https://cdn.example.com/radio/2.mp3");
    assert_eq!(owls.link, "https://radio.example.com/2");
    assert_eq!(owls.description, "All about owls");
    assert_eq!(
        owls.path,
        Path::new("/media/podcasts/Late Night Radio/Episode 2_ Owls.mp3")
    );
    assert_eq!(
        episodes[1].path,
        Path::new("/media/podcasts/Late Night Radio/Episode 1_ Bats.ogg")
    );

    let refreshed = conn.feed_get_by_id(feed.id).await.unwrap().unwrap();
    assert!(refreshed.last_refresh > epoch());
    assert!(refreshed.age() < chrono::Duration::minutes(5));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_refresh_of_unreachable_feed_keeps_it_due() {
    let server = serve("/radio.xml", PODCAST_RSS).await;
    let dir = tempfile::tempdir().unwrap();
    let db = file_db(&dir, 2).await;
    let url = format!("{}/radio.xml", server.uri());

    let feed = subscribe(&db, &fetcher(), &url, Path::new("/media"))
        .await
        .unwrap();
    let mut conn = db.connection().await.unwrap();
    conn.feed_set_autorefresh(feed.id, true).await.unwrap();
    drop(conn);

    // The feed disappears after subscription.
    server.reset().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&server)
        .await;

    let options = RefreshOptions {
        pool_size: 1,
        queue_wait: Duration::from_millis(100),
        poll_interval: Duration::from_millis(20),
    };
    Orchestrator::new(db.clone(), Arc::new(fetcher()), options)
        .refresh_all()
        .await;

    let mut conn = db.connection().await.unwrap();
    let stored = conn.feed_get_by_id(feed.id).await.unwrap().unwrap();
    assert_eq!(stored.last_refresh, epoch());
    assert!(conn.episode_get_by_feed(feed.id).await.unwrap().is_empty());
    assert_eq!(conn.feed_get_autorefresh().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_subscribe_unreachable_feed_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let db = Database::open(":memory:", 2).await.unwrap();

    let result = subscribe(
        &db,
        &fetcher(),
        &format!("{}/missing.xml", server.uri()),
        Path::new("/media"),
    )
    .await;

    assert!(matches!(result, Err(SubscribeError::Fetch(_))));
    let mut conn = db.connection().await.unwrap();
    assert!(conn.feed_get_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_two_feeds_with_same_title_conflict_on_folder() {
    let first = serve("/a.xml", PODCAST_RSS).await;
    let second = serve("/b.xml", PODCAST_RSS).await;
    let db = Database::open(":memory:", 2).await.unwrap();

    subscribe(&db, &fetcher(), &format!("{}/a.xml", first.uri()), Path::new("/media"))
        .await
        .unwrap();
    let clash = subscribe(&db, &fetcher(), &format!("{}/b.xml", second.uri()), Path::new("/media")).await;

    assert!(matches!(clash, Err(SubscribeError::Database(_))));
}

#[tokio::test]
async fn test_delete_feed_removes_everything() {
    let server = serve("/radio.xml", PODCAST_RSS).await;
    let db = Database::open(":memory:", 2).await.unwrap();
    let feed = subscribe(
        &db,
        &fetcher(),
        &format!("{}/radio.xml", server.uri()),
        Path::new("/media"),
    )
    .await
    .unwrap();

    let parsed = podroll::feed::parse_feed(PODCAST_RSS.as_bytes()).unwrap();
    let mut conn = db.connection().await.unwrap();
    let added = podroll::refresh::process_feed(&mut conn, &feed, &parsed)
        .await
        .unwrap();
    assert_eq!(added.len(), 2);

    conn.feed_delete(feed.id).await.unwrap();
    assert!(conn.feed_get_by_id(feed.id).await.unwrap().is_none());
    assert!(conn.episode_get_all().await.unwrap().is_empty());
}
