use sqlx::{
    pool::PoolConnection,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Sqlite, SqliteConnection, SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::{is_lock_error, DatabaseError};

// ============================================================================
// Database
// ============================================================================

/// Pooled handle to the podcast database.
///
/// Cheap to clone. Queries run on a [`Connection`] obtained from
/// [`Database::connection`], so a caller can keep one connection for as
/// long as it needs it.
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open (creating if necessary) the database at `path` and run migrations.
    ///
    /// `max_connections` bounds how many [`Connection`]s can be held at once.
    /// Pass `":memory:"` for a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InstanceLocked` if the file is locked by
    /// another process (SQLITE_BUSY, SQLITE_LOCKED, SQLITE_CANTOPEN).
    /// Returns `DatabaseError::Other` for other database errors.
    pub async fn open(path: &str, max_connections: u32) -> Result<Self, DatabaseError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // busy_timeout lets concurrent worker writes wait for the lock
        // instead of failing with SQLITE_BUSY.
        let mut options = SqliteConnectOptions::from_str(&url)
            .map_err(DatabaseError::from_sqlx)?
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        if path != ":memory:" {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        tracing::debug!(path = %path, max_connections, "Opened database");

        let db = Self { pool };
        db.migrate().await.map_err(|e| {
            if is_lock_error(&e.to_string()) {
                DatabaseError::InstanceLocked
            } else {
                DatabaseError::Migration(e.to_string())
            }
        })?;
        Ok(db)
    }

    /// Acquire a dedicated connection from the pool.
    ///
    /// The connection goes back to the pool when the returned value is dropped.
    pub async fn connection(&self) -> Result<Connection, DatabaseError> {
        let conn = self.pool.acquire().await?;
        Ok(Connection { conn })
    }

    /// Create tables and indexes in a single transaction.
    ///
    /// All statements use `IF NOT EXISTS`, so running this on an existing
    /// database is a no-op.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feed (
                id INTEGER PRIMARY KEY,
                url TEXT UNIQUE NOT NULL,
                homepage TEXT NOT NULL DEFAULT '',
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                cover_url TEXT NOT NULL DEFAULT '',
                last_refresh INTEGER NOT NULL DEFAULT 0,
                autorefresh INTEGER NOT NULL DEFAULT 0,
                folder TEXT UNIQUE NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS episode (
                id INTEGER PRIMARY KEY,
                feed_id INTEGER NOT NULL REFERENCES feed(id),
                number INTEGER NOT NULL DEFAULT 0,
                title TEXT NOT NULL,
                url TEXT UNIQUE NOT NULL,
                published INTEGER NOT NULL DEFAULT 0,
                link TEXT NOT NULL DEFAULT '',
                mime TEXT NOT NULL DEFAULT 'application/octet-stream',
                cur_pos INTEGER NOT NULL DEFAULT 0,
                finished INTEGER NOT NULL DEFAULT 0,
                path TEXT UNIQUE NOT NULL,
                keep INTEGER NOT NULL DEFAULT 0,
                description TEXT NOT NULL DEFAULT ''
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        let indexes = [
            "CREATE INDEX IF NOT EXISTS feed_ref_idx ON feed(last_refresh)",
            "CREATE INDEX IF NOT EXISTS feed_auto_idx ON feed(autorefresh)",
            "CREATE INDEX IF NOT EXISTS episode_feed_idx ON episode(feed_id)",
            "CREATE INDEX IF NOT EXISTS episode_published_idx ON episode(published)",
            "CREATE INDEX IF NOT EXISTS episode_finished_idx ON episode(finished)",
            "CREATE INDEX IF NOT EXISTS episode_keep_idx ON episode(keep)",
        ];
        for index in indexes {
            sqlx::query(index).execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

// ============================================================================
// Connection
// ============================================================================

/// A single database connection, exclusively owned by its holder.
///
/// Refresh workers each hold one of these for their whole lifetime; it is
/// never shared between tasks. Feed and episode operations are implemented
/// on this type (see `feeds.rs` and `episodes.rs`).
pub struct Connection {
    conn: PoolConnection<Sqlite>,
}

impl Connection {
    pub(crate) fn raw(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}
