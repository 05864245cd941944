//! Database lifecycle and schema migrations.

use crate::error::DatabaseError;
use crate::{Error, Result};
use sqlx::SqliteConnection;
use sqlx::sqlite::SqlitePool;
use std::path::Path;

use super::Database;

/// One migration statement with the context reported when it fails
type Step = (&'static str, &'static str);

/// v1: channels and videos
const CATALOG_SCHEMA: &[Step] = &[
    (
        "Failed to create channels table",
        r#"
        CREATE TABLE channels (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            remote_id TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            url TEXT NOT NULL,
            thumbnail TEXT,
            description TEXT,
            monitored INTEGER NOT NULL DEFAULT 1,
            download_root TEXT NOT NULL,
            quality TEXT NOT NULL DEFAULT '1080p',
            last_sync INTEGER,
            added_at INTEGER NOT NULL
        )
        "#,
    ),
    (
        "Failed to create videos table",
        r#"
        CREATE TABLE videos (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            remote_id TEXT NOT NULL UNIQUE,
            channel_id INTEGER NOT NULL REFERENCES channels(id) ON DELETE CASCADE,
            title TEXT NOT NULL,
            published_at INTEGER,
            duration_secs INTEGER,
            season_number INTEGER,
            episode_number INTEGER,
            status TEXT NOT NULL DEFAULT 'pending',
            file_path TEXT,
            file_size INTEGER,
            error_message TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    ),
    (
        "Failed to create index",
        "CREATE INDEX idx_videos_channel_status ON videos(channel_id, status)",
    ),
    (
        "Failed to create index",
        "CREATE INDEX idx_videos_status_updated ON videos(status, updated_at)",
    ),
];

/// v2: playlists mapped to seasons
const PLAYLISTS_SCHEMA: &[Step] = &[
    (
        "Failed to create playlists table",
        r#"
        CREATE TABLE playlists (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            remote_id TEXT NOT NULL UNIQUE,
            channel_id INTEGER NOT NULL REFERENCES channels(id) ON DELETE CASCADE,
            title TEXT NOT NULL,
            monitored INTEGER NOT NULL DEFAULT 1,
            season_number INTEGER NOT NULL CHECK (season_number > 0),
            quality TEXT,
            download_root TEXT,
            last_sync INTEGER,
            added_at INTEGER NOT NULL,
            UNIQUE(channel_id, season_number)
        )
        "#,
    ),
    (
        "Failed to add videos.playlist_id",
        "ALTER TABLE videos ADD COLUMN playlist_id INTEGER REFERENCES playlists(id) ON DELETE SET NULL",
    ),
];

/// v3: persisted episode counters and slot uniqueness
const NUMBERING_SCHEMA: &[Step] = &[
    (
        "Failed to create episode_counters table",
        r#"
        CREATE TABLE episode_counters (
            channel_id INTEGER NOT NULL REFERENCES channels(id) ON DELETE CASCADE,
            season_number INTEGER NOT NULL,
            last_episode INTEGER NOT NULL,
            PRIMARY KEY (channel_id, season_number)
        )
        "#,
    ),
    (
        "Failed to create episode slot index",
        r#"
        CREATE UNIQUE INDEX idx_videos_episode_slot
        ON videos(channel_id, season_number, episode_number)
        WHERE season_number IS NOT NULL AND episode_number IS NOT NULL
        "#,
    ),
];

fn migration_failed(context: &str, e: sqlx::Error) -> Error {
    Error::Database(DatabaseError::MigrationFailed(format!("{}: {}", context, e)))
}

impl Database {
    /// Create a new database connection
    ///
    /// Creates the database file if it doesn't exist and runs migrations.
    pub async fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to create database directory: {}",
                    e
                )))
            })?;
        }

        // Foreign keys drive the channel -> video/playlist cascades
        use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(options).await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to connect to database: {}",
                e
            )))
        })?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to acquire connection: {}",
                e
            )))
        })?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(|e| migration_failed("Failed to create schema_version table", e))?;

        let current_version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
                .fetch_optional(&mut *conn)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to query schema version: {}",
                        e
                    )))
                })?
                .flatten();

        let current_version = current_version.unwrap_or(0);

        if current_version < 1 {
            Self::apply(&mut conn, 1, CATALOG_SCHEMA).await?;
        }
        if current_version < 2 {
            Self::apply(&mut conn, 2, PLAYLISTS_SCHEMA).await?;
        }
        if current_version < 3 {
            Self::apply(&mut conn, 3, NUMBERING_SCHEMA).await?;
        }

        Ok(())
    }

    /// Apply one migration inside a transaction and record its version
    async fn apply(conn: &mut SqliteConnection, version: i32, steps: &[Step]) -> Result<()> {
        tracing::info!(version, "Applying database migration");

        sqlx::query("BEGIN")
            .execute(&mut *conn)
            .await
            .map_err(|e| migration_failed("Failed to begin transaction", e))?;

        let result = async {
            for (context, sql) in steps {
                sqlx::query(sql)
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| migration_failed(context, e))?;
            }
            Self::record_migration(conn, version).await
        }
        .await;

        match result {
            Ok(()) => {
                sqlx::query("COMMIT")
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| {
                        migration_failed(&format!("Failed to commit migration v{}", version), e)
                    })?;
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                return Err(e);
            }
        }

        tracing::info!(version, "Database migration complete");
        Ok(())
    }

    /// Record a migration version
    async fn record_migration(conn: &mut SqliteConnection, version: i32) -> Result<()> {
        sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (?, ?)")
            .bind(version)
            .bind(super::now_ts())
            .execute(&mut *conn)
            .await
            .map_err(|e| migration_failed("Failed to record migration", e))?;

        Ok(())
    }

    /// Current schema version
    pub async fn schema_version(&self) -> Result<i64> {
        let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to query schema version: {}",
                    e
                )))
            })?;
        Ok(version.unwrap_or(0))
    }

    /// Close the database connection
    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Get the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
