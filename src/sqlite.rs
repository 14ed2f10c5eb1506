//! SQLite-backed video store.
//!
//! Connections come from a bounded r2d2 pool so concurrent requests never
//! share a handle. Every connection is opened in WAL mode to avoid readers
//! blocking writers, and the schema is created on open if it is missing.
//! `author` and `stats` are stored as serialized JSON text and parsed back
//! verbatim.

use std::path::Path;
use std::time::Duration;

use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params, params_from_iter};
use tracing::{debug, info};

use crate::config::PoolConfig;
use crate::query::{VIDEO_COLUMNS, VideoFilter};
use crate::repository::{StoreError, StoreResult, VideoRepository};
use crate::video::{Video, VideoInput};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub type SqlitePool = r2d2::Pool<SqliteConnectionManager>;

/// Connection manager for `path`; every new connection runs [`configure`].
fn manager(path: &Path) -> SqliteConnectionManager {
    SqliteConnectionManager::file(path).with_init(|conn| configure(conn))
}

fn configure(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
        row.get::<_, String>(0)
    })?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.busy_timeout(BUSY_TIMEOUT)
}

/// Persisted [`VideoRepository`].
#[derive(Clone)]
pub struct SqliteVideoStore {
    pool: SqlitePool,
}

impl SqliteVideoStore {
    /// Opens (and if necessary creates) the database at `path`.
    pub fn open(path: impl AsRef<Path>, settings: &PoolConfig) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| {
                StoreError::Storage(format!("creating {}: {err}", parent.display()))
            })?;
        }

        // Fail early on an unusable path instead of letting the pool retry
        // until its connection timeout.
        let mut conn = r2d2::ManageConnection::connect(&manager(path))?;
        ensure_tables(&mut conn)?;
        drop(conn);

        let pool = r2d2::Pool::builder()
            .max_size(settings.max_size)
            .min_idle(Some(settings.min_idle.min(settings.max_size)))
            .max_lifetime(Some(settings.max_lifetime))
            .connection_timeout(settings.connection_timeout)
            .build(manager(path))?;

        info!(
            path = %path.display(),
            max_size = pool.max_size(),
            "opened video database"
        );
        Ok(Self { pool })
    }

    fn conn(&self) -> StoreResult<r2d2::PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }
}

/// Creates the table and indexes if they do not already exist. Wrapped in a
/// transaction so a failure leaves the DB untouched.
///
/// `created_ts` holds `createdAt` as epoch milliseconds, or NULL when it does
/// not parse. Filtering and ordering by creation time only ever read it.
fn ensure_tables(conn: &mut Connection) -> StoreResult<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS videos (
            id TEXT PRIMARY KEY NOT NULL,
            title TEXT NOT NULL,
            cover_url TEXT NOT NULL DEFAULT '',
            length TEXT NOT NULL DEFAULT '',
            author_json TEXT NOT NULL DEFAULT 'null',
            stats_json TEXT NOT NULL DEFAULT 'null',
            created_at TEXT NOT NULL,
            created_ts INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_videos_title ON videos(title);
        CREATE INDEX IF NOT EXISTS idx_videos_created_ts ON videos(created_ts);
        "#,
    )?;
    tx.commit()?;
    Ok(())
}

impl VideoRepository for SqliteVideoStore {
    fn create(&self, video: &Video) -> StoreResult<()> {
        let author_json = serde_json::to_string(&video.author)?;
        let stats_json = serde_json::to_string(&video.stats)?;

        let result = self.conn()?.execute(
            r#"
            INSERT INTO videos
                (id, title, cover_url, length, author_json, stats_json, created_at, created_ts)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                video.id,
                video.title,
                video.cover_url,
                video.length,
                author_json,
                stats_json,
                video.created_at,
                video.created_millis(),
            ],
        );

        match result {
            Ok(_) => {
                debug!(id = %video.id, "inserted video");
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::Conflict(video.id.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn update(&self, id: &str, input: &VideoInput) -> StoreResult<Video> {
        let author_json = serde_json::to_string(&input.author)?;
        let stats_json = serde_json::to_string(&input.stats)?;

        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(&format!(
            r#"
            UPDATE videos
            SET title = ?1, cover_url = ?2, length = ?3, author_json = ?4, stats_json = ?5
            WHERE id = ?6
            RETURNING {VIDEO_COLUMNS}
            "#
        ))?;

        // No returned row means no row was affected.
        let row = stmt
            .query_row(
                params![
                    input.title,
                    input.cover_url,
                    input.length,
                    author_json,
                    stats_json,
                    id
                ],
                StoredRow::read,
            )
            .optional()?;

        match row {
            Some(row) => {
                debug!(id, "updated video");
                row.into_video()
            }
            None => Err(StoreError::NotFound(id.to_owned())),
        }
    }

    fn delete(&self, id: &str) -> StoreResult<()> {
        let affected = self
            .conn()?
            .execute("DELETE FROM videos WHERE id = ?1", params![id])?;
        if affected == 0 {
            return Err(StoreError::NotFound(id.to_owned()));
        }
        debug!(id, "deleted video");
        Ok(())
    }

    fn list(&self, filter: &VideoFilter) -> StoreResult<(Vec<Video>, u64)> {
        let query = filter.build_sql();
        let conn = self.conn()?;

        let total: i64 = conn.query_row(
            &query.count_sql,
            params_from_iter(query.params.iter()),
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&query.data_sql)?;
        let mut rows = stmt.query(params_from_iter(query.data_params()))?;
        let mut videos = Vec::new();
        while let Some(row) = rows.next()? {
            videos.push(StoredRow::read(row)?.into_video()?);
        }

        Ok((videos, u64::try_from(total).unwrap_or_default()))
    }
}

/// A `videos` row before its JSON columns are decoded.
struct StoredRow {
    id: String,
    title: String,
    cover_url: String,
    length: String,
    author_json: String,
    stats_json: String,
    created_at: String,
}

impl StoredRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            title: row.get("title")?,
            cover_url: row.get("cover_url")?,
            length: row.get("length")?,
            author_json: row.get("author_json")?,
            stats_json: row.get("stats_json")?,
            created_at: row.get("created_at")?,
        })
    }

    fn into_video(self) -> StoreResult<Video> {
        let author = serde_json::from_str(&self.author_json).map_err(|err| {
            let id = &self.id;
            StoreError::Storage(format!("parsing stored author JSON for {id}: {err}"))
        })?;
        let stats = serde_json::from_str(&self.stats_json).map_err(|err| {
            let id = &self.id;
            StoreError::Storage(format!("parsing stored stats JSON for {id}: {err}"))
        })?;
        Ok(Video {
            id: self.id,
            title: self.title,
            cover_url: self.cover_url,
            length: self.length,
            author,
            stats,
            created_at: self.created_at,
        })
    }
}
