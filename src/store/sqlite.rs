//! Snapshot stored in a SQLite `articles` table.
//!
//! Rows are never deleted. Saving upserts every present URL (keeping the
//! original `first_seen_at`) and stamps `removed_at` on rows whose URL is no
//! longer listed; loading returns only rows without `removed_at`. An article
//! that comes back is un-stamped and shows up as added again.
//!
//! Databases created by earlier releases (`url`, `title`, `timestamp` as Unix
//! seconds) are migrated in place on open.

use super::{SnapshotStore, StoreError};
use crate::models::{Article, Attribution, Snapshot};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, params};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, instrument};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS articles (
    url TEXT PRIMARY KEY,
    title TEXT,
    author TEXT,
    first_seen_at TEXT,
    removed_at TEXT
)";

/// Columns added after the first schema, with their types.
const ADDED_COLUMNS: [(&str, &str); 3] = [
    ("author", "TEXT"),
    ("first_seen_at", "TEXT"),
    ("removed_at", "TEXT"),
];

#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and bring its schema up to date.
    #[instrument(level = "info", fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(SCHEMA, [])?;
        migrate(&conn)?;
        Ok(Self { conn })
    }
}

fn migrate(conn: &Connection) -> Result<(), StoreError> {
    let columns: HashSet<String> = conn
        .prepare("SELECT name FROM pragma_table_info('articles')")?
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<_, _>>()?;

    for (name, kind) in ADDED_COLUMNS {
        if !columns.contains(name) {
            info!(column = name, "Adding missing column");
            conn.execute(&format!("ALTER TABLE articles ADD COLUMN {name} {kind}"), [])?;
        }
    }

    if columns.contains("timestamp") {
        let backfilled = conn.execute(
            "UPDATE articles
             SET first_seen_at = strftime('%Y-%m-%dT%H:%M:%SZ', timestamp, 'unixepoch')
             WHERE first_seen_at IS NULL AND timestamp IS NOT NULL",
            [],
        )?;
        if backfilled > 0 {
            info!(rows = backfilled, "Backfilled first_seen_at from legacy timestamps");
        }
    }
    Ok(())
}

fn format_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| StoreError::Timestamp(s.to_string()))
}

impl SnapshotStore for SqliteStore {
    #[instrument(level = "info", skip_all)]
    fn load(&self) -> Result<Snapshot, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT url, title, author, first_seen_at FROM articles WHERE removed_at IS NULL",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut snapshot = Snapshot::new();
        for (url, title, author, first_seen_at) in rows {
            let author = match author {
                Some(json) => serde_json::from_str::<Attribution>(&json)?,
                None => Attribution::Unchecked,
            };
            let first_seen_at = first_seen_at.as_deref().map(parse_time).transpose()?;
            snapshot.insert(
                url,
                Article {
                    title: title.unwrap_or_default(),
                    author,
                    first_seen_at,
                },
            );
        }
        info!(count = snapshot.len(), "Loaded snapshot");
        Ok(snapshot)
    }

    #[instrument(level = "info", skip_all, fields(count = snapshot.len()))]
    fn save(&mut self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let now = format_time(&Utc::now());
        let tx = self.conn.transaction()?;
        {
            let mut upsert = tx.prepare(
                "INSERT INTO articles (url, title, author, first_seen_at, removed_at)
                 VALUES (?1, ?2, ?3, ?4, NULL)
                 ON CONFLICT(url) DO UPDATE SET
                     title = excluded.title,
                     author = excluded.author,
                     first_seen_at = COALESCE(articles.first_seen_at, excluded.first_seen_at),
                     removed_at = NULL",
            )?;
            for (url, article) in snapshot {
                let author = match &article.author {
                    Attribution::Unchecked => None,
                    checked => Some(serde_json::to_string(checked)?),
                };
                let first_seen_at = article.first_seen_at.as_ref().map(format_time);
                upsert.execute(params![url, article.title, author, first_seen_at])?;
            }

            let present: Vec<String> = tx
                .prepare("SELECT url FROM articles WHERE removed_at IS NULL")?
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<_, _>>()?;
            let mut mark = tx.prepare("UPDATE articles SET removed_at = ?1 WHERE url = ?2")?;
            let mut marked = 0usize;
            for url in present.iter().filter(|url| !snapshot.contains(url)) {
                marked += mark.execute(params![now, url])?;
            }
            debug!(marked, "Marked absent articles as removed");
        }
        tx.commit()?;
        info!("Saved snapshot");
        Ok(())
    }
}
