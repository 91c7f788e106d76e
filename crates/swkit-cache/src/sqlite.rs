//! SQLite-backed cache store.
//!
//! Each `put` runs in its own transaction, so an entry is either fully present or absent
//! even if the caller goes away mid-write.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, trace};

use swkit_net::ResponseType;

use crate::{CacheEntry, CacheError, CacheResult, CacheStore, RequestKey};

/// Database schema version for migrations
const SCHEMA_VERSION: i32 = 2;

/// [`CacheStore`] persisted in a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteCacheStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCacheStore {
    /// Open (or create) the database at `path`.
    pub fn connect(path: &Path) -> CacheResult<Self> {
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "Opened cache database");
        Self::from_connection(conn)
    }

    /// A database that disappears with the store.
    pub fn in_memory() -> CacheResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> CacheResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> CacheResult<T>
    where
        F: FnOnce(&mut Connection) -> CacheResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| CacheError::Storage("connection mutex poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| CacheError::Storage(e.to_string()))?
    }
}

fn init_schema(conn: &Connection) -> CacheResult<()> {
    let table_exists: bool = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='schema_version'",
        [],
        |row| row.get::<_, i32>(0).map(|count| count > 0),
    )?;

    let version: i32 = if table_exists {
        conn.query_row(
            "SELECT version FROM schema_version ORDER BY id DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?
        .unwrap_or(0)
    } else {
        0
    };

    if version > SCHEMA_VERSION {
        return Err(CacheError::Storage(format!(
            "cache database schema {} is newer than supported {}",
            version, SCHEMA_VERSION
        )));
    }
    if version < 1 {
        create_schema_v1(conn)?;
    }
    if version < 2 {
        migrate_to_v2(conn)?;
    }
    Ok(())
}

fn create_schema_v1(conn: &Connection) -> CacheResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            version INTEGER NOT NULL,
            applied_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS partitions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            partition_id INTEGER NOT NULL REFERENCES partitions(id) ON DELETE CASCADE,
            method TEXT NOT NULL,
            url TEXT NOT NULL,
            status INTEGER NOT NULL,
            status_text TEXT NOT NULL,
            headers TEXT NOT NULL,
            body BLOB NOT NULL,
            cached_at INTEGER NOT NULL,
            UNIQUE (partition_id, method, url)
        );

        CREATE INDEX IF NOT EXISTS idx_entries_lookup ON entries(method, url);
        "#,
    )?;
    conn.execute(
        "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
        params![1, swkit_common::now_millis() as i64],
    )?;
    Ok(())
}

/// Version 2 records the response type of each entry.
fn migrate_to_v2(conn: &Connection) -> CacheResult<()> {
    conn.execute(
        "ALTER TABLE entries ADD COLUMN response_type TEXT NOT NULL DEFAULT 'basic'",
        [],
    )?;
    conn.execute(
        "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
        params![2, swkit_common::now_millis() as i64],
    )?;
    debug!("Migrated cache database to schema 2");
    Ok(())
}

fn ensure_partition(conn: &Connection, partition: &str) -> CacheResult<i64> {
    conn.execute(
        "INSERT OR IGNORE INTO partitions (name, created_at) VALUES (?1, ?2)",
        params![partition, swkit_common::now_millis() as i64],
    )?;
    let id = conn.query_row(
        "SELECT id FROM partitions WHERE name = ?1",
        params![partition],
        |row| row.get(0),
    )?;
    Ok(id)
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn open(&self, partition: &str) -> CacheResult<()> {
        let partition = partition.to_string();
        self.with_conn(move |conn| ensure_partition(conn, &partition).map(|_| ()))
            .await
    }

    async fn has(&self, partition: &str) -> CacheResult<bool> {
        let partition = partition.to_string();
        self.with_conn(move |conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM partitions WHERE name = ?1",
                    params![partition],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    async fn partitions(&self) -> CacheResult<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT name FROM partitions ORDER BY id")?;
            let names = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(names)
        })
        .await
    }

    async fn delete(&self, partition: &str) -> CacheResult<bool> {
        let partition = partition.to_string();
        self.with_conn(move |conn| {
            let removed = conn.execute("DELETE FROM partitions WHERE name = ?1", params![partition])?;
            trace!(partition = %partition, removed, "Deleted partition");
            Ok(removed > 0)
        })
        .await
    }

    async fn match_request(
        &self,
        partition: &str,
        key: &RequestKey,
    ) -> CacheResult<Option<CacheEntry>> {
        let partition = partition.to_string();
        let key = key.clone();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    r#"
                    SELECT e.method, e.url, e.status, e.status_text, e.headers, e.body, e.cached_at,
                           e.response_type
                    FROM entries e JOIN partitions p ON p.id = e.partition_id
                    WHERE p.name = ?1 AND e.method = ?2 AND e.url = ?3
                    "#,
                    params![partition, key.method, key.url],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, u16>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, String>(4)?,
                            row.get::<_, Vec<u8>>(5)?,
                            row.get::<_, i64>(6)?,
                            row.get::<_, String>(7)?,
                        ))
                    },
                )
                .optional()?;

            let Some((method, url, status, status_text, headers, body, cached_at, response_type)) =
                row
            else {
                return Ok(None);
            };

            Ok(Some(CacheEntry {
                method,
                url,
                status,
                status_text,
                headers: serde_json::from_str(&headers)?,
                response_type: ResponseType::from_name(&response_type).unwrap_or_default(),
                body,
                cached_at: u64::try_from(cached_at).unwrap_or_default(),
            }))
        })
        .await
    }

    async fn put(&self, partition: &str, key: &RequestKey, entry: CacheEntry) -> CacheResult<()> {
        let partition = partition.to_string();
        let key = key.clone();
        let headers = serde_json::to_string(&entry.headers)?;
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let partition_id = ensure_partition(&tx, &partition)?;
            // Delete then insert so an overwritten key moves to the end of the partition.
            tx.execute(
                "DELETE FROM entries WHERE partition_id = ?1 AND method = ?2 AND url = ?3",
                params![partition_id, key.method, key.url],
            )?;
            tx.execute(
                r#"
                INSERT INTO entries
                    (partition_id, method, url, status, status_text, headers, body, cached_at,
                     response_type)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
                params![
                    partition_id,
                    key.method,
                    key.url,
                    entry.status,
                    entry.status_text,
                    headers,
                    entry.body,
                    entry.cached_at as i64,
                    entry.response_type.as_str(),
                ],
            )?;
            tx.commit()?;
            trace!(partition = %partition, key = %key, "Stored entry");
            Ok(())
        })
        .await
    }

    async fn keys(&self, partition: &str) -> CacheResult<Vec<RequestKey>> {
        let partition = partition.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT e.method, e.url
                FROM entries e JOIN partitions p ON p.id = e.partition_id
                WHERE p.name = ?1
                ORDER BY e.id
                "#,
            )?;
            let keys = stmt
                .query_map(params![partition], |row| {
                    Ok(RequestKey::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(keys)
        })
        .await
    }
}
