use crate::error::Result;
use crate::export::HISTORY_LIMIT;
use crate::models::{DownloadHistoryItem, ExportFormat, FileType, HistoryStatus};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

/// Schema steps, applied in order when the stored version is lower.
const MIGRATIONS: &[(i64, &str)] = &[
    (
        1,
        "
        CREATE TABLE IF NOT EXISTS download_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            filename TEXT NOT NULL,
            file_url TEXT,
            file_size INTEGER,
            format TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS mapping_overrides (
            file_type TEXT NOT NULL,
            raw_header TEXT NOT NULL,
            field_key TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (file_type, raw_header)
        );
        ",
    ),
    (
        2,
        "CREATE INDEX IF NOT EXISTS idx_download_history_created ON download_history(created_at);",
    ),
];

/// A user-chosen raw header -> field key pairing, tried before the built-in table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingOverride {
    pub file_type: FileType,
    pub raw_header: String,
    pub field_key: String,
    pub updated_at: String,
}

/// Local SQLite state: recent downloads and mapping overrides.
pub struct Db {
    conn: Mutex<Connection>,
}

impl Db {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        debug!(path = %db_path.display(), "opened database");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at TEXT DEFAULT CURRENT_TIMESTAMP
            );
            INSERT INTO schema_version (version) SELECT 0 WHERE NOT EXISTS (SELECT 1 FROM schema_version LIMIT 1);
            ",
        )?;
        let current: i64 = conn.query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))?;
        for (version, sql) in MIGRATIONS {
            if current < *version {
                conn.execute_batch(sql)?;
                conn.execute("UPDATE schema_version SET version = ?1", params![version])?;
                info!(version, "applied database migration");
            }
        }
        Ok(Db {
            conn: Mutex::new(conn),
        })
    }

    pub fn schema_version(&self) -> Result<i64> {
        let conn = self.conn.lock();
        Ok(conn.query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))?)
    }

    /// Store a finished download and drop everything past the newest `HISTORY_LIMIT`.
    pub fn record_download(&self, item: &DownloadHistoryItem) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO download_history (filename, file_url, file_size, format, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                item.filename,
                item.file_url,
                item.file_size.map(|s| s as i64),
                item.format.as_str(),
                item.status.as_str(),
                item.timestamp.to_rfc3339(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        conn.execute(
            "DELETE FROM download_history WHERE id NOT IN (
                SELECT id FROM download_history ORDER BY id DESC LIMIT ?1
             )",
            params![HISTORY_LIMIT as i64],
        )?;
        Ok(id)
    }

    /// Newest first.
    pub fn download_history(&self) -> Result<Vec<DownloadHistoryItem>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, filename, file_url, file_size, format, status, created_at
             FROM download_history ORDER BY id DESC",
        )?;
        let items = stmt
            .query_map([], history_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(items)
    }

    pub fn clear_download_history(&self) -> Result<u64> {
        let conn = self.conn.lock();
        Ok(conn.execute("DELETE FROM download_history", [])? as u64)
    }

    pub fn upsert_override(&self, file_type: FileType, raw_header: &str, field_key: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO mapping_overrides (file_type, raw_header, field_key, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(file_type, raw_header) DO UPDATE SET
               field_key = excluded.field_key,
               updated_at = excluded.updated_at",
            params![file_type.as_str(), raw_header.trim(), field_key.trim(), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn delete_override(&self, file_type: FileType, raw_header: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "DELETE FROM mapping_overrides WHERE file_type = ?1 AND raw_header = ?2",
            params![file_type.as_str(), raw_header.trim()],
        )?;
        Ok(n > 0)
    }

    /// (raw header, field key) pairs for one file type, oldest first.
    pub fn overrides_for(&self, file_type: FileType) -> Result<Vec<(String, String)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT raw_header, field_key FROM mapping_overrides
             WHERE file_type = ?1 ORDER BY rowid",
        )?;
        let pairs = stmt
            .query_map(params![file_type.as_str()], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(pairs)
    }

    pub fn list_overrides(&self) -> Result<Vec<MappingOverride>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT file_type, raw_header, field_key, updated_at FROM mapping_overrides
             ORDER BY file_type, rowid",
        )?;
        let rows = stmt
            .query_map([], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        // Rows written by a newer build may name a file type this one does not know.
        Ok(rows
            .into_iter()
            .filter_map(|(file_type, raw_header, field_key, updated_at)| {
                Some(MappingOverride {
                    file_type: file_type.parse().ok()?,
                    raw_header,
                    field_key,
                    updated_at,
                })
            })
            .collect())
    }

    pub fn override_for(&self, file_type: FileType, raw_header: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        Ok(conn
            .query_row(
                "SELECT field_key FROM mapping_overrides WHERE file_type = ?1 AND raw_header = ?2",
                params![file_type.as_str(), raw_header.trim()],
                |r| r.get(0),
            )
            .optional()?)
    }
}

fn history_from_row(row: &Row<'_>) -> rusqlite::Result<DownloadHistoryItem> {
    let format: String = row.get(4)?;
    let status: String = row.get(5)?;
    let created_at: String = row.get(6)?;
    Ok(DownloadHistoryItem {
        id: row.get::<_, i64>(0)? as u64,
        filename: row.get(1)?,
        file_url: row.get(2)?,
        file_size: row.get::<_, Option<i64>>(3)?.map(|s| s as u64),
        timestamp: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_default(),
        format: format.parse().unwrap_or(ExportFormat::Excel),
        status: if status == HistoryStatus::Failed.as_str() {
            HistoryStatus::Failed
        } else {
            HistoryStatus::Completed
        },
    })
}
