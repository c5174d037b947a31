//! Work-item store on embedded libSQL.
//!
//! The [`Storage`] struct is the single source of truth for work-item status,
//! published content records, research blobs, and their cross-links. No other
//! component persists status.
//!
//! **Access rules:**
//! - pipeline runs: read-write via [`Storage::open`], closed with [`Storage::close`]
//! - `--dry-run`: read-only via [`Storage::open_readonly`]

mod content;
mod items;
mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use presswork_shared::{PressworkError, Result};

pub use content::{ContentCommit, ContentUpdate, NewContent, TopicIndexEntry};
pub use items::StuckItem;

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| PressworkError::io(parent, e))?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;

        let conn = db.connect().map_err(storage_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        tracing::debug!(path = %path.display(), "work-item store opened");
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PressworkError::Storage(format!(
                "database not found at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;

        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// End the store's scoped lifetime. Dropping has the same effect; this
    /// makes the end of a run explicit in the logs.
    pub async fn close(self) {
        tracing::debug!(readonly = self.readonly, "work-item store closed");
        drop(self.conn);
        drop(self.db);
    }

    /// Whether writes are rejected.
    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        PressworkError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(PressworkError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

pub(crate) fn storage_err(e: libsql::Error) -> PressworkError {
    PressworkError::Storage(e.to_string())
}

pub(crate) fn now_ts() -> String {
    Utc::now().to_rfc3339()
}

pub(crate) fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| PressworkError::Storage(format!("invalid date '{s}': {e}")))
}

pub(crate) fn get_string(row: &libsql::Row, idx: i32) -> Result<String> {
    row.get::<String>(idx).map_err(storage_err)
}

pub(crate) fn get_i64(row: &libsql::Row, idx: i32) -> Result<i64> {
    row.get::<i64>(idx).map_err(storage_err)
}

pub(crate) fn get_f64(row: &libsql::Row, idx: i32) -> Result<f64> {
    row.get::<f64>(idx).map_err(storage_err)
}

pub(crate) fn get_parsed<T: std::str::FromStr<Err = PressworkError>>(
    row: &libsql::Row,
    idx: i32,
) -> Result<T> {
    get_string(row, idx)?.parse()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Storage;
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    pub(crate) async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("pw_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }
}
