//! libSQL storage layer for the spirits catalog.
//!
//! The [`Storage`] struct wraps a libSQL database holding the catalog store,
//! the crawl run history, and the derived FTS5 search index.
//!
//! - [`catalog`]: upsert / lookup of canonical entries
//! - [`index`]: rebuild and incremental update of the search index
//! - [`query`]: bounded, ordered search over the index
//!
//! **Access rules:**
//! - Ingestion and import: read-write via [`Storage::open`]
//! - Search-only callers: read-only via [`Storage::open_readonly`]

mod catalog;
mod index;
mod migrations;
mod query;

use std::path::Path;

use libsql::{Connection, Database, params};
use tokio::sync::Mutex;

use wateroflife_shared::{CatalogError, Result};

pub use catalog::CrawlRun;
pub use query::SEARCH_LIMIT;

/// Primary storage handle wrapping a libSQL database.
///
/// Share it between category workers as `Arc<Storage>`; every write path
/// takes `write_lock`, so transactions never interleave on the connection.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
    write_lock: Mutex<()>,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| CatalogError::io(parent, e))?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| CatalogError::Store(e.to_string()))?;

        let conn = db.connect().map_err(|e| CatalogError::Store(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
            write_lock: Mutex::new(()),
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CatalogError::Store(format!(
                "database not found at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| CatalogError::Store(e.to_string()))?;

        let conn = db.connect().map_err(|e| CatalogError::Store(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
            write_lock: Mutex::new(()),
        })
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
                        CatalogError::Store(format!(
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
            return Err(CatalogError::Store(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Storage;
    use wateroflife_shared::CanonicalEntry;

    /// Create a temp file storage for testing.
    pub async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("wol_test_{}.db", uuid::Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    pub fn entry(id: &str, name: &str) -> CanonicalEntry {
        CanonicalEntry {
            id: id.into(),
            name: name.into(),
            distiller: "Test Distillery".into(),
            bottler: "Official Bottling".into(),
            spirit_type: "Single Malt".into(),
            abv: 40.0,
            age: String::new(),
            description: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        let version = storage.get_schema_version().await;
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("wol_test_{}.db", uuid::Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("wol_test_{}.db", uuid::Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.unwrap();
        rw.put(&entry("listing:1", "Ardbeg 10")).await.unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        let result = ro.put(&entry("listing:2", "Ardbeg 5")).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));

        let found = ro.get("listing:1").await.unwrap();
        assert_eq!(found.map(|e| e.name), Some("Ardbeg 10".to_string()));
    }

    #[tokio::test]
    async fn readonly_requires_existing_file() {
        let tmp = std::env::temp_dir().join(format!("wol_missing_{}.db", uuid::Uuid::now_v7()));
        let Err(err) = Storage::open_readonly(&tmp).await else {
            panic!("expected missing database error");
        };
        assert!(err.to_string().contains("database not found"));
    }
}
