//! Catalog store: whole-row upserts and lookups of canonical entries,
//! plus the per-category crawl run history.

use chrono::Utc;
use libsql::{Connection, params};
use uuid::Uuid;

use wateroflife_shared::{CanonicalEntry, CatalogError, Result};

use crate::Storage;

const ENTRY_COLUMNS: &str = "id, name, distiller, bottler, type, abv, age, description";

/// One row of the crawl run history.
#[derive(Debug, Clone)]
pub struct CrawlRun {
    pub id: String,
    pub category: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    /// `running`, `completed`, `failed`, or `cancelled`.
    pub status: String,
    pub stats_json: Option<String>,
}

impl Storage {
    // -----------------------------------------------------------------------
    // Entry operations
    // -----------------------------------------------------------------------

    /// Upsert one entry, replacing every column of an existing row with the same id.
    pub async fn put(&self, entry: &CanonicalEntry) -> Result<()> {
        self.check_writable()?;
        let _guard = self.write_lock.lock().await;
        upsert_entry(&self.conn, entry, &Utc::now().to_rfc3339()).await
    }

    /// Upsert a batch inside one transaction. Returns the number of rows written.
    ///
    /// Either the whole batch becomes visible or none of it does.
    pub async fn put_all(&self, entries: &[CanonicalEntry]) -> Result<usize> {
        self.check_writable()?;
        if entries.is_empty() {
            return Ok(0);
        }

        let _guard = self.write_lock.lock().await;
        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| CatalogError::Store(format!("begin transaction: {e}")))?;

        let now = Utc::now().to_rfc3339();
        for entry in entries {
            if let Err(e) = upsert_entry(&tx, entry, &now).await {
                let _ = tx.rollback().await;
                return Err(e);
            }
        }

        tx.commit()
            .await
            .map_err(|e| CatalogError::Store(format!("commit: {e}")))?;

        tracing::debug!(rows = entries.len(), "catalog batch committed");
        Ok(entries.len())
    }

    /// Look up an entry by id.
    pub async fn get(&self, id: &str) -> Result<Option<CanonicalEntry>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {ENTRY_COLUMNS} FROM spirits WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| CatalogError::Store(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_entry(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(CatalogError::Store(e.to_string())),
        }
    }

    /// Every entry, in first-insertion order.
    pub async fn list_entries(&self) -> Result<Vec<CanonicalEntry>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {ENTRY_COLUMNS} FROM spirits ORDER BY seq"),
                params![],
            )
            .await
            .map_err(|e| CatalogError::Store(e.to_string()))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| CatalogError::Store(e.to_string()))?
        {
            results.push(row_to_entry(&row)?);
        }
        Ok(results)
    }

    /// Number of entries in the catalog.
    pub async fn count(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM spirits", params![])
            .await
            .map_err(|e| CatalogError::Store(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<i64>(0)
                .map(|n| n as u64)
                .map_err(|e| CatalogError::Store(e.to_string())),
            Ok(None) => Ok(0),
            Err(e) => Err(CatalogError::Store(e.to_string())),
        }
    }

    // -----------------------------------------------------------------------
    // Crawl run operations
    // -----------------------------------------------------------------------

    /// Record the start of a category crawl. Returns the generated run ID.
    pub async fn begin_crawl_run(&self, category: &str) -> Result<String> {
        self.check_writable()?;
        let _guard = self.write_lock.lock().await;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO crawl_runs (id, category, started_at) VALUES (?1, ?2, ?3)",
                params![id.as_str(), category, now.as_str()],
            )
            .await
            .map_err(|e| CatalogError::Store(e.to_string()))?;
        Ok(id)
    }

    /// Close a crawl run with its final status and stats.
    pub async fn finish_crawl_run(&self, run_id: &str, status: &str, stats_json: &str) -> Result<()> {
        self.check_writable()?;
        let _guard = self.write_lock.lock().await;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE crawl_runs SET finished_at = ?1, status = ?2, stats_json = ?3 WHERE id = ?4",
                params![now.as_str(), status, stats_json, run_id],
            )
            .await
            .map_err(|e| CatalogError::Store(e.to_string()))?;
        Ok(())
    }

    /// Most recent crawl run for a category, if any.
    pub async fn latest_crawl_run(&self, category: &str) -> Result<Option<CrawlRun>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, category, started_at, finished_at, status, stats_json
                 FROM crawl_runs WHERE category = ?1
                 ORDER BY started_at DESC, id DESC LIMIT 1",
                params![category],
            )
            .await
            .map_err(|e| CatalogError::Store(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(CrawlRun {
                id: row
                    .get::<String>(0)
                    .map_err(|e| CatalogError::Store(e.to_string()))?,
                category: row
                    .get::<String>(1)
                    .map_err(|e| CatalogError::Store(e.to_string()))?,
                started_at: row
                    .get::<String>(2)
                    .map_err(|e| CatalogError::Store(e.to_string()))?,
                finished_at: row.get::<String>(3).ok(),
                status: row
                    .get::<String>(4)
                    .map_err(|e| CatalogError::Store(e.to_string()))?,
                stats_json: row.get::<String>(5).ok(),
            })),
            Ok(None) => Ok(None),
            Err(e) => Err(CatalogError::Store(e.to_string())),
        }
    }
}

/// Insert-or-replace of a full row. `seq` is kept, so first-insertion order survives.
async fn upsert_entry(conn: &Connection, entry: &CanonicalEntry, now: &str) -> Result<()> {
    if entry.id.is_empty() {
        return Err(CatalogError::Store("refusing to store an entry with an empty id".into()));
    }

    conn.execute(
        "INSERT INTO spirits (id, name, distiller, bottler, type, abv, age, description, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           distiller = excluded.distiller,
           bottler = excluded.bottler,
           type = excluded.type,
           abv = excluded.abv,
           age = excluded.age,
           description = excluded.description,
           updated_at = excluded.updated_at",
        params![
            entry.id.as_str(),
            entry.name.as_str(),
            entry.distiller.as_str(),
            entry.bottler.as_str(),
            entry.spirit_type.as_str(),
            entry.abv,
            entry.age.as_str(),
            entry.description.as_str(),
            now,
        ],
    )
    .await
    .map_err(|e| CatalogError::Store(format!("upsert {}: {e}", entry.id)))?;
    Ok(())
}

/// Convert a database row to a [`CanonicalEntry`].
fn row_to_entry(row: &libsql::Row) -> Result<CanonicalEntry> {
    Ok(CanonicalEntry {
        id: row
            .get::<String>(0)
            .map_err(|e| CatalogError::Store(e.to_string()))?,
        name: row
            .get::<String>(1)
            .map_err(|e| CatalogError::Store(e.to_string()))?,
        distiller: row
            .get::<String>(2)
            .map_err(|e| CatalogError::Store(e.to_string()))?,
        bottler: row
            .get::<String>(3)
            .map_err(|e| CatalogError::Store(e.to_string()))?,
        spirit_type: row
            .get::<String>(4)
            .map_err(|e| CatalogError::Store(e.to_string()))?,
        abv: row
            .get::<f64>(5)
            .map_err(|e| CatalogError::Store(e.to_string()))?,
        age: row
            .get::<String>(6)
            .map_err(|e| CatalogError::Store(e.to_string()))?,
        description: row
            .get::<String>(7)
            .map_err(|e| CatalogError::Store(e.to_string()))?,
    })
}
