//! Search indexer: derives the FTS5 `spirit_index` from catalog entries.
//!
//! Each index row reuses the `seq` of its catalog row as rowid, so ties in the
//! query ordering fall back to the order ids first entered the catalog. The
//! index is disposable: [`Storage::reindex_from_catalog`] rebuilds it from the
//! store alone.

use libsql::{Connection, params};
use tracing::{info, instrument};

use wateroflife_shared::{CanonicalEntry, CatalogError, Result};

use crate::Storage;

impl Storage {
    /// Replace the entire index with `entries`, in one transaction.
    ///
    /// Every entry must already be in the catalog.
    #[instrument(skip_all, fields(entries = entries.len()))]
    pub async fn rebuild_index(&self, entries: &[CanonicalEntry]) -> Result<usize> {
        self.check_writable().map_err(as_index_error)?;
        let _guard = self.write_lock.lock().await;

        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| CatalogError::Index(format!("begin transaction: {e}")))?;

        let result = async {
            tx.execute("DELETE FROM spirit_index", params![])
                .await
                .map_err(|e| CatalogError::Index(format!("clear index: {e}")))?;
            for entry in entries {
                insert_index_row(&tx, entry).await?;
            }
            Ok::<_, CatalogError>(())
        }
        .await;

        if let Err(e) = result {
            let _ = tx.rollback().await;
            return Err(e);
        }

        tx.commit()
            .await
            .map_err(|e| CatalogError::Index(format!("commit: {e}")))?;

        info!(indexed = entries.len(), "search index rebuilt");
        Ok(entries.len())
    }

    /// Reflect one entry's current state in the index.
    pub async fn update_index(&self, entry: &CanonicalEntry) -> Result<()> {
        self.check_writable().map_err(as_index_error)?;
        let _guard = self.write_lock.lock().await;

        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| CatalogError::Index(format!("begin transaction: {e}")))?;

        if let Err(e) = insert_index_row(&tx, entry).await {
            let _ = tx.rollback().await;
            return Err(e);
        }

        tx.commit()
            .await
            .map_err(|e| CatalogError::Index(format!("commit: {e}")))
    }

    /// Rebuild the index from the catalog store alone.
    pub async fn reindex_from_catalog(&self) -> Result<usize> {
        let entries = self.list_entries().await?;
        self.rebuild_index(&entries).await
    }
}

/// Replace the index row mirroring `entry`'s catalog row.
async fn insert_index_row(conn: &Connection, entry: &CanonicalEntry) -> Result<()> {
    let seq = catalog_seq(conn, &entry.id).await?.ok_or_else(|| {
        CatalogError::Index(format!(
            "entry '{}' is not in the catalog; index only stored entries",
            entry.id
        ))
    })?;

    conn.execute("DELETE FROM spirit_index WHERE rowid = ?1", params![seq])
        .await
        .map_err(|e| CatalogError::Index(format!("remove {}: {e}", entry.id)))?;

    conn.execute(
        "INSERT INTO spirit_index (rowid, id, name, distiller, bottler, type)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            seq,
            entry.id.as_str(),
            entry.name.as_str(),
            entry.distiller.as_str(),
            entry.bottler.as_str(),
            entry.spirit_type.as_str(),
        ],
    )
    .await
    .map_err(|e| CatalogError::Index(format!("index {}: {e}", entry.id)))?;
    Ok(())
}

async fn catalog_seq(conn: &Connection, id: &str) -> Result<Option<i64>> {
    let mut rows = conn
        .query("SELECT seq FROM spirits WHERE id = ?1", params![id])
        .await
        .map_err(|e| CatalogError::Index(e.to_string()))?;

    match rows.next().await {
        Ok(Some(row)) => row
            .get::<i64>(0)
            .map(Some)
            .map_err(|e| CatalogError::Index(e.to_string())),
        Ok(None) => Ok(None),
        Err(e) => Err(CatalogError::Index(e.to_string())),
    }
}

fn as_index_error(e: CatalogError) -> CatalogError {
    CatalogError::Index(e.to_string())
}

#[cfg(test)]
mod tests {
    use crate::test_support::*;
    use wateroflife_shared::CatalogError;

    #[tokio::test]
    async fn rebuild_from_catalog_indexes_every_entry() {
        let storage = test_storage().await;
        storage
            .put_all(&[entry("listing:1", "Bowmore 12"), entry("listing:2", "Bruichladdich")])
            .await
            .unwrap();

        let indexed = storage.reindex_from_catalog().await.expect("reindex");
        assert_eq!(indexed, 2);
        assert_eq!(storage.search("bowmore").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rebuild_replaces_previous_index() {
        let storage = test_storage().await;
        let a = entry("listing:1", "Springbank 10");
        let b = entry("listing:2", "Hazelburn 10");
        storage.put_all(&[a.clone(), b.clone()]).await.unwrap();

        storage.rebuild_index(&[a, b.clone()]).await.unwrap();
        storage.rebuild_index(&[b]).await.unwrap();

        assert!(storage.search("springbank").await.unwrap().is_empty());
        assert_eq!(storage.search("hazelburn").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_reflects_current_state() {
        let storage = test_storage().await;
        let original = entry("listing:9", "Old Pulteney 12");
        storage.put(&original).await.unwrap();
        storage.update_index(&original).await.unwrap();

        let renamed = entry("listing:9", "Old Pulteney Huddart");
        storage.put(&renamed).await.unwrap();
        storage.update_index(&renamed).await.unwrap();

        let hits = storage.search("pulteney").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Old Pulteney Huddart");
        assert!(storage.search("huddart").await.unwrap().len() == 1);
    }

    #[tokio::test]
    async fn indexing_unknown_entry_is_an_index_error() {
        let storage = test_storage().await;
        let stray = entry("listing:404", "Not Stored");

        let err = storage.update_index(&stray).await.unwrap_err();
        assert!(matches!(err, CatalogError::Index(_)));

        let err = storage.rebuild_index(&[stray]).await.unwrap_err();
        assert!(err.to_string().contains("not in the catalog"));
    }

    #[tokio::test]
    async fn failed_rebuild_keeps_old_index() {
        let storage = test_storage().await;
        let kept = entry("listing:1", "Glenfarclas 15");
        storage.put(&kept).await.unwrap();
        storage.reindex_from_catalog().await.unwrap();

        let result = storage
            .rebuild_index(&[entry("listing:2", "Never Stored")])
            .await;
        assert!(result.is_err());
        assert_eq!(storage.search("glenfarclas").await.unwrap().len(), 1);
    }
}
