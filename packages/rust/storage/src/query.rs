//! Query engine over the search index.

use libsql::params;
use tracing::debug;

use wateroflife_shared::{CatalogError, IndexEntry, Result};

use crate::Storage;

/// Maximum number of results returned by [`Storage::search`].
pub const SEARCH_LIMIT: u32 = 20;

impl Storage {
    /// Match `term` against name, distiller, bottler, and type.
    ///
    /// `term` uses FTS5 match syntax (`"phrase"`, `prefix*`, `AND`/`OR`/`NOT`,
    /// `name:term`). Results are sorted by name descending; equal names keep
    /// catalog insertion order. A blank term matches nothing.
    pub async fn search(&self, term: &str) -> Result<Vec<IndexEntry>> {
        let term = term.trim();
        if term.is_empty() {
            return Ok(Vec::new());
        }

        let mut rows = self
            .conn
            .query(
                "SELECT id, name, distiller, bottler, type
                 FROM spirit_index
                 WHERE spirit_index MATCH ?1
                 ORDER BY name DESC, rowid ASC
                 LIMIT ?2",
                params![term, i64::from(SEARCH_LIMIT)],
            )
            .await
            .map_err(|e| CatalogError::Index(format!("search {term:?}: {e}")))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| CatalogError::Index(format!("search {term:?}: {e}")))?
        {
            results.push(row_to_index_entry(&row)?);
        }

        debug!(term, hits = results.len(), "search complete");
        Ok(results)
    }
}

fn row_to_index_entry(row: &libsql::Row) -> Result<IndexEntry> {
    let text = |idx: i32| {
        row.get::<String>(idx)
            .map_err(|e| CatalogError::Index(e.to_string()))
    };
    Ok(IndexEntry {
        id: text(0)?,
        name: text(1)?,
        distiller: text(2)?,
        bottler: text(3)?,
        spirit_type: text(4)?,
    })
}
