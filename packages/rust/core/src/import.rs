//! One-time ETL import of existing datasets into the catalog.
//!
//! Rows from an external SQLite table or a JSON dump go through the same
//! normalizer and store contracts as crawled records, then the index is
//! rebuilt.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use libsql::{Value as SqlValue, params};
use regex::Regex;
use serde_json::{Map, Number, Value};
use tracing::{info, instrument};

use wateroflife_normalizer::normalize_batch;
use wateroflife_shared::{CatalogError, RawRecord, Result, SourceSchema};
use wateroflife_storage::Storage;

use crate::artifacts::read_records;

/// Where imported rows come from.
#[derive(Debug, Clone)]
pub enum ImportSource {
    /// Every row of `table` in a SQLite file.
    Sqlite { path: PathBuf, table: String },
    /// A JSON array of objects.
    Json { path: PathBuf },
}

/// Counts from one import.
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub rows_read: usize,
    pub entries_stored: usize,
    pub records_rejected: usize,
    pub indexed: usize,
}

/// Import every row of `source`, normalizing with `schema`.
#[instrument(skip_all, fields(origin = %schema.origin))]
pub async fn import(source: &ImportSource, schema: &SourceSchema, storage: &Storage) -> Result<ImportReport> {
    let records = match source {
        ImportSource::Sqlite { path, table } => read_sqlite_table(path, table).await?,
        ImportSource::Json { path } => read_records(path)?,
    };

    let batch = normalize_batch(&records, schema);
    let entries_stored = storage.put_all(&batch.entries).await?;
    let indexed = storage.reindex_from_catalog().await?;

    let report = ImportReport {
        rows_read: records.len(),
        entries_stored,
        records_rejected: batch.rejected.len(),
        indexed,
    };

    info!(
        rows = report.rows_read,
        stored = report.entries_stored,
        rejected = report.records_rejected,
        indexed = report.indexed,
        "import complete"
    );
    Ok(report)
}

/// Read all rows of `table`, one record per row keyed by column name.
async fn read_sqlite_table(path: &Path, table: &str) -> Result<Vec<RawRecord>> {
    validate_identifier(table)?;
    if !path.exists() {
        return Err(CatalogError::validation(format!(
            "import database not found at {}",
            path.display()
        )));
    }

    let db = libsql::Builder::new_local(path)
        .build()
        .await
        .map_err(|e| CatalogError::Store(format!("{}: {e}", path.display())))?;
    let conn = db
        .connect()
        .map_err(|e| CatalogError::Store(e.to_string()))?;

    let mut rows = conn
        .query(&format!("SELECT * FROM \"{table}\""), params![])
        .await
        .map_err(|e| CatalogError::Store(format!("read table {table}: {e}")))?;

    let columns: Vec<String> = (0..rows.column_count())
        .map(|i| rows.column_name(i).unwrap_or_default().to_string())
        .collect();

    let mut records = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| CatalogError::Store(format!("read table {table}: {e}")))?
    {
        let mut map = Map::new();
        for (i, column) in columns.iter().enumerate() {
            let value = row
                .get_value(i as i32)
                .map_err(|e| CatalogError::Store(e.to_string()))?;
            map.insert(column.clone(), sql_to_json(value));
        }
        records.push(RawRecord::from(map));
    }

    info!(table, rows = records.len(), "read import table");
    Ok(records)
}

/// Accept only plain SQL identifiers, since the table name is interpolated.
fn validate_identifier(name: &str) -> Result<()> {
    static IDENT: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));

    if IDENT.is_match(name) {
        Ok(())
    } else {
        Err(CatalogError::validation(format!(
            "invalid table name '{name}': use letters, digits and underscores"
        )))
    }
}

fn sql_to_json(value: SqlValue) -> Value {
    match value {
        SqlValue::Null | SqlValue::Blob(_) => Value::Null,
        SqlValue::Integer(n) => Value::Number(n.into()),
        SqlValue::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        SqlValue::Text(s) => Value::String(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wateroflife_normalizer::SchemaRegistry;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("wol-import-{}", uuid::Uuid::now_v7()))
    }

    fn schema(origin: &str) -> SourceSchema {
        SchemaRegistry::with_builtins().get(origin).unwrap().clone()
    }

    async fn seed_bottleraiders_db(path: &Path) {
        let db = libsql::Builder::new_local(path).build().await.unwrap();
        let conn = db.connect().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE whiskey (
                permalink TEXT, Title TEXT, Type TEXT, Distiller TEXT,
                Bottler TEXT, ABV TEXT, Age TEXT, Price REAL
            );
            INSERT INTO whiskey VALUES
                ('springbank-15', 'Springbank 15', 'Single Malt', 'Springbank', 'Official', '46%', '15 Years', 99.5),
                ('kilkerran-12', 'Kilkerran 12', 'Single Malt', 'Glengyle', 'Official', '46', '12 Years', NULL),
                ('mystery', 'Mystery Cask', 'Single Malt', NULL, NULL, 'cask strength', NULL, NULL);
            "#,
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn imports_sqlite_table() {
        let tmp = temp_dir();
        std::fs::create_dir_all(&tmp).unwrap();
        let source_db = tmp.join("bottleraiders.db");
        seed_bottleraiders_db(&source_db).await;
        let storage = Storage::open(&tmp.join("catalog.db")).await.unwrap();

        let report = import(
            &ImportSource::Sqlite {
                path: source_db,
                table: "whiskey".into(),
            },
            &schema("bottleraiders"),
            &storage,
        )
        .await
        .unwrap();

        assert_eq!(report.rows_read, 3);
        assert_eq!(report.entries_stored, 2);
        assert_eq!(report.records_rejected, 1);
        assert_eq!(report.indexed, 2);

        let entry = storage.get("bottleraiders:springbank-15").await.unwrap().unwrap();
        assert_eq!(entry.distiller, "Springbank");
        assert_eq!(entry.abv, 46.0);
        assert_eq!(entry.age, "15 Years");
        assert_eq!(storage.search("glengyle").await.unwrap().len(), 1);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn imports_json_dump() {
        let tmp = temp_dir();
        std::fs::create_dir_all(&tmp).unwrap();
        let dump = tmp.join("whiskybase.json");
        std::fs::write(
            &dump,
            r#"[
                {"Barcode": "5010314101015", "Name": "Highland Park 18", "Distillery": "Highland Park",
                 "Category": "Single Malt", "Strength": "43.0 % Vol.", "Stated Age": "18 years old"},
                {"Barcode": "5000281005409", "Name": "Talisker 10", "Distillery": "Talisker",
                 "Category": "Single Malt", "Strength": "45.8 % Vol."}
            ]"#,
        )
        .unwrap();
        let storage = Storage::open(&tmp.join("catalog.db")).await.unwrap();

        let report = import(&ImportSource::Json { path: dump }, &schema("whiskybase"), &storage)
            .await
            .unwrap();

        assert_eq!(report.entries_stored, 2);
        let entry = storage.get("whiskybase:5000281005409").await.unwrap().unwrap();
        assert_eq!(entry.abv, 45.8);
        let hits = storage.search("single").await.unwrap();
        assert_eq!(hits[0].name, "Talisker 10");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn rejects_unsafe_table_names() {
        let tmp = temp_dir();
        let storage = Storage::open(&tmp.join("catalog.db")).await.unwrap();

        for table in ["whiskey; DROP TABLE spirits", "wh\"iskey", "", "1st"] {
            let err = import(
                &ImportSource::Sqlite {
                    path: tmp.join("missing.db"),
                    table: table.into(),
                },
                &schema("bottleraiders"),
                &storage,
            )
            .await
            .unwrap_err();
            assert!(matches!(err, CatalogError::Validation { .. }), "{table}: {err}");
        }

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn missing_database_is_not_created() {
        let tmp = temp_dir();
        let storage = Storage::open(&tmp.join("catalog.db")).await.unwrap();
        let missing = tmp.join("missing.db");

        let err = import(
            &ImportSource::Sqlite {
                path: missing.clone(),
                table: "whiskey".into(),
            },
            &schema("bottleraiders"),
            &storage,
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("not found"));
        assert!(!missing.exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn sql_values_map_to_json() {
        assert_eq!(sql_to_json(SqlValue::Integer(7)), Value::from(7));
        assert_eq!(sql_to_json(SqlValue::Real(46.5)), Value::from(46.5));
        assert_eq!(sql_to_json(SqlValue::Text("x".into())), Value::from("x"));
        assert_eq!(sql_to_json(SqlValue::Null), Value::Null);
        assert_eq!(sql_to_json(SqlValue::Blob(vec![1, 2])), Value::Null);
    }
}
