//! Raw record normalization into canonical catalog entries.
//!
//! Each origin supplies a [`SourceSchema`] mapping canonical fields to its own
//! keys; this crate carries no origin-specific logic beyond the built-in
//! mapping tables in [`schemas`].

pub mod schemas;

use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use wateroflife_shared::{CanonicalEntry, CatalogError, RawRecord, Result, SourceSchema};

pub use schemas::{SchemaRegistry, builtin_schemas};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A record that failed normalization, with its position in the input batch.
#[derive(Debug)]
pub struct RejectedRecord {
    /// Zero-based position in the batch.
    pub position: usize,
    /// Why the record was rejected.
    pub error: CatalogError,
}

/// Output of [`normalize_batch`]: accepted entries plus per-record rejections.
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub entries: Vec<CanonicalEntry>,
    pub rejected: Vec<RejectedRecord>,
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Map one raw record into a [`CanonicalEntry`] using `schema`.
///
/// Text fields fall back to `""` when absent. A present ABV without a numeric
/// value is an error rather than a silent zero.
pub fn normalize(record: &RawRecord, schema: &SourceSchema) -> Result<CanonicalEntry> {
    let fields = &schema.fields;

    let name = text_field(record, "name", &fields.name)?;
    let distiller = text_field(record, "distiller", &fields.distiller)?;
    let bottler = text_field(record, "bottler", &fields.bottler)?;

    let raw_id = text_field(record, "id", &fields.id)?;
    let id = if !raw_id.is_empty() {
        format!("{}:{raw_id}", schema.origin)
    } else if !name.is_empty() {
        derive_id(&schema.origin, &name, &distiller, &bottler)
    } else {
        return Err(CatalogError::normalization(
            "id",
            "record has neither an id nor a name",
        ));
    };

    Ok(CanonicalEntry {
        id,
        name,
        distiller,
        bottler,
        spirit_type: text_field(record, "type", &fields.spirit_type)?,
        abv: abv_field(record, &fields.abv)?,
        age: text_field(record, "age", &fields.age)?,
        description: text_field(record, "description", &fields.description)?,
    })
}

/// Normalize every record in `records`; one bad record never blocks the rest.
pub fn normalize_batch(records: &[RawRecord], schema: &SourceSchema) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();

    for (position, record) in records.iter().enumerate() {
        match normalize(record, schema) {
            Ok(entry) => batch.entries.push(entry),
            Err(error) => {
                warn!(origin = %schema.origin, position, %error, "rejecting record");
                batch.rejected.push(RejectedRecord { position, error });
            }
        }
    }

    debug!(
        origin = %schema.origin,
        accepted = batch.entries.len(),
        rejected = batch.rejected.len(),
        "batch normalized"
    );
    batch
}

// ---------------------------------------------------------------------------
// Field coercion
// ---------------------------------------------------------------------------

/// First present, non-null candidate key rendered as trimmed text.
fn text_field(record: &RawRecord, field: &str, keys: &[String]) -> Result<String> {
    let Some(value) = first_present(record, keys) else {
        return Ok(String::new());
    };

    match value {
        Value::String(s) => Ok(decode_entities(s.trim())),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(CatalogError::normalization(
            field,
            format!("expected text, found {}", json_kind(other)),
        )),
    }
}

/// ABV as a number; strings contribute their first numeric token (`"46% ABV"` → 46).
fn abv_field(record: &RawRecord, keys: &[String]) -> Result<f64> {
    static NUMBER_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[-+]?\d*\.?\d+").expect("valid regex"));

    let Some(value) = first_present(record, keys) else {
        return Ok(0.0);
    };

    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| CatalogError::normalization("abv", format!("{n} is not a finite number"))),
        Value::String(s) if s.trim().is_empty() => Ok(0.0),
        Value::String(s) => {
            let token = NUMBER_RE
                .find(s)
                .ok_or_else(|| CatalogError::normalization("abv", format!("no numeric value in {s:?}")))?;
            token.as_str().parse::<f64>().map_err(|e| {
                CatalogError::normalization("abv", format!("cannot parse {:?}: {e}", token.as_str()))
            })
        }
        other => Err(CatalogError::normalization(
            "abv",
            format!("expected number, found {}", json_kind(other)),
        )),
    }
}

fn first_present<'a>(record: &'a RawRecord, keys: &[String]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| record.get(key))
        .find(|value| !value.is_null())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Stable id for sources that carry none, so re-runs upsert the same row.
fn derive_id(origin: &str, name: &str, distiller: &str, bottler: &str) -> String {
    let mut hasher = Sha256::new();
    for part in [origin, name, distiller, bottler] {
        hasher.update(part.as_bytes());
        hasher.update([0x1f]);
    }
    let digest = format!("{:x}", hasher.finalize());
    format!("{origin}:{}", &digest[..20])
}

/// Decode the HTML entities listing titles arrive with (`Jack &amp; Coke`,
/// `Hennessy &ldquo;XO&rdquo;`). Anything tag-like stays literal text.
fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let escaped = text.replace('<', "&lt;");
    Html::parse_fragment(&escaped).root_element().text().collect()
}
