//! Core domain types for the spirits catalog.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CatalogError;

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// A fixed classification partitioning the crawl and the catalog.
///
/// The lowercase name doubles as the listing service's `variety` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Whiskey,
    Rum,
    Agave,
    Gin,
    Vodka,
    Brandy,
    Liqueur,
}

impl Category {
    /// Every category, in canonical crawl order.
    pub const ALL: [Category; 7] = [
        Category::Whiskey,
        Category::Rum,
        Category::Agave,
        Category::Gin,
        Category::Vodka,
        Category::Brandy,
        Category::Liqueur,
    ];

    /// Lowercase identifier sent as `variety`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Whiskey => "whiskey",
            Category::Rum => "rum",
            Category::Agave => "agave",
            Category::Gin => "gin",
            Category::Vodka => "vodka",
            Category::Brandy => "brandy",
            Category::Liqueur => "liqueur",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = CatalogError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| CatalogError::validation(format!("unknown category '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// RawRecord
// ---------------------------------------------------------------------------

/// Opaque external record as returned by a listing page or import source.
///
/// The shape is owned by the source; only the normalizer looks inside.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(pub Map<String, Value>);

impl RawRecord {
    /// Look up a source field by its exact key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Wrap a JSON value, accepting only objects.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }
}

impl From<Map<String, Value>> for RawRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

// ---------------------------------------------------------------------------
// CanonicalEntry / IndexEntry
// ---------------------------------------------------------------------------

/// The unified, source-agnostic representation of one catalog item.
///
/// Absent source fields are empty strings, never missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEntry {
    /// Catalog-wide unique identifier (`origin:source-id`).
    pub id: String,
    pub name: String,
    pub distiller: String,
    pub bottler: String,
    /// Spirit type, e.g. "Single Malt".
    #[serde(rename = "type")]
    pub spirit_type: String,
    /// Alcohol by volume, in percent.
    pub abv: f64,
    pub age: String,
    pub description: String,
}

impl CanonicalEntry {
    /// The searchable projection of this entry.
    pub fn index_entry(&self) -> IndexEntry {
        IndexEntry {
            id: self.id.clone(),
            name: self.name.clone(),
            distiller: self.distiller.clone(),
            bottler: self.bottler.clone(),
            spirit_type: self.spirit_type.clone(),
        }
    }
}

/// The subset of [`CanonicalEntry`] fields eligible for text search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub name: String,
    pub distiller: String,
    pub bottler: String,
    #[serde(rename = "type")]
    pub spirit_type: String,
}

// ---------------------------------------------------------------------------
// PageCursor
// ---------------------------------------------------------------------------

/// Sentinel for "total page count not yet known".
pub const UNKNOWN_TOTAL_PAGES: i64 = -1;

/// Pagination state for one category crawl.
///
/// `total_pages` is the running maximum of every value reported so far, which
/// tolerates an early page under-reporting the total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    pub category: Category,
    /// Next page to request (1-based).
    pub page_number: u32,
    pub total_pages: i64,
}

impl PageCursor {
    /// A fresh cursor positioned at page 1 with an unknown total.
    pub fn new(category: Category) -> Self {
        Self {
            category,
            page_number: 1,
            total_pages: UNKNOWN_TOTAL_PAGES,
        }
    }

    /// Fold a page's reported total into the running maximum and move to the next page.
    pub fn advance(&mut self, reported_total: i64) {
        self.total_pages = self.total_pages.max(reported_total);
        self.page_number += 1;
    }

    /// True once the next page lies beyond the highest total seen.
    pub fn is_exhausted(&self) -> bool {
        i64::from(self.page_number) > self.total_pages
    }
}

// ---------------------------------------------------------------------------
// Source schemas
// ---------------------------------------------------------------------------

/// Per-canonical-field list of candidate source keys; the first present key wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    #[serde(default)]
    pub id: Vec<String>,
    #[serde(default)]
    pub name: Vec<String>,
    #[serde(default)]
    pub distiller: Vec<String>,
    #[serde(default)]
    pub bottler: Vec<String>,
    #[serde(default, rename = "type")]
    pub spirit_type: Vec<String>,
    #[serde(default)]
    pub abv: Vec<String>,
    #[serde(default)]
    pub age: Vec<String>,
    #[serde(default)]
    pub description: Vec<String>,
}

/// Field-mapping table for one external origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSchema {
    /// Origin name; prefixes every id produced from this source.
    pub origin: String,
    #[serde(default)]
    pub fields: FieldMapping,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_roundtrip() {
        for category in Category::ALL {
            let parsed: Category = category.to_string().parse().expect("parse category");
            assert_eq!(parsed, category);
        }
        assert_eq!("  Gin ".parse::<Category>().unwrap(), Category::Gin);
        assert!("beer".parse::<Category>().is_err());
    }

    #[test]
    fn category_serializes_lowercase() {
        let json = serde_json::to_string(&vec![Category::Agave, Category::Liqueur]).unwrap();
        assert_eq!(json, r#"["agave","liqueur"]"#);
    }

    #[test]
    fn cursor_tracks_running_maximum() {
        let mut cursor = PageCursor::new(Category::Rum);
        assert_eq!(cursor.page_number, 1);
        assert!(cursor.is_exhausted());

        cursor.advance(3);
        cursor.advance(2);
        assert_eq!(cursor.total_pages, 3);
        assert_eq!(cursor.page_number, 3);
        assert!(!cursor.is_exhausted());

        cursor.advance(1);
        assert!(cursor.is_exhausted());
    }

    #[test]
    fn cursor_stops_after_first_page_when_total_is_zero() {
        let mut cursor = PageCursor::new(Category::Gin);
        cursor.advance(0);
        assert_eq!(cursor.total_pages, 0);
        assert!(cursor.is_exhausted());
    }

    #[test]
    fn canonical_entry_uses_type_key() {
        let entry = CanonicalEntry {
            id: "listing:1".into(),
            name: "Macallan 12".into(),
            spirit_type: "Single Malt".into(),
            abv: 43.0,
            ..Default::default()
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "Single Malt");
        assert_eq!(json["description"], "");

        let index = entry.index_entry();
        assert_eq!(index.name, "Macallan 12");
        assert_eq!(index.spirit_type, "Single Malt");
    }

    #[test]
    fn raw_record_accepts_only_objects() {
        assert!(RawRecord::from_value(serde_json::json!({"title": "x"})).is_some());
        assert!(RawRecord::from_value(serde_json::json!(["x"])).is_none());
    }

    #[test]
    fn source_schema_from_toml() {
        let schema: SourceSchema = toml::from_str(
            r#"
origin = "cellar"
[fields]
id = ["sku"]
name = ["label", "title"]
type = ["kind"]
"#,
        )
        .expect("parse schema");
        assert_eq!(schema.fields.name, vec!["label", "title"]);
        assert_eq!(schema.fields.spirit_type, vec!["kind"]);
        assert!(schema.fields.bottler.is_empty());
    }
}
