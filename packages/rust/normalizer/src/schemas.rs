//! Built-in field-mapping tables and the origin registry.

use std::collections::BTreeMap;

use wateroflife_shared::{CatalogError, FieldMapping, Result, SourceSchema};

fn keys(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| (*s).to_string()).collect()
}

/// Mapping tables for the origins the catalog was seeded from.
///
/// - `listing`: the paginated spirits listing service (`spirits[]` records).
/// - `bottleraiders`: the stat-extractor JSON dump (`Title`, `Distiller`, `ABV`, ...).
/// - `whiskybase`: the sitemap scraper dump (`Name`, `Distillery`, `Strength`, ...).
pub fn builtin_schemas() -> Vec<SourceSchema> {
    vec![
        SourceSchema {
            origin: "listing".into(),
            fields: FieldMapping {
                id: keys(&["id", "ID", "permalink"]),
                name: keys(&["title", "name"]),
                distiller: keys(&["distiller", "Distiller"]),
                bottler: keys(&["bottler", "Bottler"]),
                spirit_type: keys(&["type", "Type"]),
                abv: keys(&["abv", "ABV"]),
                age: keys(&["age", "Age"]),
                description: keys(&["description", "excerpt"]),
            },
        },
        SourceSchema {
            origin: "bottleraiders".into(),
            fields: FieldMapping {
                id: keys(&["permalink"]),
                name: keys(&["Title", "title"]),
                distiller: keys(&["Distiller"]),
                bottler: keys(&["Bottler"]),
                spirit_type: keys(&["Type", "type"]),
                abv: keys(&["ABV"]),
                age: keys(&["Age"]),
                description: keys(&["Description"]),
            },
        },
        SourceSchema {
            origin: "whiskybase".into(),
            fields: FieldMapping {
                id: keys(&["Barcode"]),
                name: keys(&["Name"]),
                distiller: keys(&["Distillery"]),
                bottler: keys(&["Bottler", "Bottled by"]),
                spirit_type: keys(&["Category"]),
                abv: keys(&["Strength"]),
                age: keys(&["Stated Age"]),
                description: keys(&["Cask Type"]),
            },
        },
    ]
}

/// Origin name → mapping table. Configured sources replace built-ins of the same name.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, SourceSchema>,
}

impl SchemaRegistry {
    /// Registry pre-populated with [`builtin_schemas`].
    pub fn with_builtins() -> Self {
        let mut registry = Self::default();
        for schema in builtin_schemas() {
            registry.register(schema);
        }
        registry
    }

    /// Built-ins overlaid with the `[[sources]]` tables from config.
    pub fn from_config(sources: &[SourceSchema]) -> Self {
        let mut registry = Self::with_builtins();
        for schema in sources {
            registry.register(schema.clone());
        }
        registry
    }

    /// Add or replace the schema for `schema.origin`.
    pub fn register(&mut self, schema: SourceSchema) {
        self.schemas.insert(schema.origin.clone(), schema);
    }

    /// Look up an origin's schema.
    pub fn get(&self, origin: &str) -> Result<&SourceSchema> {
        self.schemas.get(origin).ok_or_else(|| {
            CatalogError::config(format!(
                "unknown source '{origin}' (known: {})",
                self.origins().join(", ")
            ))
        })
    }

    /// Registered origin names, sorted.
    pub fn origins(&self) -> Vec<&str> {
        self.schemas.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_registered() {
        let registry = SchemaRegistry::with_builtins();
        assert_eq!(registry.origins(), vec!["bottleraiders", "listing", "whiskybase"]);
    }

    #[test]
    fn config_source_overrides_builtin() {
        let custom = SourceSchema {
            origin: "listing".into(),
            fields: FieldMapping {
                name: keys(&["label"]),
                ..Default::default()
            },
        };
        let registry = SchemaRegistry::from_config(&[custom]);
        assert_eq!(registry.get("listing").unwrap().fields.name, vec!["label"]);
    }

    #[test]
    fn unknown_origin_lists_known_ones() {
        let registry = SchemaRegistry::with_builtins();
        let err = registry.get("cellar").unwrap_err();
        assert!(err.to_string().contains("unknown source 'cellar'"));
        assert!(err.to_string().contains("whiskybase"));
    }
}
