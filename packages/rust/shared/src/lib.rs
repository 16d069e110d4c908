//! Shared types, error model, and configuration for the spirits catalog.
//!
//! This crate is the foundation depended on by all other workspace crates.
//! It provides:
//! - [`CatalogError`]: the unified error type
//! - Domain types ([`Category`], [`RawRecord`], [`CanonicalEntry`], [`IndexEntry`], [`PageCursor`])
//! - Configuration ([`AppConfig`], [`CrawlConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CrawlConfig, DefaultsConfig, ListingConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from, validate_config,
};
pub use error::{CatalogError, Result};
pub use types::{
    CanonicalEntry, Category, FieldMapping, IndexEntry, PageCursor, RawRecord, SourceSchema,
    UNKNOWN_TOTAL_PAGES,
};
