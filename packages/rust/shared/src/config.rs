//! Application configuration for the catalog pipeline.
//!
//! User config lives at `~/.wateroflife/wateroflife.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{CatalogError, Result};
use crate::types::{Category, SourceSchema};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "wateroflife.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".wateroflife";

// ---------------------------------------------------------------------------
// Config structs (matching wateroflife.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Remote listing service settings.
    #[serde(default)]
    pub listing: ListingConfig,

    /// Additional origins with their own field-mapping tables.
    #[serde(default)]
    pub sources: Vec<SourceSchema>,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Catalog database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Directory receiving one raw-record artifact per category.
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: String,

    /// Categories crawled by `ingest`.
    #[serde(default = "default_categories")]
    pub categories: Vec<Category>,

    /// Maximum categories crawled at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            artifact_dir: default_artifact_dir(),
            categories: default_categories(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_database_path() -> String {
    "var/wateroflife.db".into()
}
fn default_artifact_dir() -> String {
    "var/raw".into()
}
fn default_categories() -> Vec<Category> {
    Category::ALL.to_vec()
}
fn default_concurrency() -> u32 {
    4
}

/// `[listing]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingConfig {
    /// Listing endpoint receiving the form-encoded page requests.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Name of the env var holding the bearer token (never store the token itself).
    /// Empty means requests go out unauthenticated.
    #[serde(default = "default_credential_env")]
    pub credential_env: String,

    /// Per-request deadline.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Minimum ms between consecutive page requests of one category.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_ms: u64,

    /// Retries on transient failures (0 disables retry).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff delay, doubled on each retry.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,

    /// Origin whose field mapping normalizes crawled records.
    #[serde(default = "default_source")]
    pub source: String,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            credential_env: default_credential_env(),
            request_timeout_secs: default_request_timeout(),
            rate_limit_ms: default_rate_limit(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base(),
            source: default_source(),
        }
    }
}

fn default_endpoint() -> String {
    "https://www.bottleraiders.com/api/spirits".into()
}
fn default_credential_env() -> String {
    "WATEROFLIFE_LISTING_TOKEN".into()
}
fn default_request_timeout() -> u64 {
    30
}
fn default_rate_limit() -> u64 {
    250
}
fn default_max_retries() -> u32 {
    3
}
fn default_backoff_base() -> u64 {
    500
}
fn default_source() -> String {
    "listing".into()
}

// ---------------------------------------------------------------------------
// Crawl config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime crawl configuration for the listing client.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Listing endpoint.
    pub endpoint: String,
    /// Env var holding the listing credential.
    pub credential_env: String,
    /// Per-request deadline.
    pub request_timeout: Duration,
    /// Delay inserted before every page request after the first.
    pub rate_limit_ms: u64,
    /// Retries on transient failures.
    pub max_retries: u32,
    /// Initial backoff delay.
    pub backoff_base_ms: u64,
}

impl From<&AppConfig> for CrawlConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            endpoint: config.listing.endpoint.clone(),
            credential_env: config.listing.credential_env.clone(),
            request_timeout: Duration::from_secs(config.listing.request_timeout_secs),
            rate_limit_ms: config.listing.rate_limit_ms,
            max_retries: config.listing.max_retries,
            backoff_base_ms: config.listing.backoff_base_ms,
        }
    }
}

impl CrawlConfig {
    /// Backoff before retry number `attempt` (1-based): `base * 2^(attempt-1)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor))
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.wateroflife/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| CatalogError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.wateroflife/wateroflife.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| CatalogError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| CatalogError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| CatalogError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| CatalogError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| CatalogError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject configurations the ingestion job cannot run with.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.defaults.categories.is_empty() {
        return Err(CatalogError::config("no categories configured"));
    }
    if config.defaults.concurrency == 0 {
        return Err(CatalogError::config("concurrency must be at least 1"));
    }
    Url::parse(&config.listing.endpoint).map_err(|e| {
        CatalogError::config(format!(
            "invalid listing endpoint '{}': {e}",
            config.listing.endpoint
        ))
    })?;

    let mut seen = std::collections::HashSet::new();
    for source in &config.sources {
        if source.origin.trim().is_empty() {
            return Err(CatalogError::config("source with empty origin"));
        }
        if !seen.insert(source.origin.as_str()) {
            return Err(CatalogError::config(format!(
                "duplicate source origin '{}'",
                source.origin
            )));
        }
    }
    Ok(())
}
