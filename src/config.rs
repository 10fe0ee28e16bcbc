//! Store configuration: serde defaults, then an optional TOML/YAML/JSON file, then
//! `STOCKFLOW__*` environment variables.
use super::error::StockResult;
use super::store::Store;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

const DEFAULT_FILE: &str = "stockflow";
const ENV_PREFIX: &str = "STOCKFLOW";

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct StoreConfig {
    /// Database directory.
    #[serde(default = "default_path")]
    pub path: PathBuf,

    /// Delete the database when the last handle drops. Used by tests and demos.
    #[serde(default)]
    pub temporary: bool,

    /// sled page cache size in bytes.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,

    /// Background flush interval; `None` flushes only on demand.
    #[serde(default = "default_flush_every_ms")]
    pub flush_every_ms: Option<u64>,

    /// Default page size for movement-log listings.
    #[serde(default = "default_log_page_limit")]
    pub log_page_limit: usize,
}

fn default_path() -> PathBuf {
    PathBuf::from("stockflow.db")
}

fn default_cache_capacity() -> u64 {
    64 * 1024 * 1024
}

fn default_flush_every_ms() -> Option<u64> {
    Some(500)
}

fn default_log_page_limit() -> usize {
    100
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            temporary: false,
            cache_capacity: default_cache_capacity(),
            flush_every_ms: default_flush_every_ms(),
            log_page_limit: default_log_page_limit(),
        }
    }
}

impl StoreConfig {
    /// `./stockflow.{toml,yaml,json}` if present, then the environment.
    pub fn load() -> StockResult<Self> {
        Self::build(File::with_name(DEFAULT_FILE).required(false))
    }

    pub fn load_from(path: &Path) -> StockResult<Self> {
        Self::build(File::from(path).required(true))
    }

    fn build<S>(file: S) -> StockResult<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config = Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// In-memory style database that is removed on drop.
    pub fn temporary() -> Self {
        Self {
            temporary: true,
            flush_every_ms: None,
            ..Self::default()
        }
    }

    pub fn open(&self) -> StockResult<Store> {
        let mut sled_config = sled::Config::new()
            .temporary(self.temporary)
            .cache_capacity(self.cache_capacity)
            .flush_every_ms(self.flush_every_ms);
        // temporary databases get a private scratch path from sled
        if !self.temporary {
            sled_config = sled_config.path(&self.path);
        }
        let db = sled_config.open()?;
        info!(path = %self.path.display(), temporary = self.temporary, "store opened");
        Store::from_db(db)
    }
}
