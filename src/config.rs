use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::controller::{
    ControllerConfig, DEFAULT_BACKOFF_BASE, DEFAULT_DEBOUNCE, DEFAULT_MAX_RETRIES,
    DEFAULT_MIN_QUERY_CHARS,
};
use crate::fetcher::DEFAULT_PAGE_SIZE;
use crate::types::CollectionSelector;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct BackendConfig {
    pub endpoint: Option<String>,
    pub api_key_env: Option<String>,
    pub api_key_command: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub page_size: u32,
    pub debounce_ms: u64,
    pub min_query_chars: usize,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub collection: CollectionSelector,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            debounce_ms: DEFAULT_DEBOUNCE.as_millis() as u64,
            min_query_chars: DEFAULT_MIN_QUERY_CHARS,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base_ms: DEFAULT_BACKOFF_BASE.as_millis() as u64,
            collection: CollectionSelector::default(),
        }
    }
}

impl SelectorConfig {
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            // A zero page size would never make progress.
            page_size: self.page_size.max(1),
            debounce: Duration::from_millis(self.debounce_ms),
            min_query_chars: self.min_query_chars,
            max_retries: self.max_retries,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            selector: self.collection,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub selector: SelectorConfig,
}

pub fn config_dir() -> Option<PathBuf> {
    Some(dirs::config_dir()?.join("roster"))
}

fn config_path() -> Option<PathBuf> {
    Some(config_dir()?.join("config.toml"))
}

impl Config {
    pub fn load() -> Self {
        let Some(path) = config_path() else {
            return Config::default();
        };

        let Ok(content) = std::fs::read_to_string(&path) else {
            return Config::default();
        };

        match Self::parse(&content) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring invalid config");
                Config::default()
            }
        }
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn api_key_env(&self) -> &str {
        self.backend
            .api_key_env
            .as_deref()
            .unwrap_or("ROSTER_API_KEY")
    }
}
