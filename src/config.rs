use anyhow::Context;
use serde::Deserialize;
use std::{path::Path, path::PathBuf, time::Duration};

#[derive(Debug, Deserialize)]
pub struct Config {
    pub version: u32,
    pub database: Database,
    #[serde(default)]
    pub catalog: CatalogConfig,
    pub http: HttpConfig,
    #[serde(default)]
    pub player: PlayerConfig,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Config> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.to_string_lossy()))?;
        toml::from_str(&contents).with_context(|| "Failed to parse config TOML")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub bind_addr: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Database {
    #[serde(default)]
    pub in_memory: bool,
    pub path: Option<PathBuf>,
}

/// Where and how track codes are resolved
#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    /// remote catalog service; local catalog only if absent
    pub base_url: Option<String>,
    /// how long a scan waits for metadata before recording placeholders
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_cache_remote")]
    pub cache_remote: bool,
}

impl CatalogConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: default_timeout_ms(),
            cache_remote: default_cache_remote(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    3000
}

fn default_cache_remote() -> bool {
    true
}

/// Base of the links handed to the playback screen
#[derive(Debug, Deserialize, Clone)]
pub struct PlayerConfig {
    pub base_url: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            base_url: "unheard://app".to_string(),
        }
    }
}
