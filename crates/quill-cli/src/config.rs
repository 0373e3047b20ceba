//! CLI configuration
//!
//! Stored as TOML at `<config dir>/quill/config.toml`. Every key has a
//! default, so a missing file or a partial one is fine.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::ValueEnum;
use quill_search::{BackendKind, SearchConfig};
use serde::{Deserialize, Serialize};

/// Default config file location
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("quill")
        .join("config.toml")
}

/// Get default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("quill")
}

/// Relational store backing the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Redb,
    Sqlite,
    Memory,
}

impl StoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Redb => "redb",
            Self::Sqlite => "sqlite",
            Self::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

/// Configuration for the CLI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    pub store: StoreKind,
    pub search: SearchConfig,
    pub server: ServerConfig,
}

impl Config {
    /// Load from a file; a missing file yields the defaults
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Data directory, falling back to the platform default
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    /// Every settable key
    pub fn keys() -> &'static [&'static str] {
        &[
            "data_dir",
            "store",
            "search.backend",
            "search.index_path",
            "search.solr_url",
            "search.timeout_ms",
            "search.rows",
            "search.facet_fields",
            "server.bind",
        ]
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let value = match key {
            "data_dir" => self.data_dir().display().to_string(),
            "store" => self.store.as_str().to_string(),
            "search.backend" => self.search.backend.to_string(),
            "search.index_path" => self
                .search
                .index_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(data_dir/index)".to_string()),
            "search.solr_url" => self.search.solr_url.clone(),
            "search.timeout_ms" => self.search.timeout_ms.to_string(),
            "search.rows" => self.search.rows.to_string(),
            "search.facet_fields" => self.search.facet_fields.join(","),
            "server.bind" => self.server.bind.clone(),
            _ => return None,
        };
        Some(value)
    }

    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "data_dir" => self.data_dir = Some(PathBuf::from(value)),
            "store" => {
                self.store = StoreKind::from_str(value, true)
                    .map_err(|e| anyhow::anyhow!("invalid store '{}': {}", value, e))?
            }
            "search.backend" => self.search.backend = value.parse::<BackendKind>()?,
            "search.index_path" => self.search.index_path = Some(PathBuf::from(value)),
            "search.solr_url" => self.search.solr_url = value.to_string(),
            "search.timeout_ms" => {
                self.search.timeout_ms = value.parse().context("timeout_ms must be an integer")?
            }
            "search.rows" => self.search.rows = value.parse().context("rows must be an integer")?,
            "search.facet_fields" => {
                self.search.facet_fields = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            }
            "server.bind" => self.server.bind = value.to_string(),
            _ => anyhow::bail!(
                "Unknown config key: {}. Available keys: {}",
                key,
                Self::keys().join(", ")
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_key_is_gettable() {
        let config = Config::default();
        for key in Config::keys() {
            assert!(config.get(key).is_some(), "missing key {}", key);
        }
        assert!(config.get("nope").is_none());
    }

    #[test]
    fn test_set_and_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.set("search.backend", "memory").unwrap();
        config.set("search.facet_fields", "name, tags").unwrap();
        config.set("store", "sqlite").unwrap();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.search.facet_fields, vec!["name", "tags"]);
        assert!(config.set("search.rows", "many").is_err());
        assert!(config.set("search.backend", "elastic").is_err());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str("[search]\nrows = 3\n").unwrap();
        assert_eq!(config.search.rows, 3);
        assert_eq!(config.search.timeout_ms, 5_000);
        assert_eq!(config.server.bind, "127.0.0.1:8080");
    }
}
