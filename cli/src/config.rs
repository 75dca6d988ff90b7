//! CLI configuration file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use tokenindex_core::IndexerConfig;

use crate::logging::LogConfig;

/// Default database path when neither `--db` nor the config names one.
pub const DEFAULT_DB: &str = "./tokenindex.db";

/// Contents of the JSON file passed with `--config`. Every field is optional.
///
/// ```json
/// {
///   "db": "/var/lib/tokenindex/index.db",
///   "indexer": { "activation_height": 866600, "max_page_size": 50 },
///   "log": { "level": "info", "components": { "tokenindex-core": "debug" } }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub db: Option<String>,
    pub indexer: IndexerConfig,
    pub log: LogConfig,
}

impl CliConfig {
    /// Read `path`, or fall back to defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.indexer.validate()?;
        Ok(config)
    }

    /// `--db` wins over the file, which wins over [`DEFAULT_DB`].
    pub fn db_path(&self, flag: Option<&str>) -> String {
        flag.map(str::to_string)
            .or_else(|| self.db.clone())
            .unwrap_or_else(|| DEFAULT_DB.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = CliConfig::from_json(r#"{ "indexer": { "activation_height": 866600 } }"#).unwrap();
        assert_eq!(config.indexer.activation_height, 866_600);
        assert_eq!(config.indexer.max_page_size, 100);
        assert_eq!(config.log, LogConfig::default());
        assert!(config.db.is_none());
    }

    #[test]
    fn invalid_indexer_config_is_rejected() {
        let err = CliConfig::from_json(r#"{ "indexer": { "max_page_size": 0 } }"#).unwrap_err();
        assert!(err.to_string().contains("max_page_size"));
    }

    #[test]
    fn db_flag_overrides_file() {
        let config = CliConfig {
            db: Some("from-file.db".into()),
            ..CliConfig::default()
        };
        assert_eq!(config.db_path(Some("flag.db")), "flag.db");
        assert_eq!(config.db_path(None), "from-file.db");
        assert_eq!(CliConfig::default().db_path(None), DEFAULT_DB);
    }
}
