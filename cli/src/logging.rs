//! Log setup for the `tokenindex` binary. Logs go to stderr so stdout stays
//! parseable JSON.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// `log` section of the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Level for everything not named in `components`.
    #[serde(default = "default_level")]
    pub level: String,
    /// Per-crate levels, e.g. `"tokenindex-core": "debug"`.
    #[serde(default)]
    pub components: BTreeMap<String, String>,
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "warn".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            components: BTreeMap::new(),
            json: false,
        }
    }
}

impl LogConfig {
    /// Fold `--log-level` and `--json-logs` over the file settings.
    pub fn apply_flags(&mut self, level: Option<&str>, json: bool) {
        if let Some(level) = level {
            self.level = level.to_string();
        }
        self.json |= json;
    }

    /// Filter directives, e.g. `"warn,sqlx=warn,tokenindex_core=debug"`.
    ///
    /// sqlx logs every statement at `info`; it stays at `warn` unless a
    /// component entry names it.
    pub fn directives(&self) -> Result<String> {
        let mut directives = vec![format!("{}", parse_level(&self.level)?)];
        if !self.components.contains_key("sqlx") {
            directives.push("sqlx=warn".to_string());
        }
        for (component, level) in &self.components {
            let level = parse_level(level).with_context(|| format!("log component {component}"))?;
            directives.push(format!("{}={level}", component.replace('-', "_")));
        }
        Ok(directives.join(","))
    }

    /// `rust_log` (the `RUST_LOG` variable) wins over the configuration.
    fn filter(&self, rust_log: Option<&str>) -> Result<EnvFilter> {
        let directives = match rust_log {
            Some(raw) if !raw.trim().is_empty() => raw.to_string(),
            _ => self.directives()?,
        };
        EnvFilter::try_new(&directives).with_context(|| format!("invalid log filter {directives:?}"))
    }
}

fn parse_level(raw: &str) -> Result<LevelFilter> {
    raw.parse::<LevelFilter>()
        .map_err(|_| anyhow::anyhow!("unknown log level {raw:?}"))
}

/// Install the global subscriber for this process.
pub fn init(config: &LogConfig) -> Result<()> {
    let filter = config.filter(std::env::var("RUST_LOG").ok().as_deref())?;
    let registry = tracing_subscriber::registry().with(filter);
    if config.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()?;
    }
    Ok(())
}
