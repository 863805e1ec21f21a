//! Configuration file support
//!
//! Optional TOML settings that complement the command line.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::DEFAULT_PROGRESS_INTERVAL;

/// Configuration file format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Logging settings
    pub logging: Option<LoggingSettings>,
    /// Indexing settings
    pub index: Option<IndexSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSettings {
    /// Bytes between progress reports, in KiB
    pub progress_interval_kb: Option<u64>,
}

impl ConfigFile {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: ConfigFile = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Log level, `info` unless configured
    pub fn log_level(&self) -> &str {
        self.logging.as_ref().map_or("info", |l| l.level.as_str())
    }

    pub fn json_logs(&self) -> bool {
        self.logging
            .as_ref()
            .and_then(|l| l.format.as_deref())
            .is_some_and(|f| f.eq_ignore_ascii_case("json"))
    }

    /// Progress interval in bytes
    pub fn progress_interval(&self) -> u64 {
        self.index
            .as_ref()
            .and_then(|i| i.progress_interval_kb)
            .map_or(DEFAULT_PROGRESS_INTERVAL, |kb| kb.max(1) * 1024)
    }
}
