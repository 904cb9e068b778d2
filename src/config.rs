//! Configuration management for treewatch
//!
//! This module provides configuration structures and defaults for the
//! directory watcher and the tracked seed list. Values come from an optional
//! TOML file, then environment variables, then command-line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::seeds::SeedGrammar;

/// Global configuration for treewatch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreewatchConfig {
    /// File watcher configuration
    pub watcher: WatcherConfig,
    /// Seed list configuration
    pub seeds: SeedConfig,
}

/// Configuration for file watching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Delay after the first event of a batch before it is processed, in milliseconds
    pub quiescence_ms: u64,
    /// Lifetime of a self-write suppression entry in milliseconds
    pub suppression_ms: u64,
}

/// Configuration for the tracked seed list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    /// Seed list to keep loaded, if any
    pub file: Option<PathBuf>,
    /// How seed lines are parsed
    pub grammar: SeedGrammar,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            quiescence_ms: 400,
            suppression_ms: 600,
        }
    }
}

impl WatcherConfig {
    /// Get quiescence duration
    pub fn quiescence_duration(&self) -> Duration {
        Duration::from_millis(self.quiescence_ms)
    }

    /// Get suppression duration
    pub fn suppression_duration(&self) -> Duration {
        Duration::from_millis(self.suppression_ms)
    }
}

/// Configuration loading and management
impl TreewatchConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Load the given file, or fall back to defaults when no file is given.
    /// Environment variables are applied on top either way.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        if let Ok(val) = std::env::var("TREEWATCH_QUIESCENCE_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                self.watcher.quiescence_ms = ms;
            }
        }

        if let Ok(val) = std::env::var("TREEWATCH_SUPPRESSION_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                self.watcher.suppression_ms = ms;
            }
        }

        if let Ok(val) = std::env::var("TREEWATCH_SEED_FILE") {
            if !val.is_empty() {
                self.seeds.file = Some(PathBuf::from(val));
            }
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.watcher.suppression_ms < self.watcher.quiescence_ms {
            return Err(format!(
                "suppression_ms ({}) must not be shorter than quiescence_ms ({})",
                self.watcher.suppression_ms, self.watcher.quiescence_ms
            ));
        }

        if self.watcher.suppression_ms == 0 {
            return Err("suppression_ms must be greater than 0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TreewatchConfig::default();

        assert_eq!(config.watcher.quiescence_ms, 400);
        assert_eq!(config.watcher.suppression_ms, 600);
        assert_eq!(config.seeds.file, None);
        assert_eq!(config.seeds.grammar, SeedGrammar::Numeric);
    }

    #[test]
    fn test_config_validation() {
        let mut config = TreewatchConfig::default();
        assert!(config.validate().is_ok());

        config.watcher.suppression_ms = 100;
        assert!(config.validate().is_err());

        config.watcher.quiescence_ms = 0;
        config.watcher.suppression_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duration_conversions() {
        let config = WatcherConfig::default();

        assert_eq!(config.quiescence_duration(), Duration::from_millis(400));
        assert_eq!(config.suppression_duration(), Duration::from_millis(600));
    }

    #[test]
    fn test_partial_toml() {
        let config: TreewatchConfig = toml::from_str(
            r#"
            [watcher]
            quiescence_ms = 250

            [seeds]
            file = "seedchecker/seedlist.txt"
            grammar = "text"
            "#,
        )
        .unwrap();

        assert_eq!(config.watcher.quiescence_ms, 250);
        assert_eq!(config.watcher.suppression_ms, 600);
        assert_eq!(config.seeds.file, Some(PathBuf::from("seedchecker/seedlist.txt")));
        assert_eq!(config.seeds.grammar, SeedGrammar::Text);
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("treewatch.toml");
        std::fs::write(&path, "[watcher]\nsuppression_ms = 900\n").unwrap();

        let config = TreewatchConfig::load(&path).unwrap();
        assert_eq!(config.watcher.suppression_ms, 900);

        assert!(TreewatchConfig::load(temp_dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_env_config_loading() {
        std::env::set_var("TREEWATCH_QUIESCENCE_MS", "150");
        std::env::set_var("TREEWATCH_SEED_FILE", "seeds.txt");

        let config = TreewatchConfig::from_env();

        assert_eq!(config.watcher.quiescence_ms, 150);
        assert_eq!(config.seeds.file, Some(PathBuf::from("seeds.txt")));

        // Cleanup
        std::env::remove_var("TREEWATCH_QUIESCENCE_MS");
        std::env::remove_var("TREEWATCH_SEED_FILE");
    }
}
