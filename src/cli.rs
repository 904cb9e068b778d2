use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};

use crate::config::TreewatchConfig;
use crate::seeds::SeedGrammar;

#[derive(Parser, Debug)]
#[command(name = "treewatch")]
#[command(author = "Treewatch Team")]
#[command(version = "0.2.0")]
#[command(about = "Recursive directory watcher with a self-write aware seed list")]
#[command(long_about = "Treewatch watches a directory tree, keeps watches in step as subdirectories come and go, and reports file and directory changes. It can keep a seed list file loaded, reloading it when it is edited outside the program while ignoring its own saves.")]
pub struct Cli {
    /// Directory to watch for changes
    #[arg(value_name = "PATH", help = "Path to watch (defaults to current directory)")]
    pub path: Option<PathBuf>,

    /// Seed list kept loaded while watching
    #[arg(long, value_name = "FILE", help = "Seed list file to track")]
    pub seed_file: Option<PathBuf>,

    /// Accept text seeds, hashed the way Java's String.hashCode does
    #[arg(long, help = "Hash non-numeric seed lines instead of skipping them")]
    pub text_seeds: bool,

    /// Configuration file
    #[arg(long, value_name = "FILE", help = "TOML configuration file")]
    pub config: Option<PathBuf>,

    /// Quiescence delay in milliseconds
    #[arg(long, help = "Delay before processing a batch of events, in ms")]
    pub quiescence_ms: Option<u64>,

    /// Suppression window in milliseconds
    #[arg(long, help = "How long our own writes stay suppressed, in ms")]
    pub suppression_ms: Option<u64>,

    /// Output format
    #[arg(long, default_value = "text", help = "Output format")]
    pub output: OutputFormat,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    /// Disable colors in output
    #[arg(long, help = "Disable colored output")]
    pub no_color: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output with an interactive command prompt
    Text,
    /// JSON output for scripting
    Json,
    /// Compact single-line format
    Compact,
}

impl Cli {
    pub fn get_watch_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        })
    }

    pub fn setup_logging(&self) {
        let level = if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        };

        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_ansi(!self.no_color)
            .with_writer(std::io::stderr)
            .init();
    }

    pub fn validate(&self) -> Result<(), String> {
        let path = self.get_watch_path();

        if !path.exists() {
            return Err(format!("Path does not exist: {}", path.display()));
        }

        if !path.is_dir() {
            return Err(format!("Path is not a directory: {}", path.display()));
        }

        if let Some(seed_file) = &self.seed_file {
            if seed_file.is_dir() {
                return Err(format!("Seed file is a directory: {}", seed_file.display()));
            }
        }

        if let Some(config) = &self.config {
            if !config.is_file() {
                return Err(format!("Config file does not exist: {}", config.display()));
            }
        }

        Ok(())
    }

    /// Builds the effective configuration: file, then environment, then
    /// command-line flags.
    pub fn resolve_config(&self) -> Result<TreewatchConfig> {
        let mut config = TreewatchConfig::load_or_default(self.config.as_deref())?;

        if let Some(ms) = self.quiescence_ms {
            config.watcher.quiescence_ms = ms;
        }
        if let Some(ms) = self.suppression_ms {
            config.watcher.suppression_ms = ms;
        }
        if let Some(seed_file) = &self.seed_file {
            config.seeds.file = Some(seed_file.clone());
        }
        if self.text_seeds {
            config.seeds.grammar = SeedGrammar::Text;
        }

        config.validate().map_err(anyhow::Error::msg)?;
        Ok(config)
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            path: None,
            seed_file: None,
            text_seeds: false,
            config: None,
            quiescence_ms: None,
            suppression_ms: None,
            output: OutputFormat::Text,
            verbose: false,
            no_color: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_flags() {
        let cli = Cli::parse_from([
            "treewatch",
            "/tmp",
            "--seed-file",
            "seedchecker/seedlist.txt",
            "--text-seeds",
            "--output",
            "json",
            "--quiescence-ms",
            "100",
        ]);

        assert_eq!(cli.path, Some(PathBuf::from("/tmp")));
        assert_eq!(cli.seed_file, Some(PathBuf::from("seedchecker/seedlist.txt")));
        assert!(cli.text_seeds);
        assert_eq!(cli.output, OutputFormat::Json);
        assert_eq!(cli.quiescence_ms, Some(100));
        assert_eq!(cli.suppression_ms, None);
    }

    #[test]
    fn test_validate_rejects_file_root() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let file = temp_dir.path().join("file.txt");
        std::fs::write(&file, "x").unwrap();

        let cli = Cli {
            path: Some(file),
            ..Cli::default()
        };
        assert!(cli.validate().is_err());

        let cli = Cli {
            path: Some(temp_dir.path().to_path_buf()),
            ..Cli::default()
        };
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_flags_override_config_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("treewatch.toml");
        std::fs::write(&config_path, "[watcher]\nquiescence_ms = 300\nsuppression_ms = 800\n").unwrap();

        let cli = Cli {
            config: Some(config_path),
            suppression_ms: Some(1000),
            text_seeds: true,
            ..Cli::default()
        };
        let config = cli.resolve_config().unwrap();

        assert_eq!(config.watcher.suppression_ms, 1000);
        assert_eq!(config.seeds.grammar, SeedGrammar::Text);
    }

    #[test]
    fn test_resolve_rejects_short_suppression() {
        let cli = Cli {
            quiescence_ms: Some(500),
            suppression_ms: Some(100),
            ..Cli::default()
        };
        assert!(cli.resolve_config().is_err());
    }
}
