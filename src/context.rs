//! Shared application state.
//!
//! One `WatchContext` is built at startup and handed to everything that
//! needs the configuration or the write suppression lock, so the seed list
//! and the watcher agree on which writes are our own.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use crate::config::TreewatchConfig;
use crate::core::{Callbacks, DirectoryWatcher, WatchError, WriteSuppressionLock};
use crate::seeds::SeedFile;

#[derive(Debug, Clone)]
pub struct WatchContext {
    config: TreewatchConfig,
    suppression: WriteSuppressionLock,
}

impl WatchContext {
    pub fn new(config: TreewatchConfig) -> Self {
        let suppression = WriteSuppressionLock::new(config.watcher.suppression_duration());
        Self { config, suppression }
    }

    pub fn config(&self) -> &TreewatchConfig {
        &self.config
    }

    pub fn suppression(&self) -> &WriteSuppressionLock {
        &self.suppression
    }

    /// Opens a seed list whose saves are hidden from watchers started by
    /// this context.
    pub fn open_seed_file<P: AsRef<Path>>(&self, path: P) -> Result<Arc<SeedFile>> {
        let seeds = SeedFile::open(path, self.suppression.clone(), self.config.seeds.grammar)?;
        Ok(Arc::new(seeds))
    }

    pub fn start_watcher<P: AsRef<Path>>(
        &self,
        root: P,
        callbacks: Callbacks,
    ) -> Result<DirectoryWatcher, WatchError> {
        DirectoryWatcher::start(
            root,
            callbacks,
            self.suppression.clone(),
            self.config.watcher.quiescence_duration(),
        )
    }
}

impl Default for WatchContext {
    fn default() -> Self {
        Self::new(TreewatchConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_seed_file_shares_suppression() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let context = WatchContext::default();
        let seeds = context.open_seed_file(temp_dir.path().join("seedlist.txt")).unwrap();

        seeds.set_seeds([1, 2]);
        seeds.save().unwrap();

        assert!(context.suppression().is_locked(seeds.path()));
    }

    #[test]
    fn test_suppression_window_follows_config() {
        let mut config = TreewatchConfig::default();
        config.watcher.suppression_ms = 1500;

        let context = WatchContext::new(config);
        assert_eq!(context.suppression().window(), std::time::Duration::from_millis(1500));
    }
}
