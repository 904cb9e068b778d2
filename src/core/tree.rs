//! Directory-to-subscription bookkeeping
//!
//! [`WatchTree`] keeps one subscription per directory under the root and a
//! reverse index from subscription to directory, so the owning directory of
//! an event is found in constant time. Both maps are only mutated by the
//! watch loop's thread.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

use super::backend::{CloseHandle, SubscriptionId, WatchBackend};
use super::WatchError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchNode {
    pub path: PathBuf,
    pub subscription: SubscriptionId,
}

pub struct WatchTree<B> {
    root: PathBuf,
    backend: B,
    nodes: HashMap<PathBuf, WatchNode>,
    owners: HashMap<SubscriptionId, PathBuf>,
}

impl<B: WatchBackend> WatchTree<B> {
    /// Registers every directory under `root`, children before their parent.
    pub fn initialize<P: AsRef<Path>>(root: P, backend: B) -> Result<Self, WatchError> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(WatchError::NotADirectory(root.to_path_buf()));
        }
        let root = root
            .canonicalize()
            .map_err(|source| WatchError::io(root, source))?;

        let mut tree = Self {
            root: root.clone(),
            backend,
            nodes: HashMap::new(),
            owners: HashMap::new(),
        };
        tree.register_subtree(&root)?;

        tracing::info!(
            "Watching {} ({} directories)",
            root.display(),
            tree.len()
        );
        Ok(tree)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Subscribes to `path`, replacing any stale subscription for it.
    /// Relative paths are taken relative to the watch root.
    pub fn register(&mut self, path: &Path) -> Result<SubscriptionId, WatchError> {
        let path = self.absolute(path);

        if let Some(stale) = self.nodes.remove(&path) {
            tracing::debug!("Replacing stale subscription {} for {}", stale.subscription, path.display());
            self.owners.remove(&stale.subscription);
            self.backend.cancel(stale.subscription);
        }

        let subscription = self.backend.register(&path)?;
        self.owners.insert(subscription, path.clone());
        self.nodes.insert(
            path.clone(),
            WatchNode {
                path,
                subscription,
            },
        );
        Ok(subscription)
    }

    /// Registers `dir` and every directory below it, deepest first. Returns
    /// the number of directories registered. Directories the backend refuses
    /// are logged and skipped, except the watch root itself.
    pub fn register_subtree(&mut self, dir: &Path) -> Result<usize, WatchError> {
        let dir = self.absolute(dir);
        let mut registered = 0;

        // Pre-order walk reversed puts every directory after its descendants
        for path in collect_directories(&dir).iter().rev() {
            match self.register(path) {
                Ok(_) => registered += 1,
                Err(WatchError::Disposed) => return Err(WatchError::Disposed),
                Err(err) if *path == self.root => return Err(err),
                Err(err) if !path.is_dir() => {
                    tracing::debug!("Directory {} vanished before registration: {}", path.display(), err);
                }
                Err(err) => {
                    tracing::warn!("Skipping unwatchable directory {}: {}", path.display(), err);
                }
            }
        }
        Ok(registered)
    }

    /// Cancels the subscription of `path` and of every directory below it.
    /// Unknown paths are a no-op. Returns the number of nodes removed.
    pub fn unregister(&mut self, path: &Path) -> usize {
        let path = self.absolute(path);
        let doomed: Vec<PathBuf> = self
            .nodes
            .keys()
            .filter(|candidate| candidate.starts_with(&path))
            .cloned()
            .collect();

        if doomed.is_empty() {
            tracing::debug!("Ignoring unregister of unknown directory {}", path.display());
            return 0;
        }

        for dir in &doomed {
            if let Some(node) = self.nodes.remove(dir) {
                self.owners.remove(&node.subscription);
                self.backend.cancel(node.subscription);
            }
        }
        doomed.len()
    }

    /// Directory a subscription was registered for.
    pub fn owner_of(&self, subscription: SubscriptionId) -> Option<&Path> {
        self.owners.get(&subscription).map(PathBuf::as_path)
    }

    pub fn node(&self, path: &Path) -> Option<&WatchNode> {
        self.nodes.get(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.nodes.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn closer(&self) -> CloseHandle {
        self.backend.closer()
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_relative() {
            self.root.join(path)
        } else {
            path.to_path_buf()
        }
    }
}

impl<B> std::fmt::Debug for WatchTree<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchTree")
            .field("root", &self.root)
            .field("directories", &self.nodes.len())
            .finish()
    }
}

/// Every directory under `dir` including itself, in pre-order. Hidden and
/// ignored directories are included; symlinks are not followed.
fn collect_directories(dir: &Path) -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    for result in WalkBuilder::new(dir).standard_filters(false).build() {
        match result {
            Ok(entry) => {
                if entry.file_type().is_some_and(|t| t.is_dir()) {
                    dirs.push(entry.into_path());
                }
            }
            Err(err) => {
                tracing::warn!("Error walking directory: {}", err);
            }
        }
    }

    dirs
}
