//! Raw event classification
//!
//! [`EventDispatcher`] turns one [`RawEvent`] into at most one semantic
//! callback and keeps the [`WatchTree`] in step with directories appearing
//! and disappearing.

use std::fs;
use std::path::{Path, PathBuf};

use super::backend::{RawEvent, RawEventKind, SubscriptionId, WatchBackend};
use super::lock::WriteSuppressionLock;
use super::tree::WatchTree;

type Hook = Box<dyn FnMut(&Path) + Send>;

/// Set of application callbacks invoked from the watcher thread.
///
/// Every callback is optional; unset ones are skipped. Callbacks run
/// synchronously, so slow work should be handed off elsewhere.
#[derive(Default)]
pub struct Callbacks {
    on_new_file: Option<Hook>,
    on_modify_file: Option<Hook>,
    on_delete_file: Option<Hook>,
    on_new_directory: Option<Hook>,
    on_delete_directory: Option<Hook>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_new_file(mut self, hook: impl FnMut(&Path) + Send + 'static) -> Self {
        self.on_new_file = Some(Box::new(hook));
        self
    }

    pub fn on_modify_file(mut self, hook: impl FnMut(&Path) + Send + 'static) -> Self {
        self.on_modify_file = Some(Box::new(hook));
        self
    }

    pub fn on_delete_file(mut self, hook: impl FnMut(&Path) + Send + 'static) -> Self {
        self.on_delete_file = Some(Box::new(hook));
        self
    }

    pub fn on_new_directory(mut self, hook: impl FnMut(&Path) + Send + 'static) -> Self {
        self.on_new_directory = Some(Box::new(hook));
        self
    }

    pub fn on_delete_directory(mut self, hook: impl FnMut(&Path) + Send + 'static) -> Self {
        self.on_delete_directory = Some(Box::new(hook));
        self
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_new_file", &self.on_new_file.is_some())
            .field("on_modify_file", &self.on_modify_file.is_some())
            .field("on_delete_file", &self.on_delete_file.is_some())
            .field("on_new_directory", &self.on_new_directory.is_some())
            .field("on_delete_directory", &self.on_delete_directory.is_some())
            .finish()
    }
}

fn fire(hook: &mut Option<Hook>, path: &Path) {
    if let Some(hook) = hook {
        hook(path);
    }
}

/// What the dispatcher did with one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Attributed to the program's own write and dropped
    Suppressed(PathBuf),
    /// Owning subscription no longer registered
    Unresolved(SubscriptionId),
    NewFile(PathBuf),
    ModifiedFile(PathBuf),
    DeletedFile(PathBuf),
    NewDirectory(PathBuf),
    DeletedDirectory(PathBuf),
    /// Empty file, directory modification, or unreadable target
    Ignored(PathBuf),
}

#[derive(Debug)]
pub struct EventDispatcher {
    callbacks: Callbacks,
    suppression: WriteSuppressionLock,
}

impl EventDispatcher {
    pub fn new(callbacks: Callbacks, suppression: WriteSuppressionLock) -> Self {
        Self {
            callbacks,
            suppression,
        }
    }

    pub fn dispatch<B: WatchBackend>(&mut self, tree: &mut WatchTree<B>, event: RawEvent) -> Dispatch {
        let Some(owner) = tree.owner_of(event.owner) else {
            tracing::debug!(
                "Dropping {:?} event for {} from unknown subscription {}",
                event.kind,
                event.name.display(),
                event.owner
            );
            return Dispatch::Unresolved(event.owner);
        };
        let path = owner.join(&event.name);

        if self.suppression.consume(&path) {
            tracing::debug!("Dropping self-caused {:?} event for {}", event.kind, path.display());
            return Dispatch::Suppressed(path);
        }

        match event.kind {
            RawEventKind::Delete => self.deleted(tree, path),
            RawEventKind::Create => self.created(tree, path),
            RawEventKind::Modify => self.modified(path),
        }
    }

    fn deleted<B: WatchBackend>(&mut self, tree: &mut WatchTree<B>, path: PathBuf) -> Dispatch {
        if tree.contains(&path) {
            fire(&mut self.callbacks.on_delete_directory, &path);
            let removed = tree.unregister(&path);
            tracing::debug!("Directory {} removed ({} subscriptions cancelled)", path.display(), removed);
            Dispatch::DeletedDirectory(path)
        } else {
            fire(&mut self.callbacks.on_delete_file, &path);
            Dispatch::DeletedFile(path)
        }
    }

    fn created<B: WatchBackend>(&mut self, tree: &mut WatchTree<B>, path: PathBuf) -> Dispatch {
        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(err) => {
                tracing::debug!("Skipping create of {}: {}", path.display(), err);
                return Dispatch::Ignored(path);
            }
        };

        if metadata.is_dir() {
            fire(&mut self.callbacks.on_new_directory, &path);
            if let Err(err) = tree.register_subtree(&path) {
                tracing::warn!("Failed to watch new directory {}: {}", path.display(), err);
            }
            return Dispatch::NewDirectory(path);
        }

        // Placeholder files are usually filled in by a following write
        if metadata.len() == 0 {
            return Dispatch::Ignored(path);
        }

        fire(&mut self.callbacks.on_new_file, &path);
        Dispatch::NewFile(path)
    }

    fn modified(&mut self, path: PathBuf) -> Dispatch {
        match fs::metadata(&path) {
            Ok(metadata) if metadata.is_dir() || metadata.len() == 0 => Dispatch::Ignored(path),
            Ok(_) => {
                fire(&mut self.callbacks.on_modify_file, &path);
                Dispatch::ModifiedFile(path)
            }
            Err(err) => {
                tracing::debug!("Skipping modify of {}: {}", path.display(), err);
                Dispatch::Ignored(path)
            }
        }
    }
}
