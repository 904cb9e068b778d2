//! In-memory watch backend
//!
//! Subscriptions are plain bookkeeping and events are injected by hand
//! through a [`MemoryFeed`]. This drives the watch tree and loop
//! deterministically, without waiting on the operating system.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crossbeam_channel::{select, unbounded, Receiver, Sender};
use parking_lot::Mutex;

use super::backend::{push_coalesced, CloseHandle, RawEvent, RawEventKind, SubscriptionId, WatchBackend};
use super::WatchError;

enum Message {
    Event(RawEvent),
    Fail(String),
}

#[derive(Debug, Default)]
struct Registry {
    by_dir: HashMap<PathBuf, SubscriptionId>,
    by_id: HashMap<SubscriptionId, PathBuf>,
    refused: HashSet<PathBuf>,
    next_id: u64,
}

pub struct MemoryBackend {
    registry: Arc<Mutex<Registry>>,
    messages: Receiver<Message>,
    shutdown: Receiver<()>,
    closer: CloseHandle,
}

/// Injects events into a [`MemoryBackend`] and inspects its subscriptions.
#[derive(Clone)]
pub struct MemoryFeed {
    registry: Arc<Mutex<Registry>>,
    tx: Sender<Message>,
}

impl MemoryBackend {
    pub fn new() -> (Self, MemoryFeed) {
        let registry = Arc::new(Mutex::new(Registry::default()));
        let (tx, messages) = unbounded();
        let (closer, shutdown) = CloseHandle::new();

        let backend = Self {
            registry: registry.clone(),
            messages,
            shutdown,
            closer,
        };
        (backend, MemoryFeed { registry, tx })
    }

    fn accept(message: Message, batch: &mut Vec<RawEvent>) -> Result<(), WatchError> {
        match message {
            Message::Event(event) => {
                push_coalesced(batch, event);
                Ok(())
            }
            Message::Fail(reason) => Err(WatchError::Backend(notify::Error::generic(&reason))),
        }
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("registry", &*self.registry.lock())
            .field("closed", &self.closer.is_closed())
            .finish()
    }
}

impl WatchBackend for MemoryBackend {
    fn register(&mut self, dir: &Path) -> Result<SubscriptionId, WatchError> {
        if self.closer.is_closed() {
            return Err(WatchError::Disposed);
        }
        if !dir.is_dir() {
            return Err(WatchError::Backend(
                notify::Error::path_not_found().add_path(dir.to_path_buf()),
            ));
        }

        let mut registry = self.registry.lock();
        if registry.refused.contains(dir) {
            let denied = io::Error::from(io::ErrorKind::PermissionDenied);
            return Err(WatchError::Backend(notify::Error::io(denied).add_path(dir.to_path_buf())));
        }

        registry.next_id += 1;
        let subscription = SubscriptionId::new(registry.next_id);
        if let Some(stale) = registry.by_dir.insert(dir.to_path_buf(), subscription) {
            registry.by_id.remove(&stale);
        }
        registry.by_id.insert(subscription, dir.to_path_buf());
        Ok(subscription)
    }

    fn cancel(&mut self, subscription: SubscriptionId) {
        let mut registry = self.registry.lock();
        if let Some(dir) = registry.by_id.remove(&subscription) {
            if registry.by_dir.get(&dir) == Some(&subscription) {
                registry.by_dir.remove(&dir);
            }
        }
    }

    fn take_batch(&mut self) -> Result<Vec<RawEvent>, WatchError> {
        let mut batch = Vec::new();

        while batch.is_empty() {
            if self.closer.is_closed() {
                return Err(WatchError::Closed);
            }

            select! {
                recv(self.shutdown) -> _ => return Err(WatchError::Closed),
                recv(self.messages) -> msg => match msg {
                    Ok(message) => Self::accept(message, &mut batch)?,
                    Err(_) => return Err(WatchError::Closed),
                }
            }
        }

        self.poll_pending(&mut batch)?;
        Ok(batch)
    }

    fn poll_pending(&mut self, batch: &mut Vec<RawEvent>) -> Result<(), WatchError> {
        if self.closer.is_closed() {
            return Err(WatchError::Closed);
        }

        while let Ok(message) = self.messages.try_recv() {
            Self::accept(message, batch)?;
        }
        Ok(())
    }

    fn closer(&self) -> CloseHandle {
        self.closer.clone()
    }
}

impl MemoryFeed {
    /// Live subscription for `dir`, if it is registered.
    pub fn subscription(&self, dir: &Path) -> Option<SubscriptionId> {
        self.registry.lock().by_dir.get(&resolve(dir)).copied()
    }

    pub fn is_watched(&self, dir: &Path) -> bool {
        self.subscription(dir).is_some()
    }

    /// Number of live subscriptions.
    pub fn live(&self) -> usize {
        self.registry.lock().by_id.len()
    }

    /// Queues a change of `path` against the subscription of its parent
    /// directory. Returns false when the parent is not watched.
    pub fn emit(&self, path: &Path, kind: RawEventKind) -> bool {
        let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
            return false;
        };

        match self.subscription(parent) {
            Some(owner) => {
                self.emit_raw(RawEvent::new(owner, name, kind));
                true
            }
            None => false,
        }
    }

    pub fn emit_raw(&self, event: RawEvent) {
        let _ = self.tx.send(Message::Event(event));
    }

    /// Makes every later registration of `dir` fail as if permission were
    /// denied.
    pub fn refuse(&self, dir: &Path) {
        self.registry.lock().refused.insert(resolve(dir));
    }

    /// Makes the next batch fail with a backend error.
    pub fn fail(&self, reason: &str) {
        let _ = self.tx.send(Message::Fail(reason.to_string()));
    }
}

impl std::fmt::Debug for MemoryFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryFeed").field("live", &self.live()).finish()
    }
}

fn resolve(dir: &Path) -> PathBuf {
    dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf())
}
