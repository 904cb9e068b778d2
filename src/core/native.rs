use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crossbeam_channel::{select, unbounded, Receiver};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use super::backend::{push_coalesced, CloseHandle, RawEvent, RawEventKind, SubscriptionId, WatchBackend};
use super::WatchError;

/// [`WatchBackend`] on top of the platform's native notification API.
///
/// Every directory gets its own non-recursive `notify` watch, so each change
/// can be attributed to exactly one subscription.
pub struct NotifyBackend {
    watcher: RecommendedWatcher,
    events: Receiver<notify::Result<Event>>,
    shutdown: Receiver<()>,
    closer: CloseHandle,
    by_dir: HashMap<PathBuf, SubscriptionId>,
    by_id: HashMap<SubscriptionId, PathBuf>,
    next_id: u64,
}

impl NotifyBackend {
    pub fn new() -> Result<Self, WatchError> {
        let (tx, events) = unbounded();

        // Create the notify watcher
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        })?;

        let (closer, shutdown) = CloseHandle::new();

        Ok(Self {
            watcher,
            events,
            shutdown,
            closer,
            by_dir: HashMap::new(),
            by_id: HashMap::new(),
            next_id: 0,
        })
    }

    /// Number of directories currently watched.
    pub fn watched(&self) -> usize {
        self.by_id.len()
    }

    fn translate(&self, event: Event, batch: &mut Vec<RawEvent>) {
        for (path, kind) in classify(&event) {
            let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
                continue;
            };

            match self.by_dir.get(parent) {
                Some(&owner) => push_coalesced(batch, RawEvent::new(owner, name, kind)),
                None => tracing::trace!(
                    path = %path.display(),
                    "Dropping event outside watched directories"
                ),
            }
        }
    }
}

impl std::fmt::Debug for NotifyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyBackend")
            .field("watched", &self.by_id.len())
            .field("closed", &self.closer.is_closed())
            .finish()
    }
}

impl WatchBackend for NotifyBackend {
    fn register(&mut self, dir: &Path) -> Result<SubscriptionId, WatchError> {
        if self.closer.is_closed() {
            return Err(WatchError::Disposed);
        }

        self.watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|err| WatchError::Backend(err.add_path(dir.to_path_buf())))?;

        self.next_id += 1;
        let subscription = SubscriptionId::new(self.next_id);
        if let Some(stale) = self.by_dir.insert(dir.to_path_buf(), subscription) {
            self.by_id.remove(&stale);
        }
        self.by_id.insert(subscription, dir.to_path_buf());

        Ok(subscription)
    }

    fn cancel(&mut self, subscription: SubscriptionId) {
        let Some(dir) = self.by_id.remove(&subscription) else {
            return;
        };

        // Superseded by a newer registration of the same directory
        if self.by_dir.get(&dir) != Some(&subscription) {
            return;
        }
        self.by_dir.remove(&dir);

        // The directory is usually gone already, in which case the OS
        // dropped the watch on its own.
        if let Err(err) = self.watcher.unwatch(&dir) {
            tracing::debug!("Unwatch of {} failed: {}", dir.display(), err);
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
                recv(self.events) -> msg => {
                    let result = msg.map_err(|_| {
                        WatchError::Backend(notify::Error::generic("event channel disconnected"))
                    })?;
                    self.translate(result?, &mut batch);
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

        while let Ok(result) = self.events.try_recv() {
            self.translate(result?, batch);
        }
        Ok(())
    }

    fn closer(&self) -> CloseHandle {
        self.closer.clone()
    }
}

/// Maps one notify event onto per-path create/modify/delete kinds. Renames
/// become a delete of the old name and a create of the new one.
fn classify(event: &Event) -> Vec<(&Path, RawEventKind)> {
    match &event.kind {
        EventKind::Create(_) => every_path(event, RawEventKind::Create),
        EventKind::Remove(_) => every_path(event, RawEventKind::Delete),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => every_path(event, RawEventKind::Delete),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => every_path(event, RawEventKind::Create),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => event
            .paths
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let kind = if i == 0 {
                    RawEventKind::Delete
                } else {
                    RawEventKind::Create
                };
                (p.as_path(), kind)
            })
            .collect(),
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .map(|p| {
                let kind = if p.exists() {
                    RawEventKind::Create
                } else {
                    RawEventKind::Delete
                };
                (p.as_path(), kind)
            })
            .collect(),
        EventKind::Modify(_) => every_path(event, RawEventKind::Modify),
        _ => Vec::new(),
    }
}

fn every_path(event: &Event, kind: RawEventKind) -> Vec<(&Path, RawEventKind)> {
    event.paths.iter().map(|p| (p.as_path(), kind)).collect()
}
