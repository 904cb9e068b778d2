//! The watch primitive seam
//!
//! A [`WatchBackend`] hands out one [`SubscriptionId`] per registered
//! directory and reports changes as [`RawEvent`]s relative to the directory
//! they were raised against. The watch tree and loop only ever talk to this
//! trait, so the native `notify` backend and the in-memory backend are
//! interchangeable.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{bounded, Receiver, Sender};

use super::WatchError;

/// Opaque token identifying one live directory subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawEventKind {
    Create,
    Modify,
    Delete,
}

/// One undecoded change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// Subscription of the directory the change happened in
    pub owner: SubscriptionId,
    /// Entry name relative to the owning directory
    pub name: PathBuf,
    pub kind: RawEventKind,
    pub arrived: Instant,
}

impl RawEvent {
    pub fn new(owner: SubscriptionId, name: impl Into<PathBuf>, kind: RawEventKind) -> Self {
        Self {
            owner,
            name: name.into(),
            kind,
            arrived: Instant::now(),
        }
    }
}

/// Appends `event` to `batch` unless the latest queued event for the same
/// entry already has the same kind. Repeated identical notifications collapse
/// into one, the way a kernel queue folds repeated modifications.
pub fn push_coalesced(batch: &mut Vec<RawEvent>, event: RawEvent) {
    let repeated = batch
        .iter()
        .rev()
        .find(|queued| queued.owner == event.owner && queued.name == event.name)
        .is_some_and(|queued| queued.kind == event.kind);

    if !repeated {
        batch.push(event);
    }
}

/// Cloneable handle that disposes a backend from any thread.
///
/// Closing wakes a blocked [`WatchBackend::take_batch`], which then returns
/// [`WatchError::Closed`]. Once closed, registration fails with
/// [`WatchError::Disposed`].
#[derive(Debug, Clone)]
pub struct CloseHandle {
    disposed: Arc<AtomicBool>,
    signal: Sender<()>,
}

impl CloseHandle {
    /// Creates a handle together with the receiver a backend selects on.
    pub fn new() -> (Self, Receiver<()>) {
        let (signal, shutdown) = bounded(1);
        let handle = Self {
            disposed: Arc::new(AtomicBool::new(false)),
            signal,
        };
        (handle, shutdown)
    }

    pub fn close(&self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            let _ = self.signal.try_send(());
            tracing::debug!("Watch service closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

/// OS-level facility reporting changes under registered directories.
pub trait WatchBackend: Send {
    /// Starts watching the direct entries of `dir`.
    fn register(&mut self, dir: &Path) -> Result<SubscriptionId, WatchError>;

    /// Stops a subscription. Unknown or already cancelled ids are ignored.
    fn cancel(&mut self, subscription: SubscriptionId);

    /// Blocks until at least one event is available and returns everything
    /// queued at that point. Returns [`WatchError::Closed`] once closed.
    fn take_batch(&mut self) -> Result<Vec<RawEvent>, WatchError>;

    /// Appends events that arrived since the last call without blocking.
    fn poll_pending(&mut self, batch: &mut Vec<RawEvent>) -> Result<(), WatchError>;

    fn closer(&self) -> CloseHandle;
}

impl<B: WatchBackend + ?Sized> WatchBackend for Box<B> {
    fn register(&mut self, dir: &Path) -> Result<SubscriptionId, WatchError> {
        (**self).register(dir)
    }

    fn cancel(&mut self, subscription: SubscriptionId) {
        (**self).cancel(subscription)
    }

    fn take_batch(&mut self) -> Result<Vec<RawEvent>, WatchError> {
        (**self).take_batch()
    }

    fn poll_pending(&mut self, batch: &mut Vec<RawEvent>) -> Result<(), WatchError> {
        (**self).poll_pending(batch)
    }

    fn closer(&self) -> CloseHandle {
        (**self).closer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_events_are_coalesced() {
        let owner = SubscriptionId::new(1);
        let mut batch = Vec::new();

        push_coalesced(&mut batch, RawEvent::new(owner, "a.txt", RawEventKind::Modify));
        push_coalesced(&mut batch, RawEvent::new(owner, "a.txt", RawEventKind::Modify));
        push_coalesced(&mut batch, RawEvent::new(owner, "b.txt", RawEventKind::Modify));

        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_kind_change_is_kept() {
        let owner = SubscriptionId::new(1);
        let mut batch = Vec::new();

        push_coalesced(&mut batch, RawEvent::new(owner, "a.txt", RawEventKind::Create));
        push_coalesced(&mut batch, RawEvent::new(owner, "a.txt", RawEventKind::Modify));
        push_coalesced(&mut batch, RawEvent::new(owner, "a.txt", RawEventKind::Delete));
        push_coalesced(&mut batch, RawEvent::new(owner, "a.txt", RawEventKind::Create));

        let kinds: Vec<_> = batch.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                RawEventKind::Create,
                RawEventKind::Modify,
                RawEventKind::Delete,
                RawEventKind::Create
            ]
        );
    }

    #[test]
    fn test_close_handle_is_shared() {
        let (handle, shutdown) = CloseHandle::new();
        let other = handle.clone();
        assert!(!handle.is_closed());

        other.close();
        other.close();

        assert!(handle.is_closed());
        assert!(shutdown.try_recv().is_ok());
        assert!(shutdown.try_recv().is_err());
    }
}
