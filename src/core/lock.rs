//! Self-write suppression
//!
//! Before the application writes a file it does not want to reload, it calls
//! [`WriteSuppressionLock::schedule_and_lock`]. The dispatcher then drops the
//! first event it sees for that path, as long as the entry has not expired.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Default lifetime of a suppression entry. Slightly longer than the default
/// quiescence window of the watch loop.
pub const DEFAULT_SUPPRESSION_WINDOW: Duration = Duration::from_millis(600);

/// Path-keyed, time-bounded marker for the program's own writes.
///
/// Cloning yields another handle to the same entries, so the writer thread
/// and the watcher thread can share one lock.
#[derive(Debug, Clone)]
pub struct WriteSuppressionLock {
    entries: Arc<Mutex<HashMap<PathBuf, Instant>>>,
    window: Duration,
}

impl Default for WriteSuppressionLock {
    fn default() -> Self {
        Self::new(DEFAULT_SUPPRESSION_WINDOW)
    }
}

impl WriteSuppressionLock {
    pub fn new(window: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Marks `path` as about to be written by this program. An existing
    /// entry for the same path is replaced, extending its expiry.
    pub fn schedule_and_lock(&self, path: impl AsRef<Path>) {
        let key = normalize(path.as_ref());
        let now = Instant::now();

        let mut entries = self.entries.lock();
        entries.retain(|_, expiry| *expiry > now);
        tracing::debug!("Suppressing events for {} for {:?}", key.display(), self.window);
        entries.insert(key, now + self.window);
    }

    /// Returns true and removes the entry if `path` has an unexpired
    /// suppression. Expired entries are purged and count as absent.
    pub fn consume(&self, path: impl AsRef<Path>) -> bool {
        let key = normalize(path.as_ref());
        let now = Instant::now();

        match self.entries.lock().remove(&key) {
            Some(expiry) if expiry > now => true,
            Some(_) => {
                tracing::debug!("Suppression for {} expired", key.display());
                false
            }
            None => false,
        }
    }

    /// Non-consuming variant of [`consume`](Self::consume).
    pub fn is_locked(&self, path: impl AsRef<Path>) -> bool {
        let key = normalize(path.as_ref());
        self.entries
            .lock()
            .get(&key)
            .is_some_and(|expiry| *expiry > Instant::now())
    }

    /// Number of unexpired entries.
    pub fn pending(&self) -> usize {
        let now = Instant::now();
        self.entries.lock().values().filter(|expiry| **expiry > now).count()
    }
}

/// Resolves `path` to the absolute form the dispatcher computes, also for
/// files that do not exist yet or no longer exist.
fn normalize(path: &Path) -> PathBuf {
    if let Ok(resolved) = path.canonicalize() {
        return resolved;
    }

    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => {
            let parent = if parent.as_os_str().is_empty() {
                Path::new(".")
            } else {
                parent
            };
            parent
                .canonicalize()
                .map(|parent| parent.join(name))
                .unwrap_or_else(|_| path.to_path_buf())
        }
        _ => path.to_path_buf(),
    }
}
