use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::backend::{CloseHandle, WatchBackend};
use super::dispatch::{Callbacks, EventDispatcher};
use super::lock::WriteSuppressionLock;
use super::native::NotifyBackend;
use super::tree::WatchTree;
use super::watch_loop::WatchLoop;
use super::WatchError;

/// Recursive directory watcher running on its own thread.
///
/// The watch tree is built on the calling thread, so a bad root or an
/// unavailable backend is reported by [`start`](Self::start). The worker then
/// runs until [`close`](Self::close) is called or the backend fails.
/// Dropping the watcher closes it and waits for the worker.
#[derive(Debug)]
pub struct DirectoryWatcher {
    root: PathBuf,
    closer: CloseHandle,
    worker: Option<JoinHandle<Result<(), WatchError>>>,
}

impl DirectoryWatcher {
    /// Watches `root` with the platform's native backend.
    pub fn start<P: AsRef<Path>>(
        root: P,
        callbacks: Callbacks,
        suppression: WriteSuppressionLock,
        quiescence: Duration,
    ) -> Result<Self, WatchError> {
        let backend = NotifyBackend::new()?;
        Self::with_backend(root, backend, callbacks, suppression, quiescence)
    }

    pub fn with_backend<P, B>(
        root: P,
        backend: B,
        callbacks: Callbacks,
        suppression: WriteSuppressionLock,
        quiescence: Duration,
    ) -> Result<Self, WatchError>
    where
        P: AsRef<Path>,
        B: WatchBackend + 'static,
    {
        let tree = WatchTree::initialize(root, backend)?;
        let root = tree.root().to_path_buf();
        let closer = tree.closer();
        let dispatcher = EventDispatcher::new(callbacks, suppression);
        let mut watch_loop = WatchLoop::new(tree, dispatcher, quiescence);

        let worker = thread::Builder::new()
            .name("directory-watcher".to_string())
            .spawn(move || watch_loop.run())
            .map_err(|source| WatchError::io(&root, source))?;

        Ok(Self {
            root,
            closer,
            worker: Some(worker),
        })
    }

    /// Canonical watch root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Handle that can close the watcher from another thread.
    pub fn closer(&self) -> CloseHandle {
        self.closer.clone()
    }

    pub fn close(&self) {
        self.closer.close();
    }

    /// Whether the worker thread has ended, either after a close or because
    /// the backend failed.
    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Waits for the worker to end. Returns the backend failure that stopped
    /// it, if any; a close is not an error.
    pub fn join(mut self) -> Result<(), WatchError> {
        self.wait()
    }

    fn wait(&mut self) -> Result<(), WatchError> {
        match self.worker.take() {
            Some(worker) => worker.join().map_err(|_| WatchError::WorkerPanicked)?,
            None => Ok(()),
        }
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        self.close();
        if let Err(err) = self.wait() {
            tracing::warn!("File watcher stopped with error: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::backend::RawEventKind;
    use crate::core::memory::MemoryBackend;
    use parking_lot::Mutex;
    use std::fs;
    use std::sync::Arc;
    use std::time::Instant;
    use tempfile::TempDir;

    fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        done()
    }

    #[test]
    fn test_worker_delivers_callbacks() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().canonicalize().unwrap();
        let (backend, feed) = MemoryBackend::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callbacks = Callbacks::new().on_new_file(move |path| sink.lock().push(path.to_path_buf()));

        let watcher = DirectoryWatcher::with_backend(
            &root,
            backend,
            callbacks,
            WriteSuppressionLock::default(),
            Duration::from_millis(10),
        )
        .unwrap();

        fs::write(root.join("a.txt"), "a").unwrap();
        feed.emit(&root.join("a.txt"), RawEventKind::Create);

        assert!(wait_until(Duration::from_secs(2), || !seen.lock().is_empty()));
        assert_eq!(*seen.lock(), vec![root.join("a.txt")]);

        watcher.close();
        assert!(watcher.join().is_ok());
    }

    #[test]
    fn test_join_reports_backend_failure() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let (backend, feed) = MemoryBackend::new();
        let watcher = DirectoryWatcher::with_backend(
            temp_dir.path(),
            backend,
            Callbacks::new(),
            WriteSuppressionLock::default(),
            Duration::from_millis(10),
        )
        .unwrap();

        feed.fail("watch limit reached");

        assert!(wait_until(Duration::from_secs(2), || watcher.is_finished()));
        assert!(matches!(watcher.join(), Err(WatchError::Backend(_))));
    }

    #[test]
    fn test_start_rejects_missing_root() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let (backend, _feed) = MemoryBackend::new();

        let result = DirectoryWatcher::with_backend(
            temp_dir.path().join("missing"),
            backend,
            Callbacks::new(),
            WriteSuppressionLock::default(),
            Duration::from_millis(10),
        );
        assert!(matches!(result, Err(WatchError::NotADirectory(_))));
    }
}
