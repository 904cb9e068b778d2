//! Core functionality module
//!
//! Contains the recursive directory watcher: the watch backend seam, the
//! directory tree bookkeeping, event classification, self-write suppression
//! and the watch loop with its worker thread.

pub mod backend;
pub mod dispatch;
pub mod error;
pub mod lock;
pub mod memory;
pub mod native;
pub mod tree;
pub mod watch_loop;
pub mod watcher;

// Re-export main types
pub use backend::{CloseHandle, RawEvent, RawEventKind, SubscriptionId, WatchBackend};
pub use dispatch::{Callbacks, Dispatch, EventDispatcher};
pub use error::WatchError;
pub use lock::{WriteSuppressionLock, DEFAULT_SUPPRESSION_WINDOW};
pub use memory::{MemoryBackend, MemoryFeed};
pub use native::NotifyBackend;
pub use tree::{WatchNode, WatchTree};
pub use watch_loop::{LoopState, WatchLoop, DEFAULT_QUIESCENCE};
pub use watcher::DirectoryWatcher;
