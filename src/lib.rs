pub mod cli;
pub mod config;
pub mod context;
pub mod core;
pub mod events;
pub mod seeds;

pub use config::*;
pub use context::WatchContext;
pub use core::{Callbacks, DirectoryWatcher, WatchError, WriteSuppressionLock};
pub use events::*;
pub use seeds::{LoadReport, SeedFile, SeedGrammar};
