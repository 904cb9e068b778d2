use std::thread;
use std::time::Duration;

use super::backend::WatchBackend;
use super::dispatch::{Dispatch, EventDispatcher};
use super::tree::WatchTree;
use super::WatchError;

/// Default quiescence window: time given to related notifications (an
/// editor's several small writes for one save) to arrive before a batch is
/// processed.
pub const DEFAULT_QUIESCENCE: Duration = Duration::from_millis(400);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Watching,
    Processing,
    Closed,
}

/// The worker side of the watcher: waits for batches, lets them settle and
/// dispatches each event in arrival order.
#[derive(Debug)]
pub struct WatchLoop<B> {
    tree: WatchTree<B>,
    dispatcher: EventDispatcher,
    quiescence: Duration,
    state: LoopState,
}

impl<B: WatchBackend> WatchLoop<B> {
    pub fn new(tree: WatchTree<B>, dispatcher: EventDispatcher, quiescence: Duration) -> Self {
        Self {
            tree,
            dispatcher,
            quiescence,
            state: LoopState::Watching,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn tree(&self) -> &WatchTree<B> {
        &self.tree
    }

    /// Runs until the backend is closed. A close is a normal return; any
    /// other backend failure ends the loop with that error.
    pub fn run(&mut self) -> Result<(), WatchError> {
        while self.step()?.is_some() {}
        Ok(())
    }

    /// Waits for one batch and processes it. Returns `None` once closed,
    /// otherwise the outcome of every event in the batch.
    pub fn step(&mut self) -> Result<Option<Vec<Dispatch>>, WatchError> {
        if self.state == LoopState::Closed {
            return Ok(None);
        }
        self.state = LoopState::Watching;

        let mut batch = match self.tree.backend_mut().take_batch() {
            Ok(batch) => batch,
            Err(err) => return self.stop(err),
        };

        self.state = LoopState::Processing;
        thread::sleep(self.quiescence);
        if let Err(err) = self.tree.backend_mut().poll_pending(&mut batch) {
            return self.stop(err);
        }

        tracing::debug!("Processing {} file system events", batch.len());
        let outcomes = batch
            .into_iter()
            .map(|event| self.dispatcher.dispatch(&mut self.tree, event))
            .collect();

        self.state = LoopState::Watching;
        Ok(Some(outcomes))
    }

    fn stop(&mut self, err: WatchError) -> Result<Option<Vec<Dispatch>>, WatchError> {
        self.state = LoopState::Closed;
        if err.is_closed() {
            tracing::info!("File watcher closed");
            Ok(None)
        } else {
            tracing::error!("File watcher error: {}", err);
            Err(err)
        }
    }
}
