//! Progress notification sinks for tracked replays.

use crate::models::ProgressEvent;
use crate::storage::{KeyValueStore, REPLAY_PROGRESS_KEY};
use log::warn;

/// Receives progress events from a tracked replay, in emission order.
pub trait ProgressSink {
    fn on_progress(&mut self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: FnMut(ProgressEvent),
{
    fn on_progress(&mut self, event: ProgressEvent) {
        self(event)
    }
}

/// Sink that drops every event. Used by batch replays.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&mut self, _event: ProgressEvent) {}
}

/// Sink that mirrors the latest event into a key-value store under
/// `replayProgress`, so another process can follow a run.
///
/// Storage failures are logged and do not interrupt the replay.
pub struct StoreProgressSink<'a, S: KeyValueStore + ?Sized> {
    store: &'a mut S,
}

impl<'a, S: KeyValueStore + ?Sized> StoreProgressSink<'a, S> {
    pub fn new(store: &'a mut S) -> Self {
        Self { store }
    }
}

impl<S: KeyValueStore + ?Sized> ProgressSink for StoreProgressSink<'_, S> {
    fn on_progress(&mut self, event: ProgressEvent) {
        let value = match serde_json::to_value(&event) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to serialize progress event: {}", e);
                return;
            }
        };

        if let Err(e) = self.store.set(REPLAY_PROGRESS_KEY, value) {
            warn!("Failed to persist replay progress: {}", e);
        }
    }
}
