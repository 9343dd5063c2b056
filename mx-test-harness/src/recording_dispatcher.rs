//! A `Dispatcher` that records every emitted [`StreamEvent`] instead of
//! fanning it out, so a test can assert on exactly what was dispatched and
//! in what order (spec §6, §O2).

use std::sync::{Arc, Mutex};

use mx_core::dispatcher::{LocalDispatcher, StreamEvent};
use tokio_stream::Stream;

#[derive(Clone, Default)]
pub struct RecordingDispatcher {
    events: Arc<Mutex<Vec<StreamEvent>>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StreamEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discards every event recorded so far, so a test can set up fixture
    /// state and then assert only on what a later action dispatches.
    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl LocalDispatcher for RecordingDispatcher {
    fn dispatch(&self, event: StreamEvent) -> anyhow::Result<()> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }

    fn subscribe(&self) -> impl Stream<Item = Arc<StreamEvent>> + Send + 'static {
        tokio_stream::empty()
    }
}
