//! Fakes and fixture builders for `mx-core`'s own test suite. Not part of
//! the public embedding surface; a dev-dependency only, the same role the
//! teacher's `test_harness` crate plays for `coreclient`'s integration
//! tests.

mod fake_protocol;
mod fixtures;
mod recording_dispatcher;

pub use fake_protocol::FakeProtocolClient;
pub use fixtures::*;
pub use recording_dispatcher::RecordingDispatcher;

use std::sync::Arc;

use mx_core::config::{ProjectorConfig, ProjectorContext};
use mx_core::event_loop::{EventLoop, SubscriptionRequest};
use mx_core::projector::Projector;
use mx_core::store::InMemoryStore;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Wires an [`InMemoryStore`], [`RecordingDispatcher`], and
/// [`FakeProtocolClient`] behind one [`Projector`], the way a real
/// embedding wires its own collaborators (spec §2). Most tests drive
/// `harness.projector.project_metadata`/`project_app_message` directly;
/// [`TestHarness::spawn_event_loop`] is only needed for scenarios that
/// exercise subscription-triggered workers end to end.
pub struct TestHarness {
    pub store: InMemoryStore,
    pub dispatcher: RecordingDispatcher,
    pub protocol: FakeProtocolClient,
    pub projector: Arc<Projector<InMemoryStore, RecordingDispatcher, FakeProtocolClient>>,
    cancellation: CancellationToken,
    requests_rx: Option<mpsc::UnboundedReceiver<SubscriptionRequest>>,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(ProjectorConfig::live())
    }

    pub fn replay() -> Self {
        Self::with_config(ProjectorConfig::replay())
    }

    pub fn with_config(config: ProjectorConfig) -> Self {
        let store = InMemoryStore::new();
        let dispatcher = RecordingDispatcher::new();
        let protocol = FakeProtocolClient::new();
        let context = ProjectorContext::new(config);
        let cancellation = context.cancellation.clone();
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let projector = Arc::new(Projector::new(
            store.clone(),
            dispatcher.clone(),
            protocol.clone(),
            context,
            requests_tx,
        ));
        Self {
            store,
            dispatcher,
            protocol,
            projector,
            cancellation,
            requests_rx: Some(requests_rx),
        }
    }

    /// Spawns the event loop on the current tokio runtime, consuming the
    /// subscription-request channel. Panics if called twice.
    pub fn spawn_event_loop(&mut self) {
        let requests_rx = self.requests_rx.take().expect("event loop already spawned");
        let event_loop = EventLoop::new(self.projector.clone(), requests_rx);
        tokio::spawn(event_loop.run());
    }

    /// Cancels the shared [`tokio_util::sync::CancellationToken`], the same
    /// one the projector and any spawned event loop observe (spec §5).
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }
}
