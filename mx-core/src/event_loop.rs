//! Pulls metadata/message streams for each active group and feeds them to
//! the routers (spec §4.6, "EVENT LOOP"). Each group gets its own
//! long-lived worker per subscription; events within one worker are
//! processed strictly in stream order, while different groups' workers
//! run concurrently (spec §5), grounded on the tokio-task-per-unit-of-work
//! shape in `applogic/src/background_execution/processing.rs` and on the
//! `Store`/`Dispatcher` traits' `#[trait_variant::make(..: Send)]` pattern
//! used throughout `coreclient`.

use std::collections::HashSet;
use std::sync::Arc;

use mx_common::Base64Id;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_stream::StreamExt as _;
use tracing::error;

use crate::dispatcher::Dispatcher;
use crate::projector::Projector;
use crate::protocol::ProtocolClient;
use crate::store::Store;

/// Request to extend the event loop with one more subscription on a group
/// (spec §4.6: "The loop is started/extended whenever the projector calls
/// subscribeToGroup or subscribeToMetadata").
#[derive(Debug, Clone)]
pub struct SubscriptionRequest {
    pub group_pk: Base64Id,
    pub metadata: bool,
    pub messages: bool,
}

/// Owns the per-group worker tasks. Constructed once per running core and
/// driven to completion with [`EventLoop::run`]; the [`Projector`] reaches
/// back into it only through the `mpsc` sender it was handed at
/// construction (spec §5: "the projector itself is stateless beyond its
/// injected collaborators").
pub struct EventLoop<S, D, P> {
    projector: Arc<Projector<S, D, P>>,
    requests: mpsc::UnboundedReceiver<SubscriptionRequest>,
    workers: JoinSet<()>,
    subscribed_metadata: HashSet<Base64Id>,
    subscribed_messages: HashSet<Base64Id>,
}

impl<S, D, P> EventLoop<S, D, P>
where
    S: Store + 'static,
    D: Dispatcher + 'static,
    P: ProtocolClient + 'static,
{
    pub fn new(projector: Arc<Projector<S, D, P>>, requests: mpsc::UnboundedReceiver<SubscriptionRequest>) -> Self {
        Self {
            projector,
            requests,
            workers: JoinSet::new(),
            subscribed_metadata: HashSet::new(),
            subscribed_messages: HashSet::new(),
        }
    }

    /// Drains subscription requests and drives every group worker until
    /// cancelled (spec §5: "when canceled, all in-flight operations must
    /// return promptly and no further dispatches may occur").
    pub async fn run(mut self) {
        let cancellation = self.projector.cancellation();
        loop {
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => break,
                request = self.requests.recv() => {
                    match request {
                        Some(request) => self.handle_subscription_request(request),
                        None => break,
                    }
                }
                Some(result) = self.workers.join_next(), if !self.workers.is_empty() => {
                    if let Err(error) = result
                        && !error.is_cancelled()
                    {
                        error!(%error, "event loop worker panicked");
                    }
                }
            }
        }
        self.workers.shutdown().await;
    }

    fn handle_subscription_request(&mut self, request: SubscriptionRequest) {
        if request.metadata && self.subscribed_metadata.insert(request.group_pk.clone()) {
            self.spawn_metadata_worker(request.group_pk.clone());
        }
        if request.messages && self.subscribed_messages.insert(request.group_pk.clone()) {
            self.spawn_messages_worker(request.group_pk);
        }
    }

    fn spawn_metadata_worker(&mut self, group_pk: Base64Id) {
        let projector = self.projector.clone();
        self.workers.spawn(async move {
            let cancellation = projector.cancellation();
            let stream = match projector.protocol.subscribe_to_metadata(&group_pk).await {
                Ok(stream) => stream,
                Err(error) => {
                    error!(%error, %group_pk, "failed to subscribe to metadata stream");
                    return;
                }
            };
            tokio::pin!(stream);
            loop {
                tokio::select! {
                    _ = cancellation.cancelled() => break,
                    event = stream.next() => {
                        match event {
                            Some(event) => {
                                if let Err(error) = projector.project_metadata(event).await {
                                    error!(%error, %group_pk, "failed to project metadata event");
                                }
                            }
                            None => break,
                        }
                    }
                }
            }
        });
    }

    fn spawn_messages_worker(&mut self, group_pk: Base64Id) {
        let projector = self.projector.clone();
        self.workers.spawn(async move {
            let cancellation = projector.cancellation();
            let stream = match projector.protocol.subscribe_to_messages(&group_pk).await {
                Ok(stream) => stream,
                Err(error) => {
                    error!(%error, %group_pk, "failed to subscribe to message stream");
                    return;
                }
            };
            tokio::pin!(stream);
            loop {
                tokio::select! {
                    _ = cancellation.cancelled() => break,
                    event = stream.next() => {
                        match event {
                            Some(event) => {
                                if let Err(error) = projector.project_app_message(event).await {
                                    error!(%error, %group_pk, "failed to project app message");
                                }
                            }
                            None => break,
                        }
                    }
                }
            }
        });
    }
}
