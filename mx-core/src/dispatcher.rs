//! Fan-out of view-update and notification events (spec §6, "Outbound
//! events to Dispatcher"; spec §2 treats the Dispatcher itself as an
//! external collaborator; this module only defines its contract plus one
//! concrete in-process implementation, grounded on `coreclient/src/store/
//! notification.rs`'s `StoreNotificationsSender`).

use std::sync::Arc;

use tokio_stream::{Stream, StreamExt as _, wrappers::BroadcastStream};
use tracing::error;

use crate::model::{Account, Contact, Conversation, Device, Media, Member};
use mx_common::Cid;

const DISPATCH_CHANNEL_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    NewMessage,
    GroupInvitation,
    ContactRequest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub payload: Vec<u8>,
}

/// An `Interaction` as seen by a subscriber: the interaction row plus its
/// currently-aggregated reactions, recomputed fresh at dispatch time
/// (spec §4.5, §4.7; never a persisted column).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionView {
    pub interaction: crate::model::Interaction,
    pub aggregated_reactions: Vec<crate::model::AggregatedReaction>,
}

/// One row of the spec §6 outbound-events table. Every variant carries an
/// `is_new` flag distinguishing first-appearance from update, except
/// `InteractionDeleted`, which has nothing left to be new about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    AccountUpdated { account: Account, is_new: bool },
    ContactUpdated { contact: Contact, is_new: bool },
    ConversationUpdated { conversation: Conversation, is_new: bool },
    MemberUpdated { member: Member, is_new: bool },
    DeviceUpdated { device: Device, is_new: bool },
    InteractionUpdated { view: InteractionView, is_new: bool },
    InteractionDeleted { cid: Cid },
    MediaUpdated { media: Media, is_new: bool },
    Notified(Notification),
}

#[trait_variant::make(Dispatcher: Send)]
pub trait LocalDispatcher: Send + Sync {
    /// Emit an event to all current subscribers. Per spec §7, a failure
    /// here is logged but never rolls back the transaction that already
    /// committed; callers should not treat this as fatal.
    fn dispatch(&self, event: StreamEvent) -> anyhow::Result<()>;

    fn subscribe(&self) -> impl Stream<Item = Arc<StreamEvent>> + Send + 'static;
}

/// In-process broadcast implementation suitable for a single address
/// space (tests, or a single-process deployment embedding this core
/// directly).
#[derive(Clone)]
pub struct BroadcastDispatcher {
    tx: tokio::sync::broadcast::Sender<Arc<StreamEvent>>,
}

impl Default for BroadcastDispatcher {
    fn default() -> Self {
        let (tx, _rx) = tokio::sync::broadcast::channel(DISPATCH_CHANNEL_SIZE);
        Self { tx }
    }
}

impl BroadcastDispatcher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalDispatcher for BroadcastDispatcher {
    fn dispatch(&self, event: StreamEvent) -> anyhow::Result<()> {
        // No subscribers is not an error: it just means nobody is looking
        // right now, same as the teacher's notify() treating SendError as
        // a no-op rather than a hard failure.
        let _ = self.tx.send(Arc::new(event));
        Ok(())
    }

    fn subscribe(&self) -> impl Stream<Item = Arc<StreamEvent>> + Send + 'static {
        BroadcastStream::new(self.tx.subscribe()).filter_map(|result| match result {
            Ok(event) => Some(event),
            Err(error) => {
                error!(%error, "dispatcher subscriber lagged, events were dropped");
                None
            }
        })
    }
}
