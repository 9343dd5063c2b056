//! Wire shapes and the `ProtocolClient` collaborator (spec §6, "EXTERNAL
//! INTERFACES"). The cryptographic protocol itself is out of scope (spec
//! §1); this module only defines the shapes that cross the boundary and
//! the trait the projector calls through.

use std::pin::Pin;

use mx_common::{Base64Id, Cid, TimeStamp};
use serde::{Deserialize, Serialize};
use tokio_stream::Stream;
use uuid::Uuid;

use crate::model::{AppMessageKind, MediaState};

/// Identifies one event within a group's stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventContext {
    pub id: Uuid,
    pub group_pk: Base64Id,
    pub device_pk: Base64Id,
}

/// A decoded metadata-stream event, tagged by the event type named in spec
/// §4.1. `Unknown` preserves forward compatibility: new event types never
/// produce an error, they're logged and dropped (spec §4.1, §7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataPayload {
    AccountGroupJoined {
        /// Set when this group corresponds to a contact already known
        /// locally, in which case the Conversation is ContactType rather
        /// than MultiMemberType.
        known_contact_pk: Option<Base64Id>,
    },
    AccountContactRequestOutgoingEnqueued {
        contact_pk: Base64Id,
        display_name: String,
    },
    AccountContactRequestOutgoingSent {
        contact_pk: Base64Id,
    },
    AccountContactRequestIncomingReceived {
        contact_pk: Base64Id,
        display_name: String,
    },
    AccountContactRequestIncomingAccepted {
        contact_pk: Base64Id,
    },
    GroupMemberDeviceAdded {
        device_pk: Base64Id,
        member_pk: Base64Id,
    },
    /// Carries an encoded `AppMessage` to be re-entered through
    /// `ProjectAppMessage` using this event's own context (spec §4.1).
    GroupMetadataPayloadSent { app_message: Vec<u8> },
    AccountServiceTokenAdded { token: String },
    GroupReplicating { payload: Vec<u8> },
    MultiMemberGroupInitialMemberAnnounced { member_pk: Base64Id },
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMetadataEvent {
    pub context: EventContext,
    pub payload: MetadataPayload,
}

/// A reference to attached media (spec §6 `Media`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub cid: CidWire,
    pub mime_type: String,
    pub display_name: Option<String>,
    pub filename: Option<String>,
    pub interaction_cid: CidWire,
    pub state: MediaStateWire,
}

/// `Cid`/`MediaState` don't derive `Serialize`/`Deserialize` directly
/// (they carry invariants worth keeping off the wire type); these mirror
/// shapes are what the codec actually encodes/decodes, converted at the
/// boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CidWire(#[serde(with = "serde_bytes")] pub Vec<u8>);

impl From<&Cid> for CidWire {
    fn from(cid: &Cid) -> Self {
        CidWire(cid.as_bytes().to_vec())
    }
}

impl TryFrom<CidWire> for Cid {
    type Error = mx_common::IdentifierError;

    fn try_from(wire: CidWire) -> Result<Self, Self::Error> {
        Cid::from_bytes(wire.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaStateWire {
    NeverDownloaded,
    Downloading,
    Downloaded,
}

impl From<MediaStateWire> for MediaState {
    fn from(value: MediaStateWire) -> Self {
        match value {
            MediaStateWire::NeverDownloaded => MediaState::NeverDownloaded,
            MediaStateWire::Downloading => MediaState::Downloading,
            MediaStateWire::Downloaded => MediaState::Downloaded,
        }
    }
}

/// The decoded message-stream payload (spec §6 `AppMessage`).
///
/// `cid` is the message's own content-id (how it, in turn, becomes
/// addressable as an `Interaction` or as someone else's `target_cid`),
/// computed by the protocol layer from group id, sender, and content,
/// which is out of this core's scope; here it simply arrives
/// pre-computed on the event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppMessage {
    pub cid: Cid,
    pub kind: AppMessageKind,
    pub payload: Vec<u8>,
    pub sent_date: TimeStamp,
    pub medias: Vec<MediaRef>,
    pub target_cid: Option<Cid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMessageEvent {
    pub context: EventContext,
    pub message: AppMessage,
}

/// The decoded body of a `SetUserInfo` `AppMessage` (spec §4.4). Carries
/// the same shape the teacher's `AccountUserInfo` sends into a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfoPayload {
    pub display_name: String,
    pub avatar_cid: Option<CidWire>,
}

/// The decoded body of a `UserReaction` `AppMessage` (spec §4.5). `set`
/// mirrors the Reaction's boolean `state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionPayload {
    pub emoji: String,
    pub set: bool,
}

/// Response to `GroupInfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupInfo {
    pub group_pk: Base64Id,
    pub member_pk: Base64Id,
}

pub type MetadataStream = Pin<Box<dyn Stream<Item = GroupMetadataEvent> + Send>>;
pub type MessageStream = Pin<Box<dyn Stream<Item = GroupMessageEvent> + Send>>;

/// The lower-level cryptographic protocol service (out of scope per spec
/// §1; modeled here only as the trait the projector calls through).
#[trait_variant::make(ProtocolClient: Send)]
pub trait LocalProtocolClient: Send + Sync {
    async fn instance_get_configuration(&self) -> anyhow::Result<()>;

    /// Looks up a group by its own public key, or derives one from a
    /// contact's public key (spec §6: `GroupInfo(GroupPK | ContactPK)`).
    async fn group_info_by_group(&self, group_pk: &Base64Id) -> anyhow::Result<GroupInfo>;
    async fn group_info_by_contact(&self, contact_pk: &Base64Id) -> anyhow::Result<GroupInfo>;

    async fn activate_group(&self, group_pk: &Base64Id) -> anyhow::Result<()>;

    async fn app_message_send(&self, group_pk: &Base64Id, payload: AppMessage) -> anyhow::Result<()>;

    /// Subscribe the event loop to this group's metadata stream (spec
    /// §4.1 "subscribe the event loop to the group's metadata ...
    /// streams"; spec §4.6 "two long-lived subscriptions"). Returns the
    /// stream itself; the event loop owns draining it in order.
    async fn subscribe_to_metadata(&self, group_pk: &Base64Id) -> anyhow::Result<MetadataStream>;

    /// Subscribe the event loop to this group's message stream.
    async fn subscribe_to_messages(&self, group_pk: &Base64Id) -> anyhow::Result<MessageStream>;
}
