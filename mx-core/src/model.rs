//! The durable local view this core projects protocol events into: see
//! spec §3 ("DATA MODEL"): Account, Contact, Conversation, Member, Device,
//! Interaction, Media, Reaction, plus the small value types they're built
//! from (`ContactState`, `ConversationKind`, `AppMessageKind`, ...).

use mx_common::{Base64Id, Cid, TimeStamp};

/// The local identity. Singleton per store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub account_pk: Base64Id,
    pub display_name: String,
    pub avatar_cid: Option<Cid>,
    pub service_tokens: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactState {
    Unknown,
    IncomingRequest,
    OutgoingRequestEnqueued,
    OutgoingRequestSent,
    Accepted,
}

/// A remote identity the local user knows. Keyed by `contact_pk`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub contact_pk: Base64Id,
    pub display_name: String,
    /// The 1-to-1 group this contact corresponds to, once known.
    pub conversation_pk: Option<Base64Id>,
    pub state: ContactState,
    /// Monotonic timestamp of the last accepted `SetUserInfo` update.
    pub info_date: Option<TimeStamp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationKind {
    ContactType,
    MultiMemberType,
}

/// `TODO` field per spec §9 open question (b): the originating repo never
/// populates `member_public_key`; left `None` here rather than guessed at.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReplicationInfo {
    pub member_public_key: Option<Base64Id>,
    pub payload: Vec<u8>,
}

/// A chat room. Keyed by `group_pk`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub group_pk: Base64Id,
    pub kind: ConversationKind,
    pub contact_pk: Option<Base64Id>,
    pub display_name: Option<String>,
    pub unread_count: u32,
    pub last_read: Option<TimeStamp>,
    pub replication_info: Option<ReplicationInfo>,
    pub opened: bool,
}

impl Conversation {
    pub fn new(group_pk: Base64Id, kind: ConversationKind) -> Self {
        Self {
            group_pk,
            kind,
            contact_pk: None,
            display_name: None,
            unread_count: 0,
            last_read: None,
            replication_info: None,
            opened: false,
        }
    }
}

/// Identity scoped to a conversation. Composite key `(member_pk,
/// conversation_pk)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberKey {
    pub member_pk: Base64Id,
    pub conversation_pk: Base64Id,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub key: MemberKey,
    pub display_name: Option<String>,
    pub avatar_cid: Option<Cid>,
    pub is_me: bool,
    pub is_creator: bool,
    pub info_date: Option<TimeStamp>,
}

impl Member {
    pub fn new(key: MemberKey) -> Self {
        Self {
            key,
            display_name: None,
            avatar_cid: None,
            is_me: false,
            is_creator: false,
            info_date: None,
        }
    }
}

/// A physical device, belonging to exactly one member (invariant I1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub device_pk: Base64Id,
    pub member_pk: Base64Id,
}

/// `Unknown` preserves forward compatibility (spec §4.2: "Unknown
/// app-message types are logged and dropped").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AppMessageKind {
    Acknowledge,
    GroupInvitation,
    UserMessage,
    SetUserInfo,
    ReplyOptions,
    UserReaction,
    Unknown(String),
}

/// A message or event in a conversation. Keyed by `cid`.
///
/// `member_pk = None` marks a backlog row pending device-to-member
/// attribution (invariant I2); see [`crate::projector`]'s backlog
/// resolution in `GroupMemberDeviceAdded` handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interaction {
    pub cid: Cid,
    pub kind: AppMessageKind,
    pub payload: Vec<u8>,
    pub sent_date: TimeStamp,
    pub conversation_pk: Base64Id,
    pub device_pk: Base64Id,
    pub member_pk: Option<Base64Id>,
    pub is_mine: bool,
    /// Non-empty for acks, reactions, and replies.
    pub target_cid: Option<Cid>,
    pub medias: Vec<Cid>,
    pub acknowledged: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaState {
    NeverDownloaded,
    Downloading,
    Downloaded,
}

/// Attached to one interaction via `interaction_cid`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Media {
    pub cid: Cid,
    pub interaction_cid: Cid,
    pub mime_type: String,
    pub display_name: Option<String>,
    pub filename: Option<String>,
    pub state: MediaState,
}

/// Keyed by `(target_cid, member_pk, emoji)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
    pub target_cid: Cid,
    pub member_pk: Base64Id,
    pub emoji: String,
    pub is_mine: bool,
    /// `true` = set, `false` = unset.
    pub state: bool,
    pub state_date: TimeStamp,
}

/// The recomputed-on-read view a subscriber sees attached to an
/// `Interaction` (spec §4.5 / §4.7): one entry per emoji currently `true`
/// for at least one member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedReaction {
    pub emoji: String,
    pub count: usize,
    pub own_state: bool,
}
