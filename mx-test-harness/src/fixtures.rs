//! Builders for ids, timestamps, and wire shapes so a scenario test reads
//! as a sequence of events rather than a pile of struct literals. Grounded
//! on `coreclient/src/chats/persistence.rs`'s `tests::test_chat*` builder
//! functions.

use chrono::{DateTime, Duration, Utc};
use mx_common::codec::MxCodec;
use mx_common::{Base64Id, Cid, TimeStamp};
use mx_core::model::AppMessageKind;
use mx_core::protocol::{AppMessage, EventContext, GroupInfo, ReactionPayload, UserInfoPayload};
use uuid::Uuid;

/// A `Base64Id` built from a repeated byte, for readable test ids
/// (`member(1)` vs `member(2)`).
pub fn id(seed: u8) -> Base64Id {
    Base64Id::from_bytes(vec![seed; 4])
}

/// A `Cid` built from a repeated byte.
pub fn cid(seed: u8) -> Cid {
    Cid::from_bytes(vec![seed; 16]).expect("seed bytes are never empty")
}

/// Anchored, strictly-ordered timestamps for monotonicity assertions
/// (spec §4.4 `I5`, §4.5): `sent_date(1) < sent_date(2)`, never `Utc::now()`
/// jitter.
pub fn sent_date(offset_millis: i64) -> TimeStamp {
    DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap() + Duration::milliseconds(offset_millis)
}

pub fn event_context(group_pk: Base64Id, device_pk: Base64Id) -> EventContext {
    EventContext {
        id: Uuid::new_v4(),
        group_pk,
        device_pk,
    }
}

pub fn group_info(group_pk: Base64Id, member_pk: Base64Id) -> GroupInfo {
    GroupInfo { group_pk, member_pk }
}

/// A plain `UserMessage` with an opaque payload and no attachments.
pub fn user_message(cid: Cid, target_cid: Option<Cid>, sent_date: TimeStamp, payload: Vec<u8>) -> AppMessage {
    AppMessage {
        cid,
        kind: AppMessageKind::UserMessage,
        payload,
        sent_date,
        medias: Vec::new(),
        target_cid,
    }
}

pub fn acknowledge(cid: Cid, target_cid: Cid, sent_date: TimeStamp) -> AppMessage {
    AppMessage {
        cid,
        kind: AppMessageKind::Acknowledge,
        payload: Vec::new(),
        sent_date,
        medias: Vec::new(),
        target_cid: Some(target_cid),
    }
}

pub fn set_user_info(cid: Cid, sent_date: TimeStamp, display_name: &str) -> AppMessage {
    let payload = MxCodec::to_vec(&UserInfoPayload {
        display_name: display_name.to_string(),
        avatar_cid: None,
    })
    .expect("UserInfoPayload always encodes");
    AppMessage {
        cid,
        kind: AppMessageKind::SetUserInfo,
        payload,
        sent_date,
        medias: Vec::new(),
        target_cid: None,
    }
}

pub fn user_reaction(cid: Cid, target_cid: Cid, sent_date: TimeStamp, emoji: &str, set: bool) -> AppMessage {
    let payload = MxCodec::to_vec(&ReactionPayload {
        emoji: emoji.to_string(),
        set,
    })
    .expect("ReactionPayload always encodes");
    AppMessage {
        cid,
        kind: AppMessageKind::UserReaction,
        payload,
        sent_date,
        medias: Vec::new(),
        target_cid: Some(target_cid),
    }
}
