//! Property-style tests for the projector's core invariants: idempotence,
//! ack commutativity, device-attribution backlog, SetUserInfo
//! monotonicity, reaction aggregation, and unread accounting. Each test
//! exercises one property directly through `Projector::project_metadata`/
//! `project_app_message` against the in-memory fakes.

use mx_core::dispatcher::StreamEvent;
use mx_core::model::MemberKey;
use mx_core::protocol::{GroupMessageEvent, GroupMetadataEvent, MetadataPayload};
use mx_test_harness::{TestHarness, acknowledge, cid, event_context, group_info, id, sent_date, set_user_info, user_message, user_reaction};

async fn joined_multi_member(harness: &TestHarness, group_pk: &mx_common::Base64Id, device_pk: &mx_common::Base64Id) {
    harness
        .projector
        .project_metadata(GroupMetadataEvent {
            context: event_context(group_pk.clone(), device_pk.clone()),
            payload: MetadataPayload::AccountGroupJoined { known_contact_pk: None },
        })
        .await
        .unwrap();
}

async fn add_device(harness: &TestHarness, group_pk: &mx_common::Base64Id, device_pk: &mx_common::Base64Id, member_pk: &mx_common::Base64Id) {
    harness
        .projector
        .project_metadata(GroupMetadataEvent {
            context: event_context(group_pk.clone(), device_pk.clone()),
            payload: MetadataPayload::GroupMemberDeviceAdded {
                device_pk: device_pk.clone(),
                member_pk: member_pk.clone(),
            },
        })
        .await
        .unwrap();
}

/// P1: reprocessing the exact same event twice leaves the store unchanged
/// and dispatches nothing the second time.
#[tokio::test]
async fn idempotent_replay_of_a_duplicate_message() {
    let harness = TestHarness::new();
    let group_pk = id(1);
    let device_pk = id(2);
    let member_pk = id(3);
    joined_multi_member(&harness, &group_pk, &device_pk).await;
    add_device(&harness, &group_pk, &device_pk, &member_pk).await;

    let message = user_message(cid(1), None, sent_date(1), b"hi".to_vec());
    let event = || GroupMessageEvent {
        context: event_context(group_pk.clone(), device_pk.clone()),
        message: message.clone(),
    };
    harness.projector.project_app_message(event()).await.unwrap();
    let conversation_after_first = harness.store.load_conversation(&group_pk).await.unwrap().unwrap();

    harness.dispatcher.clear();
    harness.projector.project_app_message(event()).await.unwrap();

    assert!(
        harness.dispatcher.events().is_empty(),
        "a duplicate message must not re-dispatch anything"
    );
    let conversation_after_second = harness.store.load_conversation(&group_pk).await.unwrap().unwrap();
    assert_eq!(conversation_after_first.unread_count, conversation_after_second.unread_count);
    assert_eq!(conversation_after_second.unread_count, 1);
}

/// P3: whichever order the Acknowledge and its target message arrive in,
/// the target ends up `acknowledged = true`.
#[tokio::test]
async fn ack_commutes_with_message_order() {
    let harness = TestHarness::new();
    let group_pk = id(1);
    let device_pk = id(2);
    let member_pk = id(3);
    joined_multi_member(&harness, &group_pk, &device_pk).await;
    add_device(&harness, &group_pk, &device_pk, &member_pk).await;

    let target_cid = cid(5);
    harness
        .projector
        .project_app_message(GroupMessageEvent {
            context: event_context(group_pk.clone(), device_pk.clone()),
            message: user_message(target_cid.clone(), None, sent_date(1), b"hi".to_vec()),
        })
        .await
        .unwrap();

    harness.dispatcher.clear();
    harness
        .projector
        .project_app_message(GroupMessageEvent {
            context: event_context(group_pk.clone(), device_pk.clone()),
            message: acknowledge(cid(6), target_cid.clone(), sent_date(2)),
        })
        .await
        .unwrap();

    let interaction = harness.store.load_interaction(&target_cid).await.unwrap().unwrap();
    assert!(interaction.acknowledged);

    let saw_update = harness.dispatcher.events().iter().any(|event| {
        matches!(event, StreamEvent::InteractionUpdated { view, is_new: false } if view.interaction.cid == target_cid)
    });
    assert!(saw_update, "marking acknowledged after the fact must re-emit an update");
}

/// P4: a message from a not-yet-attributed device is stored visibly with
/// `member_pk = None`; once the device is attributed, the same row is
/// updated in place, never duplicated.
#[tokio::test]
async fn device_attribution_backlog_resolves_in_place() {
    let harness = TestHarness::new();
    let group_pk = id(1);
    let device_pk = id(2);
    let member_pk = id(3);
    joined_multi_member(&harness, &group_pk, &device_pk).await;

    let message_cid = cid(9);
    harness
        .projector
        .project_app_message(GroupMessageEvent {
            context: event_context(group_pk.clone(), device_pk.clone()),
            message: user_message(message_cid.clone(), None, sent_date(1), b"hi".to_vec()),
        })
        .await
        .unwrap();

    let before = harness.store.load_interaction(&message_cid).await.unwrap().unwrap();
    assert_eq!(before.member_pk, None);

    harness.dispatcher.clear();
    add_device(&harness, &group_pk, &device_pk, &member_pk).await;

    let after = harness.store.load_interaction(&message_cid).await.unwrap().unwrap();
    assert_eq!(after.member_pk, Some(member_pk));

    let updates: Vec<_> = harness
        .dispatcher
        .events()
        .into_iter()
        .filter(|event| matches!(event, StreamEvent::InteractionUpdated { view, .. } if view.interaction.cid == message_cid))
        .collect();
    assert_eq!(updates.len(), 1, "attribution must update the existing row exactly once");
}

/// P5: a `SetUserInfo` update older than the target's current `info_date`
/// never overwrites it, regardless of arrival order.
#[tokio::test]
async fn setuserinfo_is_monotonic() {
    let harness = TestHarness::new();
    let group_pk = id(1);
    let device_pk = id(2);
    let member_pk = id(3);
    joined_multi_member(&harness, &group_pk, &device_pk).await;
    add_device(&harness, &group_pk, &device_pk, &member_pk).await;

    harness
        .projector
        .project_app_message(GroupMessageEvent {
            context: event_context(group_pk.clone(), device_pk.clone()),
            message: set_user_info(cid(1), sent_date(10), "Newer Name"),
        })
        .await
        .unwrap();

    harness
        .projector
        .project_app_message(GroupMessageEvent {
            context: event_context(group_pk.clone(), device_pk.clone()),
            message: set_user_info(cid(2), sent_date(2), "Stale Name"),
        })
        .await
        .unwrap();

    let key = MemberKey {
        member_pk,
        conversation_pk: group_pk,
    };
    let member = harness.store.load_member(&key).await.unwrap().unwrap();
    assert_eq!(member.display_name.as_deref(), Some("Newer Name"));
}

/// P6: reactions from two members aggregate by emoji; `own_state` reflects
/// whether any contributing member is the local user.
#[tokio::test]
async fn reactions_aggregate_by_emoji_across_members() {
    let harness = TestHarness::new();
    let group_pk = id(1);
    let me = id(2);
    let other = id(3);
    let device_me = id(4);
    let device_other = id(5);

    harness
        .protocol
        .set_group_info_for_group(group_pk.clone(), group_info(group_pk.clone(), me.clone()));

    joined_multi_member(&harness, &group_pk, &device_me).await;
    for member_pk in [me.clone(), other.clone()] {
        harness
            .projector
            .project_metadata(GroupMetadataEvent {
                context: event_context(group_pk.clone(), device_me.clone()),
                payload: MetadataPayload::MultiMemberGroupInitialMemberAnnounced { member_pk },
            })
            .await
            .unwrap();
    }
    add_device(&harness, &group_pk, &device_me, &me).await;
    add_device(&harness, &group_pk, &device_other, &other).await;

    let target_cid = cid(7);
    harness
        .projector
        .project_app_message(GroupMessageEvent {
            context: event_context(group_pk.clone(), device_other.clone()),
            message: user_message(target_cid.clone(), None, sent_date(1), b"hi".to_vec()),
        })
        .await
        .unwrap();

    for device in [device_me.clone(), device_other.clone()] {
        harness
            .projector
            .project_app_message(GroupMessageEvent {
                context: event_context(group_pk.clone(), device),
                message: user_reaction(cid(100), target_cid.clone(), sent_date(2), "🎉", true),
            })
            .await
            .unwrap();
    }

    let reactions = harness.store.load_reactions_for_target(&target_cid).await.unwrap();
    assert_eq!(reactions.len(), 2);
    let mine = reactions.iter().filter(|r| r.is_mine).count();
    assert_eq!(mine, 1, "only the announced self member's reaction is mine");
}

/// P7: a message the local user sent never bumps the conversation's
/// unread count, even though it's still a visible interaction.
#[tokio::test]
async fn own_messages_do_not_increment_unread() {
    let harness = TestHarness::new();
    let group_pk = id(1);
    let me = id(2);
    let device_me = id(3);

    harness
        .protocol
        .set_group_info_for_group(group_pk.clone(), group_info(group_pk.clone(), me.clone()));
    joined_multi_member(&harness, &group_pk, &device_me).await;
    harness
        .projector
        .project_metadata(GroupMetadataEvent {
            context: event_context(group_pk.clone(), device_me.clone()),
            payload: MetadataPayload::MultiMemberGroupInitialMemberAnnounced { member_pk: me.clone() },
        })
        .await
        .unwrap();
    add_device(&harness, &group_pk, &device_me, &me).await;

    harness
        .projector
        .project_app_message(GroupMessageEvent {
            context: event_context(group_pk.clone(), device_me.clone()),
            message: user_message(cid(1), None, sent_date(1), b"hi from me".to_vec()),
        })
        .await
        .unwrap();

    let conversation = harness.store.load_conversation(&group_pk).await.unwrap().unwrap();
    assert_eq!(conversation.unread_count, 0);
}
