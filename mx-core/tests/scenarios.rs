//! The concrete scenarios from the specification's "Testable Properties /
//! Scenarios" discussion, each driven directly through the projector's two
//! public entry points against the in-memory fakes. Grounded on
//! `coreclient/src/chats/status.rs`'s `#[sqlx::test]` fixture-then-assert
//! style, adapted to `#[tokio::test]` since this core's store is in-memory.

use mx_core::dispatcher::StreamEvent;
use mx_core::error::ProjectorError;
use mx_core::model::{AppMessageKind, ContactState, ConversationKind};
use mx_core::protocol::{GroupMessageEvent, GroupMetadataEvent, MetadataPayload};
use mx_test_harness::{TestHarness, acknowledge, cid, event_context, group_info, id, sent_date, set_user_info, user_message, user_reaction};

/// A `MultiMemberType` conversation with one remote member/device already
/// attributed, ready to receive app messages from that device.
async fn multi_member_with_device(harness: &TestHarness, group_pk: &mx_common::Base64Id, device_pk: &mx_common::Base64Id, member_pk: &mx_common::Base64Id) {
    harness
        .projector
        .project_metadata(GroupMetadataEvent {
            context: event_context(group_pk.clone(), device_pk.clone()),
            payload: MetadataPayload::AccountGroupJoined { known_contact_pk: None },
        })
        .await
        .unwrap();
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

/// Scenario: an Acknowledge arrives before the message it targets. Once
/// the target message arrives, exactly one `InteractionUpdated` fires for
/// it, already carrying `acknowledged = true`.
#[tokio::test]
async fn ack_before_message_resolves_on_arrival() {
    let harness = TestHarness::new();
    let group_pk = id(1);
    let device_pk = id(2);
    let member_pk = id(3);
    multi_member_with_device(&harness, &group_pk, &device_pk, &member_pk).await;

    let target_cid = cid(99);
    let ack_cid = cid(10);
    harness.dispatcher.clear();

    harness
        .projector
        .project_app_message(GroupMessageEvent {
            context: event_context(group_pk.clone(), device_pk.clone()),
            message: acknowledge(ack_cid.clone(), target_cid.clone(), sent_date(1)),
        })
        .await
        .unwrap();

    harness
        .projector
        .project_app_message(GroupMessageEvent {
            context: event_context(group_pk.clone(), device_pk.clone()),
            message: user_message(target_cid.clone(), None, sent_date(2), b"hello".to_vec()),
        })
        .await
        .unwrap();

    let events = harness.dispatcher.events();
    let mut target_updates = 0;
    let mut saw_ack_deleted = false;
    for event in &events {
        match event {
            StreamEvent::InteractionUpdated { view, is_new } if view.interaction.cid == target_cid => {
                target_updates += 1;
                assert!(*is_new, "the target's first update must be its insertion");
                assert!(view.interaction.acknowledged, "target must arrive already acknowledged");
            }
            StreamEvent::InteractionDeleted { cid } if *cid == ack_cid => saw_ack_deleted = true,
            _ => {}
        }
    }
    assert_eq!(target_updates, 1, "exactly one InteractionUpdated for the target");
    assert!(saw_ack_deleted, "the resolved backlog ack row must be deleted");
}

/// Scenario: a reaction arriving before its target is rejected with
/// `InvalidInput`; once the target exists, the identical reaction succeeds.
#[tokio::test]
async fn reaction_before_target_then_after() {
    let harness = TestHarness::new();
    let group_pk = id(1);
    let device_pk = id(2);
    let member_pk = id(3);
    multi_member_with_device(&harness, &group_pk, &device_pk, &member_pk).await;

    let target_cid = cid(50);
    let reaction_event = || GroupMessageEvent {
        context: event_context(group_pk.clone(), device_pk.clone()),
        message: user_reaction(cid(20), target_cid.clone(), sent_date(1), "👍", true),
    };

    let result = harness.projector.project_app_message(reaction_event()).await;
    assert!(matches!(result, Err(ProjectorError::InvalidInput(_))));

    harness
        .projector
        .project_app_message(GroupMessageEvent {
            context: event_context(group_pk.clone(), device_pk.clone()),
            message: user_message(target_cid.clone(), None, sent_date(2), b"hi".to_vec()),
        })
        .await
        .unwrap();

    harness.projector.project_app_message(reaction_event()).await.unwrap();

    let events = harness.dispatcher.events();
    let aggregated = events.iter().rev().find_map(|event| match event {
        StreamEvent::InteractionUpdated { view, .. } if view.interaction.cid == target_cid => {
            Some(view.aggregated_reactions.clone())
        }
        _ => None,
    });
    let aggregated = aggregated.expect("the target's interaction view must show the reaction");
    assert_eq!(aggregated.len(), 1);
    assert_eq!(aggregated[0].emoji, "👍");
    assert_eq!(aggregated[0].count, 1);
}

/// Scenario: an outgoing contact request activates its group twice, once
/// after it's sent, once more after the remote device shows up.
#[tokio::test]
async fn outgoing_contact_flow_activates_group_twice() {
    let harness = TestHarness::new();
    let local_device = id(1);
    let contact_pk = id(2);
    let group_pk = id(3);
    let remote_device = id(4);

    harness
        .protocol
        .set_group_info_for_contact(contact_pk.clone(), group_info(group_pk.clone(), contact_pk.clone()));

    harness
        .projector
        .project_metadata(GroupMetadataEvent {
            context: event_context(group_pk.clone(), local_device.clone()),
            payload: MetadataPayload::AccountContactRequestOutgoingEnqueued {
                contact_pk: contact_pk.clone(),
                display_name: "Bob".to_string(),
            },
        })
        .await
        .unwrap();

    harness
        .projector
        .project_metadata(GroupMetadataEvent {
            context: event_context(group_pk.clone(), local_device.clone()),
            payload: MetadataPayload::AccountContactRequestOutgoingSent {
                contact_pk: contact_pk.clone(),
            },
        })
        .await
        .unwrap();
    assert_eq!(harness.protocol.activated_groups(), vec![group_pk.clone()]);

    harness
        .projector
        .project_metadata(GroupMetadataEvent {
            context: event_context(group_pk.clone(), remote_device.clone()),
            payload: MetadataPayload::GroupMemberDeviceAdded {
                device_pk: remote_device.clone(),
                member_pk: contact_pk.clone(),
            },
        })
        .await
        .unwrap();

    assert_eq!(harness.protocol.activated_groups(), vec![group_pk.clone(), group_pk.clone()]);
    let contact = harness.store.load_contact(&contact_pk).await.unwrap().unwrap();
    assert_eq!(contact.state, ContactState::Accepted);
    assert_eq!(contact.conversation_pk, Some(group_pk));
}

/// Scenario: a `SetUserInfo` message from an as-yet-unattributed device is
/// parked, then applied once its device is attributed to a member.
#[tokio::test]
async fn setuserinfo_backlog_resolves_on_device_attribution() {
    let harness = TestHarness::new();
    let group_pk = id(1);
    let device_pk = id(2);
    let member_pk = id(3);

    harness
        .projector
        .project_metadata(GroupMetadataEvent {
            context: event_context(group_pk.clone(), device_pk.clone()),
            payload: MetadataPayload::AccountGroupJoined { known_contact_pk: None },
        })
        .await
        .unwrap();

    harness
        .projector
        .project_app_message(GroupMessageEvent {
            context: event_context(group_pk.clone(), device_pk.clone()),
            message: set_user_info(cid(7), sent_date(1), "Carol"),
        })
        .await
        .unwrap();

    let backlog = harness.store.load_interaction(&cid(7)).await.unwrap();
    assert!(backlog.is_some(), "the SetUserInfo backlog row must exist before attribution");
    assert_eq!(backlog.unwrap().kind, AppMessageKind::SetUserInfo);

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

    assert!(
        harness.store.load_interaction(&cid(7)).await.unwrap().is_none(),
        "the backlog row is consumed once resolved"
    );
    let key = mx_core::model::MemberKey {
        member_pk,
        conversation_pk: group_pk,
    };
    let member = harness.store.load_member(&key).await.unwrap().unwrap();
    assert_eq!(member.display_name.as_deref(), Some("Carol"));
}

/// Scenario: a multi-member group joined without a known contact produces
/// a `MultiMemberType` conversation; the initial member announcement marks
/// exactly one member as `is_me`.
#[tokio::test]
async fn multi_member_initial_announcement_marks_self() {
    let harness = TestHarness::new();
    let group_pk = id(1);
    let device_pk = id(2);
    let me = id(3);
    let other = id(4);

    harness
        .protocol
        .set_group_info_for_group(group_pk.clone(), group_info(group_pk.clone(), me.clone()));

    harness
        .projector
        .project_metadata(GroupMetadataEvent {
            context: event_context(group_pk.clone(), device_pk.clone()),
            payload: MetadataPayload::AccountGroupJoined { known_contact_pk: None },
        })
        .await
        .unwrap();

    for member_pk in [me.clone(), other.clone()] {
        harness
            .projector
            .project_metadata(GroupMetadataEvent {
                context: event_context(group_pk.clone(), device_pk.clone()),
                payload: MetadataPayload::MultiMemberGroupInitialMemberAnnounced { member_pk },
            })
            .await
            .unwrap();
    }

    let conversation = harness.store.load_conversation(&group_pk).await.unwrap().unwrap();
    assert_eq!(conversation.kind, ConversationKind::MultiMemberType);

    let me_key = mx_core::model::MemberKey {
        member_pk: me,
        conversation_pk: group_pk.clone(),
    };
    let other_key = mx_core::model::MemberKey {
        member_pk: other,
        conversation_pk: group_pk,
    };
    assert!(harness.store.load_member(&me_key).await.unwrap().unwrap().is_me);
    assert!(!harness.store.load_member(&other_key).await.unwrap().unwrap().is_me);
}

/// Scenario: replaying the same batch of messages through a
/// `ProjectorConfig::replay()` harness lands on the same store state as a
/// live harness, but suppresses the dispatcher-visible side effects (unread
/// accounting, notifications) that only matter to a live session.
#[tokio::test]
async fn replaying_a_message_batch_matches_live_store_state() {
    const MESSAGE_COUNT: i64 = 100;

    let live = TestHarness::new();
    let replay = TestHarness::replay();
    let group_pk = id(1);
    let device_pk = id(2);
    let member_pk = id(3);
    multi_member_with_device(&live, &group_pk, &device_pk, &member_pk).await;
    multi_member_with_device(&replay, &group_pk, &device_pk, &member_pk).await;

    for i in 0..MESSAGE_COUNT {
        let message = user_message(cid(i as u8), None, sent_date(i), format!("message {i}").into_bytes());
        for harness in [&live, &replay] {
            harness
                .projector
                .project_app_message(GroupMessageEvent {
                    context: event_context(group_pk.clone(), device_pk.clone()),
                    message: message.clone(),
                })
                .await
                .unwrap();
        }
    }

    for i in 0..MESSAGE_COUNT {
        let target = cid(i as u8);
        let live_interaction = live.store.load_interaction(&target).await.unwrap().unwrap();
        let replay_interaction = replay.store.load_interaction(&target).await.unwrap().unwrap();
        assert_eq!(live_interaction.payload, replay_interaction.payload);
        assert_eq!(live_interaction.member_pk, replay_interaction.member_pk);
        assert_eq!(live_interaction.sent_date, replay_interaction.sent_date);
    }

    let live_conversation = live.store.load_conversation(&group_pk).await.unwrap().unwrap();
    let replay_conversation = replay.store.load_conversation(&group_pk).await.unwrap().unwrap();
    assert_eq!(live_conversation.unread_count, MESSAGE_COUNT as u32);
    assert_eq!(
        replay_conversation.unread_count, 0,
        "replay must not bump unread counters even though the rows themselves match"
    );

    assert_eq!(
        live.protocol.sent_messages().len(),
        MESSAGE_COUNT as usize,
        "a live run must Acknowledge every not-mine message"
    );
    assert!(
        replay.protocol.sent_messages().is_empty(),
        "replay must never emit outbound Acknowledge RPCs"
    );
    assert!(
        replay.dispatcher.events().iter().all(|event| !matches!(event, StreamEvent::Notified(_))),
        "replay must never emit Notified events"
    );
}
