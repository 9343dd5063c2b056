//! AppMessage Router: dispatch table keyed by `AppMessageKind` (spec §4.2).
//! Grounded on the same `process_qs.rs` transactional shape as
//! [`super::metadata`], plus `coreclient/src/groups/process.rs`'s handling
//! of out-of-order protocol messages for the backlog cases here.

use tracing::warn;

use crate::dispatcher::{Dispatcher, Notification, NotificationKind};
use crate::error::ProjectorError;
use crate::model::{AppMessageKind, ConversationKind, Interaction, Media, MemberKey};
use crate::protocol::{AppMessage, EventContext, GroupMessageEvent, MediaRef, ProtocolClient, ReactionPayload, UserInfoPayload};
use crate::store::{Store, StoreTransaction, Upserted};
use mx_common::Cid;
use mx_common::codec::MxCodec;

use super::Projector;

impl<S: Store, D: Dispatcher, P: ProtocolClient> Projector<S, D, P> {
    /// Public entry point for the message stream (spec §4.2). Unknown
    /// message kinds are logged and ignored, never an error.
    pub async fn project_app_message(&self, event: GroupMessageEvent) -> Result<(), ProjectorError> {
        self.project_app_message_inner(&event.context, event.message).await
    }

    /// Shared by [`Self::project_app_message`] and the `GroupMetadataPayloadSent`
    /// re-entry path in [`super::metadata`].
    pub(super) async fn project_app_message_inner(
        &self,
        context: &EventContext,
        message: AppMessage,
    ) -> Result<(), ProjectorError> {
        match message.kind.clone() {
            AppMessageKind::Acknowledge => self.handle_acknowledge(context, &message).await,
            AppMessageKind::GroupInvitation => self.handle_group_invitation(context, &message).await,
            AppMessageKind::UserMessage => self.handle_user_message(context, &message).await,
            AppMessageKind::SetUserInfo => self.handle_set_user_info(context, &message).await,
            AppMessageKind::ReplyOptions => self.handle_reply_options(context, &message).await,
            AppMessageKind::UserReaction => self.handle_user_reaction(context, &message).await,
            AppMessageKind::Unknown(kind) => {
                warn!(kind, "unknown app message kind, ignoring");
                Ok(())
            }
        }
    }

    async fn handle_acknowledge(&self, context: &EventContext, message: &AppMessage) -> Result<(), ProjectorError> {
        let target_cid = message
            .target_cid
            .clone()
            .ok_or_else(|| ProjectorError::invalid_input("acknowledge without a target_cid"))?;

        let mut txn = self.store.begin().await;
        if txn.interaction(&target_cid).is_some() {
            txn.mark_acknowledged(&target_cid);
        } else {
            // The ack beat its target here (spec §4.3 case 2); park it as
            // a backlog row, resolved when the target is later inserted
            // (see `insert_with_ack_resolution`).
            let member_pk = txn.device(&context.device_pk).map(|device| device.member_pk.clone());
            let is_mine = self.is_mine(&txn, &context.group_pk, member_pk.as_ref());
            txn.insert_interaction(Interaction {
                cid: message.cid.clone(),
                kind: AppMessageKind::Acknowledge,
                payload: message.payload.clone(),
                sent_date: message.sent_date,
                conversation_pk: context.group_pk.clone(),
                device_pk: context.device_pk.clone(),
                member_pk,
                is_mine,
                target_cid: Some(target_cid),
                medias: Vec::new(),
                acknowledged: false,
            });
        }
        self.commit_and_dispatch(txn).await
    }

    async fn handle_group_invitation(&self, context: &EventContext, message: &AppMessage) -> Result<(), ProjectorError> {
        let mut txn = self.store.begin().await;
        let (interaction, medias) = self.build_interaction(&txn, context, message);
        let is_mine = interaction.is_mine;
        let upserted = insert_with_ack_resolution(&mut txn, interaction, medias);
        if upserted.is_new() {
            self.on_visible_insert(
                &mut txn,
                &context.group_pk,
                is_mine,
                Some(Notification {
                    kind: NotificationKind::GroupInvitation,
                    title: "Group invitation".to_string(),
                    body: String::new(),
                    payload: message.cid.as_bytes().to_vec(),
                }),
            );
        }
        self.commit_and_dispatch(txn).await
    }

    async fn handle_user_message(&self, context: &EventContext, message: &AppMessage) -> Result<(), ProjectorError> {
        let mut txn = self.store.begin().await;
        let (interaction, medias) = self.build_interaction(&txn, context, message);
        let is_mine = interaction.is_mine;
        let upserted = insert_with_ack_resolution(&mut txn, interaction, medias);
        let is_new = upserted.is_new();
        if is_new {
            self.on_visible_insert(
                &mut txn,
                &context.group_pk,
                is_mine,
                Some(Notification {
                    kind: NotificationKind::NewMessage,
                    title: "New message".to_string(),
                    body: String::new(),
                    payload: message.cid.as_bytes().to_vec(),
                }),
            );
        }
        self.commit_and_dispatch(txn).await?;

        // Eagerly send an Acknowledge for a new, not-mine message, unless
        // this is a replay (spec §4.2 "UserMessage" row; spec §4.6 "no
        // outbound Acknowledge is sent" during replay). Per spec §9 open
        // question (c), no debounce/coalescing; sent synchronously here.
        if is_new && !is_mine && !self.context.config.replay {
            self.send_acknowledge(&context.group_pk, &message.cid).await?;
        }
        Ok(())
    }

    /// Sends an `Acknowledge` app message targeting `target_cid` into
    /// `group_pk` (spec §4.2 "UserMessage" row).
    async fn send_acknowledge(&self, group_pk: &mx_common::Base64Id, target_cid: &Cid) -> Result<(), ProjectorError> {
        let cid = Cid::from_bytes(uuid::Uuid::new_v4().as_bytes().to_vec())
            .map_err(|_| ProjectorError::invalid_input("failed to mint an acknowledge cid"))?;
        let ack = AppMessage {
            cid,
            kind: AppMessageKind::Acknowledge,
            payload: Vec::new(),
            sent_date: chrono::Utc::now(),
            medias: Vec::new(),
            target_cid: Some(target_cid.clone()),
        };
        self.protocol
            .app_message_send(group_pk, ack)
            .await
            .map_err(ProjectorError::GroupInfo)
    }

    async fn handle_reply_options(&self, context: &EventContext, message: &AppMessage) -> Result<(), ProjectorError> {
        let mut txn = self.store.begin().await;
        let (interaction, medias) = self.build_interaction(&txn, context, message);
        let is_mine = interaction.is_mine;
        let upserted = insert_with_ack_resolution(&mut txn, interaction, medias);
        if upserted.is_new() {
            // No notification kind fits a reply-options message (spec §6
            // only names NewMessage, GroupInvitation, ContactRequest).
            self.on_visible_insert(&mut txn, &context.group_pk, is_mine, None);
        }
        self.commit_and_dispatch(txn).await
    }

    async fn handle_set_user_info(&self, context: &EventContext, message: &AppMessage) -> Result<(), ProjectorError> {
        let info: UserInfoPayload = MxCodec::from_slice(&message.payload)?;
        let mut txn = self.store.begin().await;
        let kind = txn.conversation(&context.group_pk).map(|conversation| conversation.kind);

        match kind {
            Some(ConversationKind::ContactType) => {
                let contact_pk = txn
                    .conversation(&context.group_pk)
                    .and_then(|conversation| conversation.contact_pk.clone());
                if let Some(contact_pk) = contact_pk {
                    // Our own send_own_user_info (metadata.rs) lands back on
                    // this same stream; applying it here would overwrite the
                    // remote contact's display name with our own (spec §4.4:
                    // "own-originated SetUserInfo in 1-to-1 conversations is
                    // ignored"). The sending device's member-pk is the
                    // account's own public key exactly when the message is
                    // ours, since a ContactType group only ever has two
                    // member-pks: the account's and the contact's.
                    let sender_pk = txn.device(&context.device_pk).map(|device| device.member_pk.clone());
                    let is_mine = match (sender_pk, txn.account()) {
                        (Some(sender_pk), Some(account)) => sender_pk == account.account_pk,
                        _ => false,
                    };
                    if !is_mine {
                        txn.apply_setuserinfo_to_contact(&contact_pk, &info.display_name, message.sent_date);
                    }
                }
            }
            Some(ConversationKind::MultiMemberType) | None => {
                let member_pk = txn.device(&context.device_pk).map(|device| device.member_pk.clone());
                match member_pk {
                    Some(member_pk) => {
                        let key = MemberKey {
                            member_pk,
                            conversation_pk: context.group_pk.clone(),
                        };
                        txn.apply_setuserinfo_to_member(&key, &info.display_name, message.sent_date);
                    }
                    None => {
                        // Device not yet attributed to a member; park this
                        // as a backlog row, resolved in
                        // `GroupMemberDeviceAdded` (spec §4.3 case 1).
                        txn.insert_interaction(Interaction {
                            cid: message.cid.clone(),
                            kind: AppMessageKind::SetUserInfo,
                            payload: message.payload.clone(),
                            sent_date: message.sent_date,
                            conversation_pk: context.group_pk.clone(),
                            device_pk: context.device_pk.clone(),
                            member_pk: None,
                            is_mine: false,
                            target_cid: None,
                            medias: Vec::new(),
                            acknowledged: false,
                        });
                    }
                }
            }
        }
        self.commit_and_dispatch(txn).await
    }

    async fn handle_user_reaction(&self, context: &EventContext, message: &AppMessage) -> Result<(), ProjectorError> {
        let target_cid = message
            .target_cid
            .clone()
            .ok_or_else(|| ProjectorError::invalid_input("reaction without a target_cid"))?;
        let payload: ReactionPayload = MxCodec::from_slice(&message.payload)?;

        let mut txn = self.store.begin().await;
        if txn.interaction(&target_cid).is_none() {
            // Dropping `txn` without committing rolls back any reads-only
            // state (there is none here); the caller sees this as a plain
            // error, not a backlog case (scenario: "reaction before its
            // target yields InvalidInput").
            return Err(ProjectorError::invalid_input("reaction target not found"));
        }
        let member_pk = txn
            .device(&context.device_pk)
            .map(|device| device.member_pk.clone())
            .ok_or_else(|| ProjectorError::invalid_input("reaction from an unattributed device"))?;
        let is_mine = self.is_mine(&txn, &context.group_pk, Some(&member_pk));

        let changed = txn.upsert_reaction(
            target_cid.clone(),
            member_pk,
            payload.emoji,
            is_mine,
            payload.set,
            message.sent_date,
        );
        if changed {
            txn.emit_interaction_updated(&target_cid, false);
        }
        self.commit_and_dispatch(txn).await
    }

    /// Assembles the `Interaction` and its attached `Media` rows for any
    /// app-message kind that becomes a visible interaction (spec §4.2).
    /// Resolves `member_pk`/`is_mine` from the sending device and
    /// precomputes `acknowledged` from any ack that arrived first (spec
    /// §4.3 case 2); the actual store write happens in
    /// [`insert_with_ack_resolution`].
    fn build_interaction(
        &self,
        txn: &StoreTransaction,
        context: &EventContext,
        message: &AppMessage,
    ) -> (Interaction, Vec<Media>) {
        let member_pk = txn.device(&context.device_pk).map(|device| device.member_pk.clone());
        let is_mine = self.is_mine(txn, &context.group_pk, member_pk.as_ref());
        let acknowledged = !txn.acks_targeting(&message.cid).is_empty();
        let medias = medias_from_refs(&message.cid, &message.medias);

        let interaction = Interaction {
            cid: message.cid.clone(),
            kind: message.kind.clone(),
            payload: message.payload.clone(),
            sent_date: message.sent_date,
            conversation_pk: context.group_pk.clone(),
            device_pk: context.device_pk.clone(),
            member_pk,
            is_mine,
            target_cid: message.target_cid.clone(),
            medias: medias.iter().map(|media| media.cid.clone()).collect(),
            acknowledged,
        };
        (interaction, medias)
    }
}

/// Inserts `interaction`, and on first insertion attaches its media rows
/// and resolves any ack that arrived before it (spec §4.3 case 2). A
/// duplicate insertion (replay) leaves both untouched.
fn insert_with_ack_resolution(
    txn: &mut StoreTransaction,
    interaction: Interaction,
    medias: Vec<Media>,
) -> Upserted<Interaction> {
    let cid = interaction.cid.clone();
    let resolved_acks = txn.acks_targeting(&cid);
    let upserted = txn.insert_interaction(interaction);
    if upserted.is_new() {
        for media in medias {
            txn.insert_media(media);
        }
        for ack_cid in resolved_acks {
            txn.delete_interaction(&ack_cid);
        }
    }
    upserted
}

fn medias_from_refs(interaction_cid: &Cid, refs: &[MediaRef]) -> Vec<Media> {
    refs.iter()
        .filter_map(|media_ref| {
            let cid = Cid::try_from(media_ref.cid.clone()).ok()?;
            Some(Media {
                cid,
                interaction_cid: interaction_cid.clone(),
                mime_type: media_ref.mime_type.clone(),
                display_name: media_ref.display_name.clone(),
                filename: media_ref.filename.clone(),
                state: media_ref.state.into(),
            })
        })
        .collect()
}
