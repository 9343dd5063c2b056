//! Metadata Router: dispatch table keyed by metadata event type (spec
//! §4.1, "Metadata event semantics"). Grounded on `coreclient/src/groups/
//! process.rs`'s phased inline commentary style and on `coreclient/src/
//! clients/process/mod.rs`'s per-event-type match dispatch.

use chrono::Utc;
use mx_common::Cid;
use mx_common::codec::MxCodec;
use tracing::warn;
use uuid::Uuid;

use crate::dispatcher::{Dispatcher, Notification, NotificationKind};
use crate::error::ProjectorError;
use crate::model::{AppMessageKind, ContactState, ConversationKind, MemberKey, ReplicationInfo};
use crate::protocol::{AppMessage, EventContext, GroupMetadataEvent, MetadataPayload, ProtocolClient, UserInfoPayload};
use crate::store::Store;
use mx_common::Base64Id;

use super::Projector;

impl<S: Store, D: Dispatcher, P: ProtocolClient> Projector<S, D, P> {
    /// Public entry point for the metadata stream (spec §4.1). Unknown
    /// event types are logged and ignored, never an error, to preserve
    /// forward compatibility.
    pub async fn project_metadata(&self, event: GroupMetadataEvent) -> Result<(), ProjectorError> {
        let group_pk = event.context.group_pk.clone();
        match event.payload {
            MetadataPayload::AccountGroupJoined { known_contact_pk } => {
                self.handle_account_group_joined(group_pk, known_contact_pk).await
            }
            MetadataPayload::AccountContactRequestOutgoingEnqueued {
                contact_pk,
                display_name,
            } => self.handle_contact_request_outgoing_enqueued(contact_pk, display_name).await,
            MetadataPayload::AccountContactRequestOutgoingSent { contact_pk } => {
                self.handle_contact_request_outgoing_sent(group_pk, contact_pk).await
            }
            MetadataPayload::AccountContactRequestIncomingReceived {
                contact_pk,
                display_name,
            } => {
                self.handle_contact_request_incoming_received(group_pk, contact_pk, display_name)
                    .await
            }
            MetadataPayload::AccountContactRequestIncomingAccepted { contact_pk } => {
                self.handle_contact_request_incoming_accepted(group_pk, contact_pk).await
            }
            MetadataPayload::GroupMemberDeviceAdded { device_pk, member_pk } => {
                self.handle_group_member_device_added(group_pk, device_pk, member_pk).await
            }
            MetadataPayload::GroupMetadataPayloadSent { app_message } => {
                self.handle_group_metadata_payload_sent(event.context, app_message).await
            }
            MetadataPayload::AccountServiceTokenAdded { token } => self.handle_account_service_token_added(token).await,
            MetadataPayload::GroupReplicating { payload } => self.handle_group_replicating(group_pk, payload).await,
            MetadataPayload::MultiMemberGroupInitialMemberAnnounced { member_pk } => {
                self.handle_multi_member_initial_member_announced(group_pk, member_pk).await
            }
            MetadataPayload::Unknown(event_type) => {
                warn!(event_type, "unknown metadata event type, ignoring");
                Ok(())
            }
        }
    }

    async fn handle_account_group_joined(
        &self,
        group_pk: Base64Id,
        known_contact_pk: Option<Base64Id>,
    ) -> Result<(), ProjectorError> {
        let kind = if known_contact_pk.is_some() {
            ConversationKind::ContactType
        } else {
            ConversationKind::MultiMemberType
        };
        let mut txn = self.store.begin().await;
        let upserted = txn.upsert_conversation(group_pk.clone(), kind, known_contact_pk);
        let is_new = upserted.is_new();
        self.commit_and_dispatch(txn).await?;

        if is_new {
            self.protocol.activate_group(&group_pk).await.map_err(ProjectorError::GroupInfo)?;
            self.request_subscription(&group_pk, true, true);
        }
        Ok(())
    }

    async fn handle_contact_request_outgoing_enqueued(
        &self,
        contact_pk: Base64Id,
        display_name: String,
    ) -> Result<(), ProjectorError> {
        if contact_pk.is_empty() {
            return Err(ProjectorError::invalid_input("empty contact_pk"));
        }
        // Derive the contact's group-pk via GroupInfo before writing
        // anything, so the Conversation we create already carries it
        // (spec §4.1: "derive group-pk from payload or by calling
        // GroupInfo(contactPK)").
        let group_info = self
            .protocol
            .group_info_by_contact(&contact_pk)
            .await
            .map_err(ProjectorError::GroupInfo)?;

        let mut txn = self.store.begin().await;
        txn.upsert_contact(
            contact_pk.clone(),
            display_name,
            ContactState::OutgoingRequestEnqueued,
            Some(group_info.group_pk.clone()),
        );
        txn.upsert_conversation(
            group_info.group_pk,
            ConversationKind::ContactType,
            Some(contact_pk),
        );
        self.commit_and_dispatch(txn).await
    }

    async fn handle_contact_request_outgoing_sent(
        &self,
        group_pk: Base64Id,
        contact_pk: Base64Id,
    ) -> Result<(), ProjectorError> {
        let mut txn = self.store.begin().await;
        let updated = txn.set_contact_state(&contact_pk, ContactState::OutgoingRequestSent);
        self.commit_and_dispatch(txn).await?;

        if updated.is_some() {
            self.protocol.activate_group(&group_pk).await.map_err(ProjectorError::GroupInfo)?;
            self.send_own_user_info(&group_pk).await?;
            self.request_subscription(&group_pk, true, false);
        }
        Ok(())
    }

    async fn handle_contact_request_incoming_received(
        &self,
        group_pk: Base64Id,
        contact_pk: Base64Id,
        display_name: String,
    ) -> Result<(), ProjectorError> {
        if contact_pk.is_empty() {
            return Err(ProjectorError::invalid_input("empty contact_pk"));
        }
        let mut txn = self.store.begin().await;
        let upserted = txn.upsert_contact(
            contact_pk.clone(),
            display_name.clone(),
            ContactState::IncomingRequest,
            Some(group_pk.clone()),
        );
        txn.upsert_conversation(group_pk, ConversationKind::ContactType, Some(contact_pk.clone()));
        if upserted.is_new() && !self.context.config.replay {
            txn.stage_notification(Notification {
                kind: NotificationKind::ContactRequest,
                title: "New contact request".to_string(),
                body: display_name,
                payload: contact_pk.as_bytes().to_vec(),
            });
        }
        self.commit_and_dispatch(txn).await
    }

    async fn handle_contact_request_incoming_accepted(
        &self,
        group_pk: Base64Id,
        contact_pk: Base64Id,
    ) -> Result<(), ProjectorError> {
        let mut txn = self.store.begin().await;
        let updated = txn.set_contact_state(&contact_pk, ContactState::Accepted);
        self.commit_and_dispatch(txn).await?;

        if updated.is_some() {
            self.protocol.activate_group(&group_pk).await.map_err(ProjectorError::GroupInfo)?;
            self.send_own_user_info(&group_pk).await?;
            self.request_subscription(&group_pk, false, true);
        }
        Ok(())
    }

    async fn handle_group_member_device_added(
        &self,
        group_pk: Base64Id,
        device_pk: Base64Id,
        member_pk: Base64Id,
    ) -> Result<(), ProjectorError> {
        if device_pk.is_empty() || member_pk.is_empty() {
            return Err(ProjectorError::invalid_input("empty device_pk or member_pk"));
        }

        let mut txn = self.store.begin().await;
        txn.register_device(device_pk.clone(), member_pk.clone());

        // A contact's remote device showing up while we're waiting on
        // their acceptance is itself the acceptance signal for the
        // outgoing side of a connection (scenario 3: "ActivateGroup
        // invoked twice: after Sent, after device added").
        let reactivate_group = txn
            .contact(&member_pk)
            .filter(|contact| contact.state == ContactState::OutgoingRequestSent)
            .and_then(|contact| contact.conversation_pk.clone());
        if reactivate_group.is_some() {
            txn.set_contact_state(&member_pk, ContactState::Accepted);
        }

        // Drain the backlog for this device, transactionally with the
        // member upsert it resolves (spec §4.3 case 1).
        let pending_cids = txn.pending_attribution_for_device(&device_pk);
        let setuserinfo_backlog = txn.setuserinfo_backlog_for_device(&device_pk).cloned();

        let key = MemberKey {
            member_pk: member_pk.clone(),
            conversation_pk: group_pk.clone(),
        };
        txn.upsert_member(key.clone(), false, false);
        txn.attribute_interactions(&pending_cids, &member_pk);

        if let Some(entry) = setuserinfo_backlog {
            match MxCodec::from_slice::<UserInfoPayload>(&entry.payload) {
                Ok(info) => {
                    txn.apply_member_info(&key, info.display_name, entry.sent_date);
                }
                Err(error) => warn!(%error, "failed to decode backlog SetUserInfo payload"),
            }
            txn.delete_interaction(&entry.cid);
        }

        self.commit_and_dispatch(txn).await?;

        if let Some(target_group_pk) = reactivate_group {
            self.protocol
                .activate_group(&target_group_pk)
                .await
                .map_err(ProjectorError::GroupInfo)?;
            self.request_subscription(&target_group_pk, false, true);
        }
        Ok(())
    }

    /// Unwraps the embedded `AppMessage` and re-enters `ProjectAppMessage`
    /// using this event's own context (spec §4.1), a direct internal
    /// call rather than a queued re-injection, per `SPEC_FULL.md` §9, so
    /// the re-entrant projection completes before this handler returns.
    async fn handle_group_metadata_payload_sent(
        &self,
        context: EventContext,
        app_message_bytes: Vec<u8>,
    ) -> Result<(), ProjectorError> {
        let app_message: AppMessage = match MxCodec::from_slice(&app_message_bytes) {
            Ok(message) => message,
            Err(error) => {
                warn!(%error, "failed to decode embedded app message from metadata payload");
                return Ok(());
            }
        };
        self.project_app_message_inner(&context, app_message).await
    }

    async fn handle_account_service_token_added(&self, token: String) -> Result<(), ProjectorError> {
        let mut txn = self.store.begin().await;
        txn.append_service_token(token);
        self.commit_and_dispatch(txn).await
    }

    async fn handle_group_replicating(&self, group_pk: Base64Id, payload: Vec<u8>) -> Result<(), ProjectorError> {
        let mut txn = self.store.begin().await;
        // `member_public_key` is left `None`: the originating repo never
        // populates it either (spec §9 open question (b)).
        let info = ReplicationInfo {
            member_public_key: None,
            payload,
        };
        txn.set_conversation_replication_info(&group_pk, info)
            .ok_or_else(|| ProjectorError::DbWrite(anyhow::anyhow!("no such conversation: {group_pk}")))?;
        self.commit_and_dispatch(txn).await
    }

    async fn handle_multi_member_initial_member_announced(
        &self,
        group_pk: Base64Id,
        member_pk: Base64Id,
    ) -> Result<(), ProjectorError> {
        let group_info = self
            .protocol
            .group_info_by_group(&group_pk)
            .await
            .map_err(ProjectorError::GroupInfo)?;
        let is_me = member_pk == group_info.member_pk;

        let mut txn = self.store.begin().await;
        let key = MemberKey {
            member_pk,
            conversation_pk: group_pk,
        };
        // Per spec §9 open question (a): on a pre-existing row, no
        // additional fields are merged beyond is_creator/is_me, and
        // `upsert_member` already leaves an `Existing` row untouched.
        txn.upsert_member(key, true, is_me);
        self.commit_and_dispatch(txn).await
    }

    /// Sends the local account's display name/avatar into `group_pk` as a
    /// `SetUserInfo` app message (spec §4.1: "send local AccountUserInfo
    /// into that group"). A no-op if the account hasn't been created yet.
    pub(super) async fn send_own_user_info(&self, group_pk: &Base64Id) -> Result<(), ProjectorError> {
        let account = self
            .store
            .load_account()
            .await
            .map_err(|error| ProjectorError::DbRead(error.into()))?;
        let Some(account) = account else {
            return Ok(());
        };
        let payload = UserInfoPayload {
            display_name: account.display_name,
            avatar_cid: account.avatar_cid.as_ref().map(Into::into),
        };
        let encoded = MxCodec::to_vec(&payload)?;
        let cid = Cid::from_bytes(Uuid::new_v4().as_bytes().to_vec())
            .map_err(|_| ProjectorError::invalid_input("failed to mint a local message cid"))?;
        let app_message = AppMessage {
            cid,
            kind: AppMessageKind::SetUserInfo,
            payload: encoded,
            sent_date: Utc::now(),
            medias: Vec::new(),
            target_cid: None,
        };
        self.protocol
            .app_message_send(group_pk, app_message)
            .await
            .map_err(ProjectorError::GroupInfo)
    }
}
