//! Transforms a decoded event into store mutations and handles causal
//! backlog (spec §4.1, "PROJECTOR"). `Projector` is stateless beyond its
//! injected collaborators (spec §5) and is shared behind an `Arc` by the
//! event loop's per-group workers; its two public entry points,
//! `project_metadata` and `project_app_message`, are both total and
//! idempotent (spec §4.1).
//!
//! Grounded on `coreclient/src/clients/process/process_qs.rs`'s
//! transactional process-then-notify shape and per-message error
//! isolation, and on `coreclient/src/groups/process.rs`'s
//! `anyhow::{Context, Result, bail, ensure}` idiom.

mod app_message;
mod metadata;

use mx_common::Base64Id;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{ProjectorConfig, ProjectorContext};
use crate::dispatcher::{Dispatcher, Notification};
use crate::error::ProjectorError;
use crate::event_loop::SubscriptionRequest;
use crate::model::MemberKey;
use crate::protocol::ProtocolClient;
use crate::store::{Store, StoreTransaction};

pub struct Projector<S, D, P> {
    pub(crate) store: S,
    pub(crate) dispatcher: D,
    pub(crate) protocol: P,
    pub(crate) context: ProjectorContext,
    pub(crate) subscriptions: mpsc::UnboundedSender<SubscriptionRequest>,
}

impl<S: Store, D: Dispatcher, P: ProtocolClient> Projector<S, D, P> {
    pub fn new(
        store: S,
        dispatcher: D,
        protocol: P,
        context: ProjectorContext,
        subscriptions: mpsc::UnboundedSender<SubscriptionRequest>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            protocol,
            context,
            subscriptions,
        }
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.context.cancellation.clone()
    }

    pub fn config(&self) -> &ProjectorConfig {
        &self.context.config
    }

    /// Asks the event loop to start one or both of a group's
    /// subscriptions (spec §4.6). A no-op if the event loop has already
    /// shut down; requesting a subscription the loop already holds is
    /// harmless, it de-duplicates on its end.
    pub(crate) fn request_subscription(&self, group_pk: &Base64Id, metadata: bool, messages: bool) {
        let _ = self.subscriptions.send(SubscriptionRequest {
            group_pk: group_pk.clone(),
            metadata,
            messages,
        });
    }

    /// Whether `member_pk` is the local user's own identity within
    /// `conversation_pk`, per the `Member.is_me` flag. `None` (device not
    /// yet attributed to a member) is never mine.
    pub(crate) fn is_mine(
        &self,
        txn: &StoreTransaction,
        conversation_pk: &Base64Id,
        member_pk: Option<&Base64Id>,
    ) -> bool {
        let Some(member_pk) = member_pk else {
            return false;
        };
        let key = MemberKey {
            member_pk: member_pk.clone(),
            conversation_pk: conversation_pk.clone(),
        };
        txn.member(&key).map(|member| member.is_me).unwrap_or(false)
    }

    /// Commit-then-dispatch (spec §O2): a transaction's mutations become
    /// visible before any of the events it staged reach subscribers. A
    /// dispatch failure is logged but never unwinds the already-committed
    /// state (spec §7 `StreamEvent`).
    pub(crate) async fn commit_and_dispatch(&self, txn: StoreTransaction) -> Result<(), ProjectorError> {
        let events = self
            .store
            .commit(txn)
            .await
            .map_err(|error| ProjectorError::DbWrite(error.into()))?;
        for event in events {
            if let Err(error) = self.dispatcher.dispatch(event) {
                tracing::error!(%error, "dispatcher failed to emit event; state already committed");
            }
        }
        Ok(())
    }

    /// Applies the unread/notification side effects of a visible
    /// interaction's first arrival (spec §4.2 "Visible" column, invariant
    /// I6). A no-op during replay and for the local user's own
    /// interactions (spec §4.6 "Replay mode").
    pub(crate) fn on_visible_insert(
        &self,
        txn: &mut StoreTransaction,
        conversation_pk: &Base64Id,
        is_mine: bool,
        notification: Option<Notification>,
    ) {
        if self.context.config.replay || is_mine {
            return;
        }
        if let Some(conversation) = txn.conversation(conversation_pk)
            && !conversation.opened
        {
            txn.increment_unread(conversation_pk);
        }
        if let Some(notification) = notification {
            txn.stage_notification(notification);
        }
    }
}
