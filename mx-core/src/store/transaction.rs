//! The unit-of-work returned by [`super::Store::begin`]. All mutation
//! helpers here are infallible: by the time a projector handler reaches a
//! store call it has already validated its input (spec §7 `InvalidInput`
//! is raised earlier, before any store call). Every helper that changes
//! externally-visible state stages the matching [`StreamEvent`] itself,
//! so a handler can never forget to notify on a path that mutates;
//! mirrored on `StoreNotificationBuilder` in `coreclient/src/store/
//! notification.rs`, which centralizes the same bookkeeping.

use std::collections::HashMap;

use chrono::Utc;
use mx_common::{Base64Id, Cid, TimeStamp};

use crate::dispatcher::{InteractionView, StreamEvent};
use crate::model::{
    AggregatedReaction, AppMessageKind, Account, Contact, ContactState, Conversation,
    ConversationKind, Device, Interaction, Media, Member, MemberKey, Reaction, ReplicationInfo,
};

/// Whether a keyed upsert touched an existing row or created a new one;
/// the mechanism behind spec §7's `AlreadyExists`: a duplicate write
/// surfaces as `Upserted::Existing` instead of an error (see
/// `SPEC_FULL.md` §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted<T> {
    New(T),
    Existing(T),
}

impl<T> Upserted<T> {
    pub fn is_new(&self) -> bool {
        matches!(self, Upserted::New(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Upserted::New(value) | Upserted::Existing(value) => value,
        }
    }

    pub fn as_inner(&self) -> &T {
        match self {
            Upserted::New(value) | Upserted::Existing(value) => value,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(super) struct InnerState {
    pub(super) account: Option<Account>,
    pub(super) contacts: HashMap<Base64Id, Contact>,
    pub(super) conversations: HashMap<Base64Id, Conversation>,
    pub(super) members: HashMap<MemberKey, Member>,
    pub(super) devices: HashMap<Base64Id, Device>,
    pub(super) interactions: HashMap<Cid, Interaction>,
    pub(super) reactions: HashMap<(Cid, Base64Id, String), Reaction>,
    pub(super) medias: HashMap<Cid, Media>,
}

pub struct StoreTransaction {
    pub(super) inner: InnerState,
    pub(super) pending: Vec<StreamEvent>,
}

impl StoreTransaction {
    pub(super) fn new(inner: InnerState) -> Self {
        Self {
            inner,
            pending: Vec::new(),
        }
    }

    pub(super) fn into_parts(self) -> (InnerState, Vec<StreamEvent>) {
        (self.inner, self.pending)
    }

    // -- reads, served from this transaction's own snapshot --

    pub fn account(&self) -> Option<&Account> {
        self.inner.account.as_ref()
    }

    pub fn contact(&self, contact_pk: &Base64Id) -> Option<&Contact> {
        self.inner.contacts.get(contact_pk)
    }

    pub fn conversation(&self, group_pk: &Base64Id) -> Option<&Conversation> {
        self.inner.conversations.get(group_pk)
    }

    pub fn member(&self, key: &MemberKey) -> Option<&Member> {
        self.inner.members.get(key)
    }

    pub fn device(&self, device_pk: &Base64Id) -> Option<&Device> {
        self.inner.devices.get(device_pk)
    }

    pub fn interaction(&self, cid: &Cid) -> Option<&Interaction> {
        self.inner.interactions.get(cid)
    }

    pub fn media(&self, cid: &Cid) -> Option<&Media> {
        self.inner.medias.get(cid)
    }

    pub fn reactions_for_target(&self, target_cid: &Cid) -> Vec<&Reaction> {
        self.inner
            .reactions
            .values()
            .filter(|r| &r.target_cid == target_cid)
            .collect()
    }

    /// Backlog rows awaiting device-to-member attribution for `device_pk`
    /// (spec §4.3 case 1), excluding `SetUserInfo` rows, which are
    /// consumed rather than attributed.
    pub fn pending_attribution_for_device(&self, device_pk: &Base64Id) -> Vec<Cid> {
        self.inner
            .interactions
            .values()
            .filter(|i| {
                i.device_pk == *device_pk
                    && i.member_pk.is_none()
                    && i.kind != AppMessageKind::SetUserInfo
            })
            .map(|i| i.cid.clone())
            .collect()
    }

    /// The latest-by-sent-date `SetUserInfo` backlog row for `device_pk`,
    /// if any (spec §4.3 case 1, §4.4).
    pub fn setuserinfo_backlog_for_device(&self, device_pk: &Base64Id) -> Option<&Interaction> {
        self.inner
            .interactions
            .values()
            .filter(|i| {
                i.device_pk == *device_pk
                    && i.member_pk.is_none()
                    && i.kind == AppMessageKind::SetUserInfo
            })
            .max_by_key(|i| i.sent_date)
    }

    /// Ack rows awaiting `target_cid` (spec §4.3 case 2).
    pub fn acks_targeting(&self, target_cid: &Cid) -> Vec<Cid> {
        self.inner
            .interactions
            .values()
            .filter(|i| i.kind == AppMessageKind::Acknowledge && i.target_cid.as_ref() == Some(target_cid))
            .map(|i| i.cid.clone())
            .collect()
    }

    pub fn aggregate_reactions(&self, target_cid: &Cid) -> Vec<AggregatedReaction> {
        aggregate(self.reactions_for_target(target_cid))
    }

    fn interaction_view(&self, cid: &Cid) -> Option<InteractionView> {
        let interaction = self.inner.interactions.get(cid)?.clone();
        let aggregated_reactions = self.aggregate_reactions(cid);
        Some(InteractionView {
            interaction,
            aggregated_reactions,
        })
    }

    // -- writes; each stages its own StreamEvent --

    pub fn upsert_account(&mut self, account_pk: Base64Id, display_name: String) -> Upserted<Account> {
        if let Some(existing) = self.inner.account.clone() {
            self.pending.push(StreamEvent::AccountUpdated {
                account: existing.clone(),
                is_new: false,
            });
            return Upserted::Existing(existing);
        }
        let account = Account {
            account_pk,
            display_name,
            avatar_cid: None,
            service_tokens: Vec::new(),
        };
        self.inner.account = Some(account.clone());
        self.pending.push(StreamEvent::AccountUpdated {
            account: account.clone(),
            is_new: true,
        });
        Upserted::New(account)
    }

    pub fn append_service_token(&mut self, token: String) {
        if let Some(account) = self.inner.account.as_mut() {
            account.service_tokens.push(token);
            self.pending.push(StreamEvent::AccountUpdated {
                account: account.clone(),
                is_new: false,
            });
        }
    }

    pub fn upsert_contact(
        &mut self,
        contact_pk: Base64Id,
        display_name: String,
        state: ContactState,
        conversation_pk: Option<Base64Id>,
    ) -> Upserted<Contact> {
        if let Some(existing) = self.inner.contacts.get(&contact_pk).cloned() {
            self.pending.push(StreamEvent::ContactUpdated {
                contact: existing.clone(),
                is_new: false,
            });
            return Upserted::Existing(existing);
        }
        let contact = Contact {
            contact_pk: contact_pk.clone(),
            display_name,
            conversation_pk,
            state,
            info_date: None,
        };
        self.inner.contacts.insert(contact_pk, contact.clone());
        self.pending.push(StreamEvent::ContactUpdated {
            contact: contact.clone(),
            is_new: true,
        });
        Upserted::New(contact)
    }

    /// Returns `None` if no contact exists for `contact_pk`, a caller
    /// bug, not a `StoreError`, per spec §7's `InvalidInput` being the
    /// caller's responsibility to raise earlier.
    pub fn set_contact_state(&mut self, contact_pk: &Base64Id, state: ContactState) -> Option<Contact> {
        let contact = self.inner.contacts.get_mut(contact_pk)?;
        contact.state = state;
        let contact = contact.clone();
        self.pending.push(StreamEvent::ContactUpdated {
            contact: contact.clone(),
            is_new: false,
        });
        Some(contact)
    }

    pub fn upsert_conversation(
        &mut self,
        group_pk: Base64Id,
        kind: ConversationKind,
        contact_pk: Option<Base64Id>,
    ) -> Upserted<Conversation> {
        if let Some(existing) = self.inner.conversations.get(&group_pk).cloned() {
            self.pending.push(StreamEvent::ConversationUpdated {
                conversation: existing.clone(),
                is_new: false,
            });
            return Upserted::Existing(existing);
        }
        let mut conversation = Conversation::new(group_pk.clone(), kind);
        conversation.contact_pk = contact_pk;
        self.inner.conversations.insert(group_pk, conversation.clone());
        self.pending.push(StreamEvent::ConversationUpdated {
            conversation: conversation.clone(),
            is_new: true,
        });
        Upserted::New(conversation)
    }

    pub fn set_conversation_replication_info(
        &mut self,
        group_pk: &Base64Id,
        info: ReplicationInfo,
    ) -> Option<Conversation> {
        let conversation = self.inner.conversations.get_mut(group_pk)?;
        conversation.replication_info = Some(info);
        let conversation = conversation.clone();
        self.pending.push(StreamEvent::ConversationUpdated {
            conversation: conversation.clone(),
            is_new: false,
        });
        Some(conversation)
    }

    pub fn increment_unread(&mut self, group_pk: &Base64Id) -> Option<Conversation> {
        let conversation = self.inner.conversations.get_mut(group_pk)?;
        conversation.unread_count += 1;
        let conversation = conversation.clone();
        self.pending.push(StreamEvent::ConversationUpdated {
            conversation: conversation.clone(),
            is_new: false,
        });
        Some(conversation)
    }

    pub fn upsert_member(&mut self, key: MemberKey, is_creator: bool, is_me: bool) -> Upserted<Member> {
        if let Some(existing) = self.inner.members.get(&key).cloned() {
            self.pending.push(StreamEvent::MemberUpdated {
                member: existing.clone(),
                is_new: false,
            });
            return Upserted::Existing(existing);
        }
        let mut member = Member::new(key.clone());
        member.is_creator = is_creator;
        member.is_me = is_me;
        self.inner.members.insert(key, member.clone());
        self.pending.push(StreamEvent::MemberUpdated {
            member: member.clone(),
            is_new: true,
        });
        Upserted::New(member)
    }

    pub fn apply_member_info(
        &mut self,
        key: &MemberKey,
        display_name: String,
        sent_date: TimeStamp,
    ) -> Option<Member> {
        let member = self.inner.members.get_mut(key)?;
        member.display_name = Some(display_name);
        member.info_date = Some(sent_date);
        let member = member.clone();
        self.pending.push(StreamEvent::MemberUpdated {
            member: member.clone(),
            is_new: false,
        });
        Some(member)
    }

    pub fn register_device(&mut self, device_pk: Base64Id, member_pk: Base64Id) -> Upserted<Device> {
        if let Some(existing) = self.inner.devices.get(&device_pk).cloned() {
            self.pending.push(StreamEvent::DeviceUpdated {
                device: existing.clone(),
                is_new: false,
            });
            return Upserted::Existing(existing);
        }
        let device = Device { device_pk: device_pk.clone(), member_pk };
        self.inner.devices.insert(device_pk, device.clone());
        self.pending.push(StreamEvent::DeviceUpdated {
            device: device.clone(),
            is_new: true,
        });
        Upserted::New(device)
    }

    pub fn insert_interaction(&mut self, interaction: Interaction) -> Upserted<Interaction> {
        if let Some(existing) = self.inner.interactions.get(&interaction.cid).cloned() {
            return Upserted::Existing(existing);
        }
        let cid = interaction.cid.clone();
        self.inner.interactions.insert(cid.clone(), interaction.clone());
        if let Some(view) = self.interaction_view(&cid) {
            self.pending.push(StreamEvent::InteractionUpdated {
                view,
                is_new: true,
            });
        }
        Upserted::New(interaction)
    }

    /// Record one attachment referenced by a newly inserted interaction
    /// (spec §6 `Media`, `SPEC_FULL.md` §4.7). A duplicate `cid` is a
    /// no-op: media rows are addressed by their own content id, which is
    /// stable across replay.
    pub fn insert_media(&mut self, media: Media) -> Upserted<Media> {
        if let Some(existing) = self.inner.medias.get(&media.cid).cloned() {
            return Upserted::Existing(existing);
        }
        let cid = media.cid.clone();
        self.inner.medias.insert(cid, media.clone());
        self.pending.push(StreamEvent::MediaUpdated {
            media: media.clone(),
            is_new: true,
        });
        Upserted::New(media)
    }

    pub fn delete_interaction(&mut self, cid: &Cid) -> Option<Interaction> {
        let removed = self.inner.interactions.remove(cid)?;
        self.pending.push(StreamEvent::InteractionDeleted { cid: cid.clone() });
        Some(removed)
    }

    pub fn mark_acknowledged(&mut self, cid: &Cid) -> Option<Interaction> {
        let interaction = self.inner.interactions.get_mut(cid)?;
        interaction.acknowledged = true;
        let interaction = interaction.clone();
        if let Some(view) = self.interaction_view(cid) {
            self.pending.push(StreamEvent::InteractionUpdated {
                view,
                is_new: false,
            });
        }
        Some(interaction)
    }

    /// Set the member-pk of every backlog row in `cids` to `member_pk`
    /// and re-emit an `InteractionUpdated` for each (spec §4.3 case 1).
    pub fn attribute_interactions(&mut self, cids: &[Cid], member_pk: &Base64Id) {
        for cid in cids {
            if let Some(interaction) = self.inner.interactions.get_mut(cid) {
                interaction.member_pk = Some(member_pk.clone());
            }
            if let Some(view) = self.interaction_view(cid) {
                self.pending.push(StreamEvent::InteractionUpdated {
                    view,
                    is_new: false,
                });
            }
        }
    }

    /// Apply the `SetUserInfo` monotonicity rule (spec §4.4): only takes
    /// effect if `sent_date` is strictly greater than the target's
    /// current `info_date`. Returns whether it was applied.
    pub fn apply_setuserinfo_to_contact(
        &mut self,
        contact_pk: &Base64Id,
        display_name: &str,
        sent_date: TimeStamp,
    ) -> bool {
        let Some(contact) = self.inner.contacts.get_mut(contact_pk) else {
            return false;
        };
        if contact.info_date.is_some_and(|current| current >= sent_date) {
            return false;
        }
        contact.display_name = display_name.to_string();
        contact.info_date = Some(sent_date);
        let contact = contact.clone();
        self.pending.push(StreamEvent::ContactUpdated {
            contact,
            is_new: false,
        });
        true
    }

    pub fn apply_setuserinfo_to_member(
        &mut self,
        key: &MemberKey,
        display_name: &str,
        sent_date: TimeStamp,
    ) -> bool {
        let Some(member) = self.inner.members.get_mut(key) else {
            return false;
        };
        if member.info_date.is_some_and(|current| current >= sent_date) {
            return false;
        }
        member.display_name = Some(display_name.to_string());
        member.info_date = Some(sent_date);
        let member = member.clone();
        self.pending.push(StreamEvent::MemberUpdated {
            member,
            is_new: false,
        });
        true
    }

    /// Apply the reaction semantics of spec §4.5: insert if no row for
    /// `(target_cid, member_pk, emoji)` exists yet, otherwise update only
    /// if `state_date` is strictly newer. Returns whether a write
    /// occurred (the caller uses this to decide whether to re-emit
    /// `InteractionUpdated` for the target).
    pub fn upsert_reaction(
        &mut self,
        target_cid: Cid,
        member_pk: Base64Id,
        emoji: String,
        is_mine: bool,
        state: bool,
        state_date: TimeStamp,
    ) -> bool {
        let key = (target_cid.clone(), member_pk.clone(), emoji.clone());
        match self.inner.reactions.get_mut(&key) {
            None => {
                self.inner.reactions.insert(
                    key,
                    Reaction {
                        target_cid,
                        member_pk,
                        emoji,
                        is_mine,
                        state,
                        state_date,
                    },
                );
                true
            }
            Some(existing) if state_date > existing.state_date => {
                existing.state = state;
                existing.state_date = state_date;
                true
            }
            Some(_) => false,
        }
    }

    pub fn emit_interaction_updated(&mut self, cid: &Cid, is_new: bool) {
        if let Some(view) = self.interaction_view(cid) {
            self.pending.push(StreamEvent::InteractionUpdated { view, is_new });
        }
    }

    pub fn stage_notification(&mut self, notification: crate::dispatcher::Notification) {
        self.pending.push(StreamEvent::Notified(notification));
    }

    pub fn now(&self) -> TimeStamp {
        Utc::now()
    }
}

fn aggregate(reactions: Vec<&Reaction>) -> Vec<AggregatedReaction> {
    // One entry per emoji with at least one member currently in state
    // `true` (spec §4.5): group, count, and compute `own_state` as "any
    // contributing member is mine".
    let mut by_emoji: HashMap<&str, (usize, bool)> = HashMap::new();
    for reaction in reactions.into_iter().filter(|r| r.state) {
        let entry = by_emoji.entry(reaction.emoji.as_str()).or_insert((0, false));
        entry.0 += 1;
        entry.1 |= reaction.is_mine;
    }
    let mut result: Vec<AggregatedReaction> = by_emoji
        .into_iter()
        .map(|(emoji, (count, own_state))| AggregatedReaction {
            emoji: emoji.to_string(),
            count,
            own_state,
        })
        .collect();
    result.sort_by(|a, b| a.emoji.cmp(&b.emoji));
    result
}
