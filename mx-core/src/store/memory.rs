//! Single-process, in-memory `Store` implementation. Transactions are
//! copy-on-write snapshots of a small `Clone`-able state struct: `begin`
//! clones the currently-committed state, every mutation happens against
//! that private copy, and `commit` atomically swaps it back in, giving
//! real rollback-on-drop semantics without a WAL or a real database,
//! which is the right amount of machinery for the reference/test store
//! this core ships (the production `Store` is an external collaborator
//! per spec §1). Grounded on `coreclient/src/store/memory.rs`'s
//! `InMemoryStore` (`Arc<Mutex<InMemoryStoreInner>>`).

use std::sync::Arc;

use tokio::sync::Mutex;

use super::transaction::InnerState;
use super::{Store, StoreResult, StoreTransaction};
use crate::dispatcher::StreamEvent;
use crate::model::{Account, Contact, Conversation, Device, Interaction, Media, Member, MemberKey, Reaction};
use mx_common::{Base64Id, Cid};

#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<InnerState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for InMemoryStore {
    async fn load_account(&self) -> StoreResult<Option<Account>> {
        Ok(self.inner.lock().await.account.clone())
    }

    async fn load_contact(&self, contact_pk: &Base64Id) -> StoreResult<Option<Contact>> {
        Ok(self.inner.lock().await.contacts.get(contact_pk).cloned())
    }

    async fn load_conversation(&self, group_pk: &Base64Id) -> StoreResult<Option<Conversation>> {
        Ok(self.inner.lock().await.conversations.get(group_pk).cloned())
    }

    async fn load_member(&self, key: &MemberKey) -> StoreResult<Option<Member>> {
        Ok(self.inner.lock().await.members.get(key).cloned())
    }

    async fn load_device(&self, device_pk: &Base64Id) -> StoreResult<Option<Device>> {
        Ok(self.inner.lock().await.devices.get(device_pk).cloned())
    }

    async fn load_interaction(&self, cid: &Cid) -> StoreResult<Option<Interaction>> {
        Ok(self.inner.lock().await.interactions.get(cid).cloned())
    }

    async fn load_reactions_for_target(&self, target_cid: &Cid) -> StoreResult<Vec<Reaction>> {
        Ok(self
            .inner
            .lock()
            .await
            .reactions
            .values()
            .filter(|r| &r.target_cid == target_cid)
            .cloned()
            .collect())
    }

    async fn load_media(&self, cid: &Cid) -> StoreResult<Option<Media>> {
        Ok(self.inner.lock().await.medias.get(cid).cloned())
    }

    async fn begin(&self) -> StoreTransaction {
        let snapshot = self.inner.lock().await.clone();
        StoreTransaction::new(snapshot)
    }

    async fn commit(&self, txn: StoreTransaction) -> StoreResult<Vec<StreamEvent>> {
        let (inner, pending) = txn.into_parts();
        let mut guard = self.inner.lock().await;
        *guard = inner;
        drop(guard);
        Ok(pending)
    }
}

/// Devices belonging to a member, read accessor supplementing the data
/// model (spec §3 Device + `SPEC_FULL.md` §4.8). Scoped by
/// `conversation_pk` because a `member_pk` is only meaningful within the
/// `(member_pk, conversation_pk)` composite key (spec §3 `Member`);
/// returns empty if that member is not known in that conversation.
impl InMemoryStore {
    pub async fn devices_of_member(&self, member_pk: &Base64Id, conversation_pk: &Base64Id) -> Vec<Device> {
        let guard = self.inner.lock().await;
        let key = MemberKey {
            member_pk: member_pk.clone(),
            conversation_pk: conversation_pk.clone(),
        };
        if !guard.members.contains_key(&key) {
            return Vec::new();
        }
        guard
            .devices
            .values()
            .filter(|d| &d.member_pk == member_pk)
            .cloned()
            .collect()
    }
}
