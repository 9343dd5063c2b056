//! The persistent store (spec §2: "Store (external), Typed persistence
//! with a transactional unit-of-work scope"). Out of scope per spec §1 as
//! a concrete production backend; this module defines the trait boundary
//! plus one concrete, fully in-memory implementation suitable for a
//! single-process embedding and for this core's own tests, grounded on
//! `coreclient/src/store/{mod.rs,memory.rs}`'s `Store` trait /
//! `InMemoryStore`.

mod memory;
mod transaction;

pub use memory::InMemoryStore;
pub use transaction::{StoreTransaction, Upserted};

use crate::error::StoreError;
use crate::model::{Account, Contact, Conversation, Device, Interaction, Media, Member, MemberKey, Reaction};
use mx_common::{Base64Id, Cid};

pub type StoreResult<T> = Result<T, StoreError>;

/// Read accessors a handler needs *before* deciding how to mutate state,
/// plus the transactional unit-of-work entry point. Reads are served from
/// the latest committed snapshot; a transaction started via `begin` sees
/// a consistent snapshot of its own for its whole lifetime (spec §5).
#[trait_variant::make(Store: Send)]
pub trait LocalStore: Send + Sync {
    async fn load_account(&self) -> StoreResult<Option<Account>>;
    async fn load_contact(&self, contact_pk: &Base64Id) -> StoreResult<Option<Contact>>;
    async fn load_conversation(&self, group_pk: &Base64Id) -> StoreResult<Option<Conversation>>;
    async fn load_member(&self, key: &MemberKey) -> StoreResult<Option<Member>>;
    async fn load_device(&self, device_pk: &Base64Id) -> StoreResult<Option<Device>>;
    async fn load_interaction(&self, cid: &Cid) -> StoreResult<Option<Interaction>>;
    async fn load_reactions_for_target(&self, target_cid: &Cid) -> StoreResult<Vec<Reaction>>;
    async fn load_media(&self, cid: &Cid) -> StoreResult<Option<Media>>;

    /// Start a unit-of-work against a consistent snapshot of the store.
    /// The caller performs all mutations for one event against the
    /// returned transaction and finishes with [`Store::commit`] or simply
    /// drops it to roll back (spec §4.1: "errors inside a transaction
    /// roll it back").
    async fn begin(&self) -> StoreTransaction;

    /// Atomically apply a transaction's mutations and return the events
    /// it staged for dispatch. Per spec §O2, the caller must not dispatch
    /// any of the returned events until this call returns successfully.
    async fn commit(&self, txn: StoreTransaction) -> StoreResult<Vec<crate::dispatcher::StreamEvent>>;
}
