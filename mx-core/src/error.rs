//! Tagged error kinds (spec §7, "ERROR HANDLING DESIGN"). `AlreadyExists`
//! is deliberately not a public variant here; see `SPEC_FULL.md` §7 and
//! [`crate::projector::Upserted`] for why it's handled as a return value
//! instead of an error.

use mx_common::Cid;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProjectorError {
    /// Malformed payload. Logged and swallowed by the caller for forward
    /// compatibility; never rolls back a transaction by itself.
    #[error("failed to decode event payload: {0}")]
    Deserialization(#[from] mx_common::codec::Error),

    #[error("store read failed: {0}")]
    DbRead(#[source] anyhow::Error),

    #[error("store write failed: {0}")]
    DbWrite(#[source] anyhow::Error),

    #[error("failed to add {entity}: {source}")]
    DbAdd {
        entity: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("protocol RPC failed: {0}")]
    GroupInfo(#[source] anyhow::Error),

    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    /// Dispatcher failure on emission after commit. Logged, never rolls
    /// back the (already-committed) transaction.
    #[error("dispatcher failed to emit event: {0}")]
    StreamEvent(#[source] anyhow::Error),
}

impl ProjectorError {
    pub fn invalid_input(reason: &'static str) -> Self {
        ProjectorError::InvalidInput(reason)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no such conversation: {0}")]
    NoSuchConversation(mx_common::Base64Id),
    #[error("no such member: {0:?}")]
    NoSuchMember(crate::model::MemberKey),
    #[error("no such interaction: {0}")]
    NoSuchInteraction(Cid),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
