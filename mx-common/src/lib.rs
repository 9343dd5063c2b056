//! Identifier and codec primitives shared by the messenger event-handling
//! core. Kept dependency-light and free of any protocol/store types so it
//! can be used from both the core and its test harness without a cycle.

pub mod codec;
pub mod identifiers;
pub mod time;

pub use identifiers::{Base64Id, Cid, IdentifierError};
pub use time::TimeStamp;
