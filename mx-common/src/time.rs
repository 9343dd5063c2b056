use chrono::{DateTime, Utc};

/// A monotonic, sender-stamped timestamp used throughout the model wherever
/// the spec talks about a "sent-date", "info-date", or "state-date"; these
/// are all the same underlying type, named differently only to keep the
/// monotonicity rule each one participates in readable at the call site.
pub type TimeStamp = DateTime<Utc>;
