//! Configuration the projector owns (spec §4.6, §9: "Replay flag is
//! configuration, not mode state"). Everything here is set once at
//! construction and never mutated afterward.

use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct ProjectorConfig {
    /// When set, no outbound Acknowledge is sent, no notifications are
    /// dispatched, and unread counts are not incremented (spec §4.6).
    pub replay: bool,
}

impl ProjectorConfig {
    pub fn live() -> Self {
        Self { replay: false }
    }

    pub fn replay() -> Self {
        Self { replay: true }
    }
}

/// The ambient cancellation context handed to the projector at
/// construction (spec §5): suspension points observe it and return
/// promptly without further dispatches once cancelled.
#[derive(Debug, Clone)]
pub struct ProjectorContext {
    pub config: ProjectorConfig,
    pub cancellation: CancellationToken,
}

impl ProjectorContext {
    pub fn new(config: ProjectorConfig) -> Self {
        Self {
            config,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}
