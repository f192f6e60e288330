use crate::event::{BranchEvent, EventId};
use crate::tree::NodeId;

/// The one outstanding, not yet accepted or rejected, change to a model.
///
/// Proposing is only legal from `Clean`. `commit` and `revert` are the only
/// ways back to `Clean`.
#[derive(Debug, Clone, PartialEq)]
pub enum Proposal<P> {
    Clean,
    /// A freshly created event.
    Added { event: EventId },
    /// An event relocated by a local or global move.
    Moved {
        event: EventId,
        previous_node: NodeId,
        previous_map_time: f64,
    },
    /// An event taken off the tree; held here until the decision.
    Deleted { event: BranchEvent<P> },
    /// A change to the event-rate hyperparameter.
    EventRate { previous: f64 },
}

impl<P> Default for Proposal<P> {
    fn default() -> Self {
        Self::Clean
    }
}

impl<P> Proposal<P> {
    /// Short label for logs and errors.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Added { .. } => "add",
            Self::Moved { .. } => "move",
            Self::Deleted { .. } => "delete",
            Self::EventRate { .. } => "event-rate",
        }
    }

    #[must_use]
    pub const fn is_clean(&self) -> bool {
        matches!(self, Self::Clean)
    }

    /// The event touched by this proposal, if it touched one.
    #[must_use]
    pub const fn last_event_modified(&self) -> Option<EventId> {
        match self {
            Self::Added { event } | Self::Moved { event, .. } => Some(*event),
            Self::Deleted { event } => Some(event.id()),
            Self::Clean | Self::EventRate { .. } => None,
        }
    }
}
