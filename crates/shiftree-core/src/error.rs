use std::fmt;
use std::path::PathBuf;

use crate::event::EventId;
use crate::tree::{NodeId, TreeError};

/// Machine-readable error codes for chain drivers and log scrapers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidSettings,
    EventDataUnreadable,
    EventDataMalformed,
    SpeciesNotFound,
    InvalidTree,
    PositionOutOfRange,
    EventTimeOffBranch,
    EmptyRegistry,
    ProposalPending,
    NoPendingProposal,
    InvariantViolated,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidSettings => "E1001",
            Self::EventDataUnreadable => "E1002",
            Self::EventDataMalformed => "E1003",
            Self::SpeciesNotFound => "E1004",
            Self::InvalidTree => "E1005",
            Self::PositionOutOfRange => "E2001",
            Self::EventTimeOffBranch => "E2002",
            Self::EmptyRegistry => "E3001",
            Self::ProposalPending => "E3002",
            Self::NoPendingProposal => "E3003",
            Self::InvariantViolated => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::InvalidSettings => "Invalid chain settings",
            Self::EventDataUnreadable => "Event data file unreadable",
            Self::EventDataMalformed => "Malformed event data record",
            Self::SpeciesNotFound => "Species name not found in tree",
            Self::InvalidTree => "Invalid tree structure",
            Self::PositionOutOfRange => "Map position outside the tree",
            Self::EventTimeOffBranch => "Event time outside the resolved branch",
            Self::EmptyRegistry => "No events to choose from",
            Self::ProposalPending => "A proposal is already pending",
            Self::NoPendingProposal => "No matching pending proposal",
            Self::InvariantViolated => "Branch history invariant violated",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::InvalidSettings => Some("Scales, ratios and prior rates must be positive."),
            Self::EventDataUnreadable => Some("Check the event_data_infile path and permissions."),
            Self::EventDataMalformed => {
                Some("Each record is `species1 species2 time params...`; use NA for no species.")
            }
            Self::SpeciesNotFound => Some("Species names must match tip names exactly."),
            Self::InvalidTree => None,
            Self::PositionOutOfRange => None,
            Self::EventTimeOffBranch => {
                Some("Event times are distances from the root and must fall on the node's branch.")
            }
            Self::EmptyRegistry => Some("Check number_of_events() > 0 before choosing an event."),
            Self::ProposalPending => Some("Commit or revert the pending proposal first."),
            Self::NoPendingProposal => None,
            Self::InvariantViolated => Some("Report a bug with the seed and move trace."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Everything that can go wrong while building or mutating a model.
///
/// None of these are recovered from inside the crate. A failed operation
/// leaves no partial repair behind; drivers are expected to stop the chain.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("<<{}>> is a bad file name: {source}", path.display())]
    EventDataUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    EventData(#[from] crate::event_data::EventDataError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("event time {event_time} does not fall on the branch of node {node}")]
    EventTimeOffBranch { node: NodeId, event_time: f64 },

    #[error("number of events is zero")]
    EmptyRegistry,

    #[error("a {pending} proposal is pending; commit or revert it first")]
    ProposalPending { pending: &'static str },

    #[error("expected a pending {expected} proposal, found {found}")]
    NoPendingProposal {
        expected: &'static str,
        found: &'static str,
    },

    #[error("event {event} is not stored in the branch history of node {node}")]
    EventNotOnBranch { event: EventId, node: NodeId },
}

impl ModelError {
    /// Map this error to its stable [`ErrorCode`].
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidSettings(_) => ErrorCode::InvalidSettings,
            Self::EventDataUnreadable { .. } => ErrorCode::EventDataUnreadable,
            Self::EventData(_) => ErrorCode::EventDataMalformed,
            Self::Tree(TreeError::UnknownSpecies(_)) => ErrorCode::SpeciesNotFound,
            Self::Tree(TreeError::MapPositionOutOfRange { .. }) => ErrorCode::PositionOutOfRange,
            Self::Tree(_) => ErrorCode::InvalidTree,
            Self::EventTimeOffBranch { .. } => ErrorCode::EventTimeOffBranch,
            Self::EmptyRegistry => ErrorCode::EmptyRegistry,
            Self::ProposalPending { .. } => ErrorCode::ProposalPending,
            Self::NoPendingProposal { .. } => ErrorCode::NoPendingProposal,
            Self::EventNotOnBranch { .. } => ErrorCode::InvariantViolated,
        }
    }
}
