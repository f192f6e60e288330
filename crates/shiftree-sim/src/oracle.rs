use shiftree_core::{EventId, Model, NodeEvents, NodeId, RateModel};

// ── Core result types ─────────────────────────────────────────────────────────

/// Oracle result for an invariant check.
#[derive(Debug, Clone, PartialEq)]
pub struct OracleResult {
    /// `true` iff no violations were found.
    pub passed: bool,
    pub violations: Vec<InvariantViolation>,
}

impl OracleResult {
    #[must_use]
    pub const fn pass() -> Self {
        Self {
            passed: true,
            violations: Vec::new(),
        }
    }

    #[must_use]
    pub const fn fail(violations: Vec<InvariantViolation>) -> Self {
        Self {
            passed: false,
            violations,
        }
    }

    fn from_violations(violations: Vec<InvariantViolation>) -> Self {
        if violations.is_empty() {
            Self::pass()
        } else {
            Self::fail(violations)
        }
    }

    /// Merge another result into this one (failures accumulate).
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        if !other.passed {
            self.passed = false;
            self.violations.extend(other.violations);
        }
        self
    }
}

// ── Invariant violation diagnostics ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// A node's cached effective event differs from a full recomputation.
    NodeEventMismatch {
        step: usize,
        node: NodeId,
        cached: EventId,
        expected: EventId,
    },

    /// A node's cached ancestral event differs from a full recomputation.
    AncestralMismatch {
        step: usize,
        node: NodeId,
        cached: EventId,
        expected: EventId,
    },

    /// The registry and the branch histories disagree on how many events exist.
    RegistryHistoryMismatch {
        step: usize,
        registered: usize,
        stored: usize,
    },

    /// A registered event is not stored where it claims to live.
    EventHomeMismatch {
        step: usize,
        event: EventId,
        node: NodeId,
    },

    /// Reverting a proposal did not restore the previous assignment.
    Reversibility {
        step: usize,
        proposal: String,
        differing_nodes: Vec<NodeId>,
    },
}

// ── Oracle ────────────────────────────────────────────────────────────────────

/// Checks the incrementally maintained state of a model against a
/// from-scratch recomputation.
///
/// # Invariants checked
///
/// 1. **Effective events** (`check_assignment`): every cached `node_event`
///    and `ancestral_node_event` matches the recomputed value.
/// 2. **Registry/history agreement** (`check_registry`): every registered
///    event is stored in the history of its node, inside that node's
///    branch, and nothing else is stored.
/// 3. **Reversibility** (`check_reverted`): the assignment after a revert
///    equals the snapshot taken before the proposal.
pub struct InvariantOracle;

impl InvariantOracle {
    #[must_use]
    pub fn check_assignment<M: RateModel>(step: usize, model: &Model<M>) -> OracleResult {
        let cached = model.node_assignment();
        let expected = model.recompute_node_events();

        let mut violations = Vec::new();
        for (index, (have, want)) in cached.iter().zip(&expected).enumerate() {
            let node = NodeId(index);
            if have.node_event != want.node_event {
                violations.push(InvariantViolation::NodeEventMismatch {
                    step,
                    node,
                    cached: have.node_event,
                    expected: want.node_event,
                });
            }
            if have.ancestral_node_event != want.ancestral_node_event {
                violations.push(InvariantViolation::AncestralMismatch {
                    step,
                    node,
                    cached: have.ancestral_node_event,
                    expected: want.ancestral_node_event,
                });
            }
        }
        OracleResult::from_violations(violations)
    }

    #[must_use]
    pub fn check_registry<M: RateModel>(step: usize, model: &Model<M>) -> OracleResult {
        let mut violations = Vec::new();

        let registered = model.number_of_events();
        let stored = model.count_events_in_branch_histories();
        if registered != stored {
            violations.push(InvariantViolation::RegistryHistoryMismatch {
                step,
                registered,
                stored,
            });
        }

        for event in model.registry().iter() {
            let node = event.event_node();
            let at_home = model.branch_history(node).contains(event.id())
                && model.tree().node(node).covers(event.map_time());
            if !at_home {
                violations.push(InvariantViolation::EventHomeMismatch {
                    step,
                    event: event.id(),
                    node,
                });
            }
        }
        OracleResult::from_violations(violations)
    }

    #[must_use]
    pub fn check_reverted<M: RateModel>(
        step: usize,
        proposal: &str,
        before: &[NodeEvents],
        model: &Model<M>,
    ) -> OracleResult {
        let after = model.node_assignment();
        let differing_nodes: Vec<NodeId> = before
            .iter()
            .zip(&after)
            .enumerate()
            .filter(|(_, (b, a))| b != a)
            .map(|(index, _)| NodeId(index))
            .collect();

        if differing_nodes.is_empty() && before.len() == after.len() {
            OracleResult::pass()
        } else {
            OracleResult::fail(vec![InvariantViolation::Reversibility {
                step,
                proposal: proposal.to_string(),
                differing_nodes,
            }])
        }
    }

    /// Run the state checks in one shot.
    #[must_use]
    pub fn check_all<M: RateModel>(step: usize, model: &Model<M>) -> OracleResult {
        Self::check_assignment(step, model).merge(Self::check_registry(step, model))
    }
}
