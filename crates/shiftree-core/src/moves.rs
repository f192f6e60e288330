//! Reversible proposals on a [`Model`].
//!
//! Each proposing operation leaves exactly one [`Proposal`] pending. The
//! driver evaluates it and then calls [`Model::commit_proposal`] or
//! [`Model::revert_proposal`]; nothing else clears it.

use tracing::debug;

use crate::error::ModelError;
use crate::event::{BranchEvent, EventId, wrap_map_position};
use crate::model::Model;
use crate::proposal::Proposal;
use crate::rate::RateModel;

impl<M: RateModel> Model<M> {
    /// Create an event with freshly drawn parameters at `map_position`, or at
    /// a uniform position over the whole map when `None`.
    ///
    /// # Errors
    ///
    /// - [`ModelError::ProposalPending`] if a proposal is outstanding.
    /// - [`ModelError::Tree`] if `map_position` is off the map.
    pub fn add_event_to_tree(&mut self, map_position: Option<f64>) -> Result<EventId, ModelError> {
        self.require_clean()?;

        let total = self.tree.total_map_length();
        let position = match map_position {
            Some(position) => position,
            None => {
                let start = self.tree.node(self.tree.root()).map_start();
                wrap_map_position(self.rng.uniform_rv_in(start, total), total)
            }
        };
        let node = self.tree.node_by_map_time(position)?;
        let params = self.rate_model.draw_parameters(&mut self.rng);

        let id = self.registry.allocate_id();
        self.insert_event(BranchEvent::new(id, &self.tree, node, position, params));
        self.set_mean_branch_parameters();
        self.proposal = Proposal::Added { event: id };

        debug!(event = %id, %node, position, "proposed add");
        Ok(id)
    }

    /// Pick a live non-root event uniformly. Consumes one uniform draw.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::EmptyRegistry`] when there are no events.
    pub fn choose_event_at_random(&mut self) -> Result<EventId, ModelError> {
        if self.registry.is_empty() {
            return Err(ModelError::EmptyRegistry);
        }
        let u = self.rng.uniform_rv();
        self.registry.choose(u).ok_or(ModelError::EmptyRegistry)
    }

    /// # Errors
    ///
    /// See [`Model::event_move`].
    pub fn event_local_move(&mut self) -> Result<Option<EventId>, ModelError> {
        self.event_move(true)
    }

    /// # Errors
    ///
    /// See [`Model::event_move`].
    pub fn event_global_move(&mut self) -> Result<Option<EventId>, ModelError> {
        self.event_move(false)
    }

    /// Relocate a random event, locally by a jitter step or globally to a
    /// uniform position.
    ///
    /// Returns `Ok(None)` without touching any state when there are no
    /// events to move.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ProposalPending`] if a proposal is outstanding.
    pub fn event_move(&mut self, local: bool) -> Result<Option<EventId>, ModelError> {
        self.require_clean()?;
        if self.registry.is_empty() {
            return Ok(None);
        }

        let id = self.choose_event_at_random()?;
        let previous = self.event_before(id)?;
        let (old_node, old_map_time) = self
            .registry
            .get(id)
            .map(|e| (e.event_node(), e.map_time()))
            .ok_or(ModelError::EmptyRegistry)?;

        self.histories[old_node.index()].pop_event_off_branch_history(id);

        let step = if local {
            Some(self.rng.uniform_rv_in(0.0, self.scale) - 0.5 * self.scale)
        } else {
            None
        };
        let Some(event) = self.registry.get_mut(id) else {
            return Err(ModelError::EmptyRegistry);
        };
        let moved = match step {
            Some(step) => event.move_event_local(step, &self.tree),
            None => event.move_event_global(&mut self.rng, &self.tree),
        };
        if let Err(err) = moved {
            // Put the event back where it was before reporting.
            let time = event.absolute_time();
            self.histories[old_node.index()].add_event_to_branch_history(id, time);
            return Err(err.into());
        }
        let (new_node, new_map_time, new_time) =
            (event.event_node(), event.map_time(), event.absolute_time());

        self.histories[new_node.index()].add_event_to_branch_history(id, new_time);
        self.forward_set(previous);
        self.forward_set(id);
        self.set_mean_branch_parameters();

        self.proposal = Proposal::Moved {
            event: id,
            previous_node: old_node,
            previous_map_time: old_map_time,
        };
        debug!(
            event = %id,
            local,
            from = %old_node,
            to = %new_node,
            map_time = new_map_time,
            "proposed move"
        );
        Ok(Some(id))
    }

    /// Choose a local move with probability `ratio / (1 + ratio)`, else a
    /// global one. Draws nothing when there are no events.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ProposalPending`] if a proposal is outstanding.
    pub fn propose_event_relocation(&mut self) -> Result<Option<EventId>, ModelError> {
        self.require_clean()?;
        if self.registry.is_empty() {
            return Ok(None);
        }
        let local = self.rng.uniform_rv() < self.local_move_probability();
        self.event_move(local)
    }

    #[must_use]
    pub fn local_move_probability(&self) -> f64 {
        self.local_global_move_ratio / (1.0 + self.local_global_move_ratio)
    }

    /// Take a random event off the tree. `Ok(None)` when there is none.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ProposalPending`] if a proposal is outstanding.
    pub fn delete_random_event(&mut self) -> Result<Option<EventId>, ModelError> {
        self.require_clean()?;
        if self.registry.is_empty() {
            return Ok(None);
        }

        let id = self.choose_event_at_random()?;
        let previous = self.event_before(id)?;
        let event = self.detach_event(id, previous)?;
        let node = event.event_node();
        self.proposal = Proposal::Deleted { event };

        debug!(event = %id, %node, "proposed delete");
        Ok(Some(id))
    }

    /// Multiplicative update of the event rate. Returns the proposed rate.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ProposalPending`] if a proposal is outstanding.
    pub fn propose_event_rate(&mut self) -> Result<f64, ModelError> {
        self.require_clean()?;
        let previous = self.event_rate;
        let u = self.rng.uniform_rv();
        self.event_rate = previous * (self.update_event_rate_scale * (u - 0.5)).exp();
        self.proposal = Proposal::EventRate { previous };

        debug!(previous, proposed = self.event_rate, "proposed event rate");
        Ok(self.event_rate)
    }

    /// The event touched by the pending proposal.
    #[must_use]
    pub const fn last_event_modified(&self) -> Option<EventId> {
        self.proposal.last_event_modified()
    }

    /// Accept the pending proposal.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::NoPendingProposal`] when the state is clean.
    pub fn commit_proposal(&mut self) -> Result<(), ModelError> {
        if self.proposal.is_clean() {
            return Err(ModelError::NoPendingProposal {
                expected: "any",
                found: "clean",
            });
        }
        debug!(kind = self.proposal.kind(), "commit");
        self.proposal = Proposal::Clean;
        self.accept_count += 1;
        self.accept_last = Some(true);
        Ok(())
    }

    /// Undo the pending proposal exactly.
    ///
    /// # Errors
    ///
    /// - [`ModelError::NoPendingProposal`] when the state is clean.
    /// - [`ModelError::EventNotOnBranch`] if the touched event has vanished
    ///   from its branch history.
    pub fn revert_proposal(&mut self) -> Result<(), ModelError> {
        let kind = self.proposal.kind();
        match std::mem::take(&mut self.proposal) {
            Proposal::Clean => {
                return Err(ModelError::NoPendingProposal {
                    expected: "any",
                    found: kind,
                });
            }
            Proposal::Added { event } => {
                let previous = self.event_before(event)?;
                self.detach_event(event, previous)?;
            }
            Proposal::Moved { event, .. } => self.restore_moved_event(event)?,
            Proposal::Deleted { event } => {
                self.insert_event(event);
                self.set_mean_branch_parameters();
            }
            Proposal::EventRate { previous } => self.event_rate = previous,
        }
        debug!(kind, "revert");
        self.reject_count += 1;
        self.accept_last = Some(false);
        Ok(())
    }

    /// Undo the pending move, putting the event back on its previous node
    /// and map position.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::NoPendingProposal`] unless a move is pending.
    pub fn revert_moved_event_to_previous(&mut self) -> Result<(), ModelError> {
        if !matches!(self.proposal, Proposal::Moved { .. }) {
            return Err(ModelError::NoPendingProposal {
                expected: "move",
                found: self.proposal.kind(),
            });
        }
        self.revert_proposal()
    }

    fn restore_moved_event(&mut self, id: EventId) -> Result<(), ModelError> {
        let neighbor = self.event_before(id)?;
        let Some(event) = self.registry.get_mut(id) else {
            return Err(ModelError::EmptyRegistry);
        };
        let current = event.event_node();
        event.revert_old_map_position(&self.tree);
        let (node, time) = (event.event_node(), event.absolute_time());

        self.histories[current.index()].pop_event_off_branch_history(id);
        self.histories[node.index()].add_event_to_branch_history(id, time);
        self.forward_set(neighbor);
        self.forward_set(id);
        self.set_mean_branch_parameters();
        Ok(())
    }

    /// Remove `id` from its history and the registry, repairing from
    /// `previous`.
    fn detach_event(
        &mut self,
        id: EventId,
        previous: EventId,
    ) -> Result<BranchEvent<M::Params>, ModelError> {
        let event = self.registry.remove(id).ok_or(ModelError::EmptyRegistry)?;
        let node = event.event_node();
        if !self.histories[node.index()].pop_event_off_branch_history(id) {
            self.registry.insert(event);
            return Err(ModelError::EventNotOnBranch { event: id, node });
        }
        self.forward_set(previous);
        self.set_mean_branch_parameters();
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ModelError;
    use crate::event::EventId;
    use crate::model::tests::constant_model;
    use crate::proposal::Proposal;
    use crate::tree::NodeId;

    const A: NodeId = NodeId(1);
    const B: NodeId = NodeId(2);
    const TIPS: [NodeId; 4] = [NodeId(3), NodeId(4), NodeId(5), NodeId(6)];

    #[test]
    fn added_event_governs_its_subtree_only() {
        let mut model = constant_model(3);
        let id = model.add_event_to_tree(Some(0.5)).unwrap();

        assert_eq!(model.event(id).unwrap().event_node(), A);
        assert_eq!(model.node_event(A), id);
        assert_eq!(model.node_event(TIPS[0]), id);
        assert_eq!(model.node_event(TIPS[1]), id);
        assert_eq!(model.node_event(TIPS[2]), EventId::ROOT);
        assert_eq!(model.node_event(B), EventId::ROOT);
        assert_eq!(model.pending_proposal(), &Proposal::Added { event: id });

        model.commit_proposal().unwrap();
        assert!(model.pending_proposal().is_clean());
        assert_eq!(model.accept_count(), 1);
        assert_eq!(model.accept_last(), Some(true));
    }

    #[test]
    fn second_proposal_while_pending_is_rejected() {
        let mut model = constant_model(4);
        model.add_event_to_tree(Some(0.5)).unwrap();

        let err = model.add_event_to_tree(Some(3.5)).unwrap_err();
        assert!(matches!(err, ModelError::ProposalPending { pending: "add" }));
        assert!(matches!(
            model.propose_event_rate(),
            Err(ModelError::ProposalPending { .. })
        ));
        assert_eq!(model.number_of_events(), 1);
    }

    #[test]
    fn reverting_an_add_restores_the_root_everywhere() {
        let mut model = constant_model(5);
        let before = model.node_assignment();
        model.add_event_to_tree(None).unwrap();
        model.revert_proposal().unwrap();

        assert_eq!(model.number_of_events(), 0);
        assert_eq!(model.count_events_in_branch_histories(), 0);
        assert_eq!(model.node_assignment(), before);
        assert_eq!(model.reject_count(), 1);
        assert_eq!(model.accept_last(), Some(false));
    }

    #[test]
    fn off_map_position_is_an_error() {
        let mut model = constant_model(6);
        let err = model.add_event_to_tree(Some(6.0)).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::PositionOutOfRange);
        assert!(model.pending_proposal().is_clean());
    }

    #[test]
    fn moves_on_an_empty_tree_are_noops() {
        let mut model = constant_model(7);
        assert!(matches!(
            model.choose_event_at_random(),
            Err(ModelError::EmptyRegistry)
        ));
        assert_eq!(model.event_local_move().unwrap(), None);
        assert_eq!(model.event_global_move().unwrap(), None);
        assert_eq!(model.delete_random_event().unwrap(), None);
        assert!(model.pending_proposal().is_clean());
    }

    #[test]
    fn local_move_revert_is_exact() {
        let mut model = constant_model(8);
        for position in [0.5, 3.5, 4.2] {
            model.add_event_to_tree(Some(position)).unwrap();
            model.commit_proposal().unwrap();
        }

        for _ in 0..50 {
            let before = model.node_assignment();
            let id = model.event_local_move().unwrap().unwrap();
            let Proposal::Moved {
                previous_node,
                previous_map_time,
                ..
            } = *model.pending_proposal()
            else {
                panic!("expected a pending move");
            };
            assert_eq!(model.node_assignment(), model.recompute_node_events());

            model.revert_moved_event_to_previous().unwrap();
            let event = model.event(id).unwrap();
            assert_eq!(event.event_node(), previous_node);
            assert_eq!(event.map_time().to_bits(), previous_map_time.to_bits());
            assert_eq!(model.node_assignment(), before);
        }
    }

    #[test]
    fn delete_and_revert_keep_identity() {
        let mut model = constant_model(9);
        let first = model.add_event_to_tree(Some(0.5)).unwrap();
        model.commit_proposal().unwrap();
        let second = model.add_event_to_tree(Some(1.5)).unwrap();
        model.commit_proposal().unwrap();
        let before = model.node_assignment();

        let gone = model.delete_random_event().unwrap().unwrap();
        assert!(model.event(gone).is_none());
        assert_eq!(model.node_assignment(), model.recompute_node_events());

        model.revert_proposal().unwrap();
        assert_eq!(model.registry().ids().collect::<Vec<_>>(), vec![first, second]);
        assert_eq!(model.node_assignment(), before);
    }

    #[test]
    fn event_rate_revert_is_exact() {
        let mut model = constant_model(10);
        let before = model.event_rate();
        let proposed = model.propose_event_rate().unwrap();
        assert!(proposed > 0.0);
        // exp(4 * (u - 0.5)) stays within [e^-2, e^2).
        assert!(proposed / before >= (-2.0_f64).exp() - 1e-12);
        assert!(proposed / before < 2.0_f64.exp());

        model.revert_proposal().unwrap();
        assert_eq!(model.event_rate().to_bits(), before.to_bits());
    }

    #[test]
    fn decisions_require_a_pending_proposal() {
        let mut model = constant_model(11);
        assert!(matches!(
            model.commit_proposal(),
            Err(ModelError::NoPendingProposal { .. })
        ));
        assert!(matches!(
            model.revert_proposal(),
            Err(ModelError::NoPendingProposal { .. })
        ));

        model.add_event_to_tree(Some(0.5)).unwrap();
        assert!(matches!(
            model.revert_moved_event_to_previous(),
            Err(ModelError::NoPendingProposal {
                expected: "move",
                found: "add"
            })
        ));
    }

    #[test]
    fn local_probability_follows_ratio() {
        let model = constant_model(12);
        // Default ratio 10.
        assert!((model.local_move_probability() - 10.0 / 11.0).abs() < 1e-12);
    }
}
