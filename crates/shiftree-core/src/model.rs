//! The chain-owning model: tree, branch histories, events, and move state.
//!
//! A [`Model`] is the single mutator of its tree state. Independent chains
//! each build their own model; nothing here is shared between instances.

use std::path::PathBuf;

use tracing::debug;

use crate::config::Settings;
use crate::error::ModelError;
use crate::event::{BranchEvent, EventId};
use crate::history::BranchHistory;
use crate::propagate::forward_set_branch_histories;
use crate::proposal::Proposal;
use crate::rate::RateModel;
use crate::registry::EventRegistry;
use crate::rng::ChainRng;
use crate::tree::{NodeId, Tree};

/// Effective events cached at one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeEvents {
    pub node_event: EventId,
    pub ancestral_node_event: EventId,
}

pub struct Model<M: RateModel> {
    pub(crate) tree: Tree,
    pub(crate) rate_model: M,
    pub(crate) rng: ChainRng,
    pub(crate) histories: Vec<BranchHistory>,
    pub(crate) root_event: BranchEvent<M::Params>,
    pub(crate) registry: EventRegistry<M::Params>,
    /// Local-move jitter bound, already scaled by the max root-to-tip length.
    pub(crate) scale: f64,
    pub(crate) update_event_rate_scale: f64,
    pub(crate) local_global_move_ratio: f64,
    pub(crate) poisson_rate_prior: f64,
    pub(crate) event_rate: f64,
    pub(crate) event_data_infile: Option<PathBuf>,
    pub(crate) accept_count: u64,
    pub(crate) reject_count: u64,
    pub(crate) accept_last: Option<bool>,
    pub(crate) proposal: Proposal<M::Params>,
    pub(crate) mean_branch_rates: Vec<Vec<f64>>,
}

impl<M: RateModel> Model<M> {
    /// Build a model with only the root event on the tree.
    ///
    /// Discards `settings.rng_warmup_draws` uniform draws before anything
    /// else touches `rng`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidSettings`] if the settings fail validation.
    pub fn new(
        tree: Tree,
        settings: &Settings,
        rate_model: M,
        mut rng: ChainRng,
    ) -> Result<Self, ModelError> {
        settings.validate()?;

        for _ in 0..settings.rng_warmup_draws {
            rng.uniform_rv();
        }

        let scale = settings.update_event_location_scale * tree.max_root_to_tip_length();
        let root_event = BranchEvent::root(&tree, rate_model.root_parameters());
        let histories = vec![BranchHistory::new(); tree.len()];

        let mut model = Self {
            histories,
            root_event,
            registry: EventRegistry::new(),
            scale,
            update_event_rate_scale: settings.update_event_rate_scale,
            local_global_move_ratio: settings.local_global_move_ratio,
            poisson_rate_prior: settings.poisson_rate_prior,
            event_rate: 1.0 / settings.poisson_rate_prior,
            event_data_infile: settings.event_data_infile.clone(),
            accept_count: 0,
            reject_count: 0,
            accept_last: None,
            proposal: Proposal::Clean,
            mean_branch_rates: Vec::new(),
            tree,
            rate_model,
            rng,
        };
        model.set_mean_branch_parameters();
        debug!(
            nodes = model.tree.len(),
            scale = model.scale,
            event_rate = model.event_rate,
            "model constructed"
        );
        Ok(model)
    }

    #[must_use]
    pub const fn tree(&self) -> &Tree {
        &self.tree
    }

    #[must_use]
    pub const fn rate_model(&self) -> &M {
        &self.rate_model
    }

    /// The chain's random stream, for drivers that draw acceptance variates
    /// from the same sequence.
    pub const fn rng_mut(&mut self) -> &mut ChainRng {
        &mut self.rng
    }

    #[must_use]
    pub fn branch_history(&self, node: NodeId) -> &BranchHistory {
        &self.histories[node.index()]
    }

    #[must_use]
    pub const fn root_event(&self) -> &BranchEvent<M::Params> {
        &self.root_event
    }

    /// Look up any live event, including the root event.
    #[must_use]
    pub fn event(&self, id: EventId) -> Option<&BranchEvent<M::Params>> {
        if id.is_root() {
            Some(&self.root_event)
        } else {
            self.registry.get(id)
        }
    }

    #[must_use]
    pub const fn registry(&self) -> &EventRegistry<M::Params> {
        &self.registry
    }

    /// Live events, not counting the root event.
    #[must_use]
    pub fn number_of_events(&self) -> usize {
        self.registry.len()
    }

    #[must_use]
    pub const fn event_rate(&self) -> f64 {
        self.event_rate
    }

    #[must_use]
    pub const fn poisson_rate_prior(&self) -> f64 {
        self.poisson_rate_prior
    }

    #[must_use]
    pub const fn local_move_scale(&self) -> f64 {
        self.scale
    }

    #[must_use]
    pub const fn pending_proposal(&self) -> &Proposal<M::Params> {
        &self.proposal
    }

    #[must_use]
    pub const fn accept_count(&self) -> u64 {
        self.accept_count
    }

    #[must_use]
    pub const fn reject_count(&self) -> u64 {
        self.reject_count
    }

    /// Outcome of the most recent decision; `None` before the first one.
    #[must_use]
    pub const fn accept_last(&self) -> Option<bool> {
        self.accept_last
    }

    /// Fraction of decided proposals that were accepted.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn acceptance_rate(&self) -> f64 {
        let total = self.accept_count + self.reject_count;
        if total == 0 {
            return 0.0;
        }
        self.accept_count as f64 / total as f64
    }

    /// Effective event governing `node`.
    #[must_use]
    pub fn node_event(&self, node: NodeId) -> EventId {
        self.histories[node.index()].node_event()
    }

    /// Cached effective events for every node, indexed by [`NodeId`].
    #[must_use]
    pub fn node_assignment(&self) -> Vec<NodeEvents> {
        self.histories
            .iter()
            .map(|h| NodeEvents {
                node_event: h.node_event(),
                ancestral_node_event: h.ancestral_node_event(),
            })
            .collect()
    }

    /// Effective events derived from the stored events alone, ignoring caches.
    #[must_use]
    pub fn recompute_node_events(&self) -> Vec<NodeEvents> {
        let root = NodeEvents {
            node_event: EventId::ROOT,
            ancestral_node_event: EventId::ROOT,
        };
        let mut out = vec![root; self.tree.len()];
        for &id in &self.tree.preorder()[1..] {
            let Some(anc) = self.tree.node(id).anc() else {
                continue;
            };
            let inherited = out[anc.index()].node_event;
            out[id.index()] = NodeEvents {
                node_event: self.histories[id.index()].last_event().unwrap_or(inherited),
                ancestral_node_event: inherited,
            };
        }
        out
    }

    /// Count events physically stored in branch histories below the root.
    #[must_use]
    pub fn count_events_in_branch_histories(&self) -> usize {
        self.count_events_in_branch_history(self.tree.root())
    }

    fn count_events_in_branch_history(&self, p: NodeId) -> usize {
        let mut count = 0;
        let mut stack = vec![p];
        while let Some(id) = stack.pop() {
            count += self.histories[id.index()].number_of_branch_events();
            stack.extend(self.tree.node(id).descendants());
        }
        count
    }

    /// Duration-weighted mean of each rate component over `node`'s branch.
    /// Empty for the root.
    #[must_use]
    pub fn mean_branch_rates(&self, node: NodeId) -> &[f64] {
        &self.mean_branch_rates[node.index()]
    }

    /// Recompute the mean rates of every branch from the current events.
    pub fn set_mean_branch_parameters(&mut self) {
        let components = self.rate_model.rate_components();
        let mut means = vec![Vec::new(); self.tree.len()];

        for &id in &self.tree.preorder()[1..] {
            let node = self.tree.node(id);
            let Some(anc) = node.anc() else {
                continue;
            };
            let history = &self.histories[id.index()];
            let mut totals = vec![0.0; components];

            let mut from = self.tree.node(anc).time();
            let mut governing = history.ancestral_node_event();
            for next in history.events() {
                let until = self.event_time(next);
                self.integrate(governing, from, until, &mut totals);
                from = until;
                governing = next;
            }
            self.integrate(governing, from, node.time(), &mut totals);

            let length = node.branch_length();
            for total in &mut totals {
                *total /= length;
            }
            means[id.index()] = totals;
        }

        self.mean_branch_rates = means;
    }

    fn integrate(&self, governing: EventId, from: f64, until: f64, totals: &mut [f64]) {
        let Some(event) = self.event(governing) else {
            return;
        };
        let origin = event.absolute_time();
        self.rate_model
            .segment_integral(event.params(), from - origin, until - origin, totals);
    }

    fn event_time(&self, id: EventId) -> f64 {
        self.event(id).map_or(0.0, BranchEvent::absolute_time)
    }

    /// Physically insert a registered-to-be event and restore the invariant.
    pub(crate) fn insert_event(&mut self, event: BranchEvent<M::Params>) -> EventId {
        let id = event.id();
        let node = event.event_node();
        self.histories[node.index()].add_event_to_branch_history(id, event.absolute_time());
        self.registry.insert(event);
        self.forward_set(id);
        id
    }

    /// Forward-set from any live event.
    pub(crate) fn forward_set(&mut self, id: EventId) -> usize {
        let node = self
            .event(id)
            .map_or(self.tree.root(), BranchEvent::event_node);
        forward_set_branch_histories(&self.tree, &mut self.histories, id, node)
    }

    pub(crate) fn require_clean(&self) -> Result<(), ModelError> {
        if self.proposal.is_clean() {
            Ok(())
        } else {
            Err(ModelError::ProposalPending {
                pending: self.proposal.kind(),
            })
        }
    }

    /// The event immediately rootward of `id` on its current branch.
    pub(crate) fn event_before(&self, id: EventId) -> Result<EventId, ModelError> {
        let node = self
            .event(id)
            .map(BranchEvent::event_node)
            .ok_or(ModelError::EventNotOnBranch {
                event: id,
                node: self.tree.root(),
            })?;
        self.histories[node.index()]
            .last_event_before(id)
            .ok_or(ModelError::EventNotOnBranch { event: id, node })
    }
}
