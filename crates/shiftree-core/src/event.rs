//! Rate-shift events and their positions on the tree.

use std::fmt;

use crate::rng::ChainRng;
use crate::tree::{NodeId, Tree, TreeError};

/// Stable identity of an event for the lifetime of a model.
///
/// Ids are handed out in increasing order, so sorting by id is creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(pub u64);

impl EventId {
    /// The always-present event attached to the root.
    pub const ROOT: Self = Self(0);

    #[must_use]
    pub const fn is_root(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "root")
        } else {
            write!(f, "e{}", self.0)
        }
    }
}

/// A rate-shift point: a tree position bound to model parameters.
///
/// The event remembers the position it held before its last move so that a
/// rejected proposal can put it back exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchEvent<P> {
    id: EventId,
    node: NodeId,
    map_time: f64,
    absolute_time: f64,
    params: P,
    old_node: NodeId,
    old_map_time: f64,
}

impl<P> BranchEvent<P> {
    pub(crate) fn new(id: EventId, tree: &Tree, node: NodeId, map_time: f64, params: P) -> Self {
        Self {
            id,
            node,
            map_time,
            absolute_time: tree.absolute_time(node, map_time),
            params,
            old_node: node,
            old_map_time: map_time,
        }
    }

    pub(crate) fn root(tree: &Tree, params: P) -> Self {
        let root = tree.root();
        Self {
            id: EventId::ROOT,
            node: root,
            map_time: tree.node(root).map_start(),
            absolute_time: 0.0,
            params,
            old_node: root,
            old_map_time: tree.node(root).map_start(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> EventId {
        self.id
    }

    /// Node whose incoming branch holds this event.
    #[must_use]
    pub const fn event_node(&self) -> NodeId {
        self.node
    }

    #[must_use]
    pub const fn map_time(&self) -> f64 {
        self.map_time
    }

    /// Distance from the root.
    #[must_use]
    pub const fn absolute_time(&self) -> f64 {
        self.absolute_time
    }

    #[must_use]
    pub const fn params(&self) -> &P {
        &self.params
    }

    pub(crate) fn set_params(&mut self, params: P) {
        self.params = params;
    }

    /// Node held before the most recent move.
    #[must_use]
    pub const fn old_node(&self) -> NodeId {
        self.old_node
    }

    /// Map position held before the most recent move.
    #[must_use]
    pub const fn old_map_time(&self) -> f64 {
        self.old_map_time
    }

    /// Shift the event by `step` along the map, wrapping at the ends, and
    /// re-home it on whichever branch now contains it.
    ///
    /// # Errors
    ///
    /// Fails only if the tree has an empty map. The event is untouched on error.
    pub fn move_event_local(&mut self, step: f64, tree: &Tree) -> Result<(), TreeError> {
        let target = wrap_map_position(self.map_time + step, tree.total_map_length());
        self.relocate(target, tree)
    }

    /// Resample the event's position uniformly over the whole map.
    ///
    /// # Errors
    ///
    /// Fails only if the tree has an empty map. The event is untouched on error.
    pub fn move_event_global(&mut self, rng: &mut ChainRng, tree: &Tree) -> Result<(), TreeError> {
        let total = tree.total_map_length();
        let target = wrap_map_position(rng.uniform_rv_in(0.0, total), total);
        self.relocate(target, tree)
    }

    /// Restore the node and map position saved by the last move.
    pub fn revert_old_map_position(&mut self, tree: &Tree) {
        self.node = self.old_node;
        self.map_time = self.old_map_time;
        self.absolute_time = tree.absolute_time(self.node, self.map_time);
    }

    fn relocate(&mut self, target: f64, tree: &Tree) -> Result<(), TreeError> {
        let node = tree.node_by_map_time(target)?;
        self.old_node = self.node;
        self.old_map_time = self.map_time;
        self.node = node;
        self.map_time = target;
        self.absolute_time = tree.absolute_time(node, target);
        Ok(())
    }
}

/// Fold `position` into `[0, total)`.
pub(crate) fn wrap_map_position(position: f64, total: f64) -> f64 {
    if total <= 0.0 {
        return position;
    }
    let wrapped = position.rem_euclid(total);
    // rem_euclid can round up to `total` for tiny negative inputs.
    if wrapped >= total { 0.0 } else { wrapped }
}
