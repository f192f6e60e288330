//! The ordered set of all live non-root events.
//!
//! Iteration order is [`EventId`] order, which is creation order. Uniform
//! selection indexes into that order, so it depends only on the sequence of
//! insertions and removals and never on where events currently sit.

use std::collections::BTreeMap;

use crate::event::{BranchEvent, EventId};

#[derive(Debug, Clone)]
pub struct EventRegistry<P> {
    events: BTreeMap<EventId, BranchEvent<P>>,
    next_id: u64,
}

impl<P> Default for EventRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> EventRegistry<P> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            events: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Reserve the next id. Ids are never reused.
    pub(crate) const fn allocate_id(&mut self) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Register an event. Re-inserting a removed event keeps its original slot
    /// in the iteration order because the order is keyed by id.
    pub(crate) fn insert(&mut self, event: BranchEvent<P>) {
        debug_assert!(!event.id().is_root(), "root event is never registered");
        self.events.insert(event.id(), event);
    }

    pub(crate) fn remove(&mut self, id: EventId) -> Option<BranchEvent<P>> {
        self.events.remove(&id)
    }

    #[must_use]
    pub fn get(&self, id: EventId) -> Option<&BranchEvent<P>> {
        self.events.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: EventId) -> Option<&mut BranchEvent<P>> {
        self.events.get_mut(&id)
    }

    #[must_use]
    pub fn contains(&self, id: EventId) -> bool {
        self.events.contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Map a uniform draw in `[0, 1)` to an event.
    ///
    /// The draw is scaled by the population size and truncated to an index.
    /// Returns `None` when empty.
    #[must_use]
    pub fn choose(&self, u: f64) -> Option<EventId> {
        let n = self.events.len();
        if n == 0 {
            return None;
        }
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let chosen = ((u * n as f64) as usize).min(n - 1);
        self.events.keys().nth(chosen).copied()
    }

    /// Events in registry order.
    pub fn iter(&self) -> impl Iterator<Item = &BranchEvent<P>> {
        self.events.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = EventId> + '_ {
        self.events.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::NodeId;
    use crate::tree::tests::four_tip_tree;

    fn registry_with(n: usize) -> EventRegistry<()> {
        let tree = four_tip_tree();
        let mut registry = EventRegistry::new();
        for _ in 0..n {
            let id = registry.allocate_id();
            registry.insert(BranchEvent::new(id, &tree, NodeId(1), 0.5, ()));
        }
        registry
    }

    #[test]
    fn ids_start_after_root_and_never_repeat() {
        let mut registry = registry_with(2);
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec![EventId(1), EventId(2)]);
        registry.remove(EventId(2));
        assert_eq!(registry.allocate_id(), EventId(3));
    }

    #[test]
    fn choose_truncates_scaled_draw() {
        let registry = registry_with(4);
        assert_eq!(registry.choose(0.0), Some(EventId(1)));
        assert_eq!(registry.choose(0.2499), Some(EventId(1)));
        assert_eq!(registry.choose(0.25), Some(EventId(2)));
        assert_eq!(registry.choose(0.9999), Some(EventId(4)));
        assert_eq!(EventRegistry::<()>::new().choose(0.5), None);
    }

    #[test]
    fn reinsertion_keeps_order_slot() {
        let mut registry = registry_with(3);
        let removed = registry.remove(EventId(2)).unwrap();
        registry.insert(removed);
        assert_eq!(
            registry.ids().collect::<Vec<_>>(),
            vec![EventId(1), EventId(2), EventId(3)]
        );
    }
}
