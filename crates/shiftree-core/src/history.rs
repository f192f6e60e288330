//! Per-branch ordered event storage with cached effective events.

use std::cmp::Ordering;

use crate::event::EventId;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Entry {
    absolute_time: f64,
    seq: u64,
    event: EventId,
}

impl Entry {
    fn order(&self, other: &Self) -> Ordering {
        self.absolute_time
            .total_cmp(&other.absolute_time)
            .then(self.seq.cmp(&other.seq))
    }
}

/// Events on one node's incoming branch, rootward first.
///
/// Also caches the effective event at the node (`node_event`) and at the
/// proximal end of the branch (`ancestral_node_event`). Only the propagation
/// engine and the move proposer write those caches.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchHistory {
    events: Vec<Entry>,
    next_seq: u64,
    node_event: EventId,
    ancestral_node_event: EventId,
}

impl Default for BranchHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl BranchHistory {
    /// An empty history governed entirely by the root event.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            events: Vec::new(),
            next_seq: 0,
            node_event: EventId::ROOT,
            ancestral_node_event: EventId::ROOT,
        }
    }

    /// Insert `event` at `absolute_time`. Ties keep insertion order.
    pub fn add_event_to_branch_history(&mut self, event: EventId, absolute_time: f64) {
        let entry = Entry {
            absolute_time,
            seq: self.next_seq,
            event,
        };
        self.next_seq = self.next_seq.wrapping_add(1);
        let at = self
            .events
            .partition_point(|e| e.order(&entry) == Ordering::Less);
        self.events.insert(at, entry);
    }

    /// Remove `event`. Returns `false` if it was not stored here.
    pub fn pop_event_off_branch_history(&mut self, event: EventId) -> bool {
        match self.events.iter().position(|e| e.event == event) {
            Some(at) => {
                self.events.remove(at);
                true
            }
            None => false,
        }
    }

    /// The most tipward event on the branch, if any.
    #[must_use]
    pub fn last_event(&self) -> Option<EventId> {
        self.events.last().map(|e| e.event)
    }

    /// The event immediately rootward of `event`.
    ///
    /// For the first event on the branch this is the ancestral node event.
    /// Returns `None` if `event` is not stored here.
    #[must_use]
    pub fn last_event_before(&self, event: EventId) -> Option<EventId> {
        let at = self.events.iter().position(|e| e.event == event)?;
        Some(match at {
            0 => self.ancestral_node_event,
            _ => self.events[at - 1].event,
        })
    }

    #[must_use]
    pub fn contains(&self, event: EventId) -> bool {
        self.events.iter().any(|e| e.event == event)
    }

    /// Stored events, rootward first.
    pub fn events(&self) -> impl Iterator<Item = EventId> + '_ {
        self.events.iter().map(|e| e.event)
    }

    #[must_use]
    pub fn number_of_branch_events(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub const fn node_event(&self) -> EventId {
        self.node_event
    }

    pub fn set_node_event(&mut self, event: EventId) {
        self.node_event = event;
    }

    #[must_use]
    pub const fn ancestral_node_event(&self) -> EventId {
        self.ancestral_node_event
    }

    pub fn set_ancestral_node_event(&mut self, event: EventId) {
        self.ancestral_node_event = event;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_kept_rootward_first() {
        let mut history = BranchHistory::new();
        history.add_event_to_branch_history(EventId(1), 0.8);
        history.add_event_to_branch_history(EventId(2), 0.2);
        history.add_event_to_branch_history(EventId(3), 0.5);

        let order: Vec<_> = history.events().collect();
        assert_eq!(order, vec![EventId(2), EventId(3), EventId(1)]);
        assert_eq!(history.last_event(), Some(EventId(1)));
    }

    #[test]
    fn ties_keep_insertion_order() {
        let mut history = BranchHistory::new();
        history.add_event_to_branch_history(EventId(5), 0.5);
        history.add_event_to_branch_history(EventId(4), 0.5);
        assert_eq!(history.last_event(), Some(EventId(4)));
    }

    #[test]
    fn last_event_before_falls_back_to_ancestral() {
        let mut history = BranchHistory::new();
        history.set_ancestral_node_event(EventId(9));
        history.add_event_to_branch_history(EventId(1), 0.2);
        history.add_event_to_branch_history(EventId(2), 0.4);

        assert_eq!(history.last_event_before(EventId(2)), Some(EventId(1)));
        assert_eq!(history.last_event_before(EventId(1)), Some(EventId(9)));
        assert_eq!(history.last_event_before(EventId(3)), None);
    }

    #[test]
    fn pop_reports_missing_events() {
        let mut history = BranchHistory::new();
        history.add_event_to_branch_history(EventId(1), 0.2);
        assert!(!history.pop_event_off_branch_history(EventId(2)));
        assert!(history.pop_event_off_branch_history(EventId(1)));
        assert_eq!(history.number_of_branch_events(), 0);
        assert_eq!(history.last_event(), None);
    }
}
