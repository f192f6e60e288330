//! Forward-setting of effective events after a branch history changes.
//!
//! After an event is inserted, removed, or moved, only nodes between the
//! touched point and the next shielding event on each downstream path can
//! have a different effective event. The walk below visits exactly those
//! nodes: it stops at the first node whose own branch holds an event, after
//! refreshing that node's ancestral event.
//!
//! # Deletion and relocation
//!
//! For a removed event, call [`forward_set_branch_histories`] on the event
//! that was immediately rootward of it. That event now governs the vacated
//! stretch and the walk overwrites whatever the removed event had set.

use tracing::trace;

use crate::event::EventId;
use crate::history::BranchHistory;
use crate::tree::{NodeId, Tree};

/// Restore effective events downstream of `event`, which lives on `event_node`.
///
/// Returns the number of nodes whose caches were rewritten.
pub fn forward_set_branch_histories(
    tree: &Tree,
    histories: &mut [BranchHistory],
    event: EventId,
    event_node: NodeId,
) -> usize {
    if event.is_root() {
        let root = tree.root();
        let visited = tree
            .node(root)
            .descendants()
            .map(|child| forward_set_histories_recursive(tree, histories, child))
            .sum();
        trace!(%event, visited, "forward set from root");
        return visited;
    }

    let history = &mut histories[event_node.index()];
    if history.last_event() != Some(event) {
        // A more tipward event on the same branch still shields the subtree.
        return 0;
    }
    history.set_node_event(event);

    let visited = 1 + tree
        .node(event_node)
        .descendants()
        .map(|child| forward_set_histories_recursive(tree, histories, child))
        .sum::<usize>();
    trace!(%event, node = %event_node, visited, "forward set");
    visited
}

/// Push the parent's effective event down into `start` and, through empty
/// branches, into its descendants.
///
/// Iterative so that very deep trees cannot overflow the stack.
pub fn forward_set_histories_recursive(
    tree: &Tree,
    histories: &mut [BranchHistory],
    start: NodeId,
) -> usize {
    let mut visited = 0;
    let mut stack = vec![start];

    while let Some(p) = stack.pop() {
        let Some(anc) = tree.node(p).anc() else {
            continue;
        };
        let inherited = histories[anc.index()].node_event();
        let history = &mut histories[p.index()];
        history.set_ancestral_node_event(inherited);
        visited += 1;

        if history.number_of_branch_events() == 0 {
            history.set_node_event(inherited);
            let node = tree.node(p);
            // Right first so the left subtree is processed first.
            stack.extend(node.rt_desc());
            stack.extend(node.lf_desc());
        }
    }

    visited
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::tests::four_tip_tree;

    fn fresh(tree: &Tree) -> Vec<BranchHistory> {
        vec![BranchHistory::new(); tree.len()]
    }

    #[test]
    fn event_on_internal_branch_governs_its_tips() {
        let tree = four_tip_tree();
        let mut histories = fresh(&tree);
        let a = NodeId(1);
        histories[a.index()].add_event_to_branch_history(EventId(1), 0.5);

        let visited = forward_set_branch_histories(&tree, &mut histories, EventId(1), a);
        assert_eq!(visited, 3);

        for tip in [3, 4] {
            assert_eq!(histories[tip].node_event(), EventId(1));
            assert_eq!(histories[tip].ancestral_node_event(), EventId(1));
        }
        for tip in [5, 6] {
            assert_eq!(histories[tip].node_event(), EventId::ROOT);
        }
        assert_eq!(histories[a.index()].ancestral_node_event(), EventId::ROOT);
    }

    #[test]
    fn shielded_event_changes_nothing() {
        let tree = four_tip_tree();
        let mut histories = fresh(&tree);
        let a = NodeId(1);
        histories[a.index()].add_event_to_branch_history(EventId(1), 0.9);
        forward_set_branch_histories(&tree, &mut histories, EventId(1), a);

        // Rootward of event 1 on the same branch.
        histories[a.index()].add_event_to_branch_history(EventId(2), 0.1);
        let before = histories.clone();
        let visited = forward_set_branch_histories(&tree, &mut histories, EventId(2), a);

        assert_eq!(visited, 0);
        assert_eq!(histories, before);
    }

    #[test]
    fn walk_stops_at_branches_with_their_own_events() {
        let tree = four_tip_tree();
        let mut histories = fresh(&tree);
        let t1 = NodeId(3);
        histories[t1.index()].add_event_to_branch_history(EventId(7), 1.5);
        forward_set_branch_histories(&tree, &mut histories, EventId(7), t1);

        let a = NodeId(1);
        histories[a.index()].add_event_to_branch_history(EventId(8), 0.5);
        forward_set_branch_histories(&tree, &mut histories, EventId(8), a);

        // t1 keeps its own event but sees the new one above it.
        assert_eq!(histories[t1.index()].node_event(), EventId(7));
        assert_eq!(histories[t1.index()].ancestral_node_event(), EventId(8));
        assert_eq!(histories[4].node_event(), EventId(8));
    }

    #[test]
    fn root_propagation_resets_after_removal() {
        let tree = four_tip_tree();
        let mut histories = fresh(&tree);
        let b = NodeId(2);
        histories[b.index()].add_event_to_branch_history(EventId(1), 0.5);
        forward_set_branch_histories(&tree, &mut histories, EventId(1), b);
        assert_eq!(histories[6].node_event(), EventId(1));

        let previous = histories[b.index()].last_event_before(EventId(1)).unwrap();
        histories[b.index()].pop_event_off_branch_history(EventId(1));
        forward_set_branch_histories(&tree, &mut histories, previous, tree.root());

        assert!(histories.iter().all(|h| h.node_event() == EventId::ROOT));
    }
}
