//! Fixed-topology binary tree stored as an arena, plus the global coordinate map.
//!
//! Nodes are addressed by [`NodeId`] (an index into the arena) and store their
//! parent and child indices, so navigation is O(1) in both directions without
//! any ownership cycles.
//!
//! # Coordinate map
//!
//! Every point on every branch has a scalar *map position*. Branches are laid
//! end to end in pre-order: the root covers the empty interval `[0, 0)` and
//! each other node `p` covers `[map_start(p), map_start(p) + brlen(p))`.
//! `map_start(p)` is the tipward end of the branch, so within one branch a
//! larger map position is closer to the root. The map spans
//! `[0, total_map_length)` where the total is the sum of branch lengths.
//!
//! Node *time* is the distance from the root (the root is at time 0), which
//! gives the conversion used throughout the crate:
//!
//! ```text
//! absolute_time = time(p) - (map_position - map_start(p))
//! ```

use std::collections::HashMap;
use std::fmt;

/// Index of a node in the tree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

impl NodeId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Errors raised while building or querying a [`Tree`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TreeError {
    #[error("tree has no nodes")]
    Empty,

    #[error("structure arrays disagree: {parents} parents, {lengths} branch lengths, {names} names")]
    LengthMismatch {
        parents: usize,
        lengths: usize,
        names: usize,
    },

    #[error("no root node found (no node without a parent)")]
    NoRoot,

    #[error("more than one root: nodes {0:?} have no parent")]
    MultipleRoots(Vec<usize>),

    #[error("node {node} references parent {parent}, which does not exist")]
    ParentOutOfRange { node: usize, parent: usize },

    #[error("node {node} has {children} children; every node needs 0 or 2")]
    NotBinary { node: usize, children: usize },

    #[error("node {node} is not reachable from the root")]
    Disconnected { node: usize },

    #[error("node {node} has invalid branch length {length}")]
    InvalidBranchLength { node: usize, length: f64 },

    #[error("tip node {node} has no name")]
    UnnamedTip { node: usize },

    #[error("duplicate node name '{0}'")]
    DuplicateName(String),

    #[error("species '{0}' not found in tree")]
    UnknownSpecies(String),

    #[error("map position {position} is outside [0, {total})")]
    MapPositionOutOfRange { position: f64, total: f64 },
}

/// A vertex of the tree. Read-only once the tree is built.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    anc: Option<NodeId>,
    lf_desc: Option<NodeId>,
    rt_desc: Option<NodeId>,
    branch_length: f64,
    time: f64,
    map_start: f64,
    map_end: f64,
    name: Option<String>,
}

impl Node {
    #[must_use]
    pub const fn anc(&self) -> Option<NodeId> {
        self.anc
    }

    #[must_use]
    pub const fn lf_desc(&self) -> Option<NodeId> {
        self.lf_desc
    }

    #[must_use]
    pub const fn rt_desc(&self) -> Option<NodeId> {
        self.rt_desc
    }

    /// Both descendants, left first. Empty for tips.
    pub fn descendants(&self) -> impl Iterator<Item = NodeId> {
        self.lf_desc.into_iter().chain(self.rt_desc)
    }

    #[must_use]
    pub const fn branch_length(&self) -> f64 {
        self.branch_length
    }

    /// Distance from the root.
    #[must_use]
    pub const fn time(&self) -> f64 {
        self.time
    }

    #[must_use]
    pub const fn map_start(&self) -> f64 {
        self.map_start
    }

    #[must_use]
    pub const fn map_end(&self) -> f64 {
        self.map_end
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub const fn is_tip(&self) -> bool {
        self.lf_desc.is_none() && self.rt_desc.is_none()
    }

    /// Whether `map_position` lies on this node's branch.
    #[must_use]
    pub fn covers(&self, map_position: f64) -> bool {
        map_position >= self.map_start && map_position < self.map_end
    }
}

/// Rooted binary tree with a fixed topology.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
    preorder: Vec<NodeId>,
    names: HashMap<String, NodeId>,
    total_map_length: f64,
    max_root_to_tip_length: f64,
}

impl Tree {
    /// Build a tree from parent indices, branch lengths and optional names.
    ///
    /// `parents[i]` is the parent of node `i` (`None` for exactly one root).
    /// The root's branch length is ignored. Every node must have zero or two
    /// children, every non-root branch must be positive and finite, and every
    /// tip must be named.
    ///
    /// # Errors
    ///
    /// Returns a [`TreeError`] describing the first structural problem found.
    pub fn from_structure(
        parents: &[Option<usize>],
        branch_lengths: &[f64],
        names: Vec<Option<String>>,
    ) -> Result<Self, TreeError> {
        let n = parents.len();
        if n == 0 {
            return Err(TreeError::Empty);
        }
        if branch_lengths.len() != n || names.len() != n {
            return Err(TreeError::LengthMismatch {
                parents: n,
                lengths: branch_lengths.len(),
                names: names.len(),
            });
        }

        let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut roots = Vec::new();
        for (node, parent) in parents.iter().enumerate() {
            match *parent {
                None => roots.push(node),
                Some(p) if p >= n || p == node => {
                    return Err(TreeError::ParentOutOfRange { node, parent: p });
                }
                Some(p) => children[p].push(node),
            }
        }

        let root = match roots.as_slice() {
            [] => return Err(TreeError::NoRoot),
            [only] => *only,
            _ => return Err(TreeError::MultipleRoots(roots)),
        };

        for (node, kids) in children.iter().enumerate() {
            if kids.len() == 1 || kids.len() > 2 {
                return Err(TreeError::NotBinary {
                    node,
                    children: kids.len(),
                });
            }
        }

        let mut nodes: Vec<Node> = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| Node {
                anc: parents[i].map(NodeId),
                lf_desc: children[i].first().copied().map(NodeId),
                rt_desc: children[i].get(1).copied().map(NodeId),
                branch_length: if i == root { 0.0 } else { branch_lengths[i] },
                time: 0.0,
                map_start: 0.0,
                map_end: 0.0,
                name,
            })
            .collect();

        // Pre-order, left child first.
        let mut preorder = Vec::with_capacity(n);
        let mut stack = vec![NodeId(root)];
        while let Some(id) = stack.pop() {
            preorder.push(id);
            let node = &nodes[id.0];
            if let Some(rt) = node.rt_desc {
                stack.push(rt);
            }
            if let Some(lf) = node.lf_desc {
                stack.push(lf);
            }
        }
        if preorder.len() != n {
            let mut seen = vec![false; n];
            for id in &preorder {
                seen[id.0] = true;
            }
            let node = seen.iter().position(|s| !s).unwrap_or(0);
            return Err(TreeError::Disconnected { node });
        }

        let mut cursor = 0.0;
        let mut max_root_to_tip_length: f64 = 0.0;
        let mut index = HashMap::new();
        for &id in &preorder {
            if id.0 != root {
                let length = nodes[id.0].branch_length;
                if !length.is_finite() || length <= 0.0 {
                    return Err(TreeError::InvalidBranchLength { node: id.0, length });
                }
                let parent_time = nodes[id.0].anc.map_or(0.0, |a| nodes[a.0].time);
                let node = &mut nodes[id.0];
                node.time = parent_time + length;
                node.map_start = cursor;
                cursor += length;
                node.map_end = cursor;
            }

            let node = &nodes[id.0];
            if node.is_tip() {
                if node.name.is_none() {
                    return Err(TreeError::UnnamedTip { node: id.0 });
                }
                max_root_to_tip_length = max_root_to_tip_length.max(node.time);
            }
            if let Some(name) = &node.name {
                if index.insert(name.clone(), id).is_some() {
                    return Err(TreeError::DuplicateName(name.clone()));
                }
            }
        }

        Ok(Self {
            nodes,
            root: NodeId(root),
            preorder,
            names: index,
            total_map_length: cursor,
            max_root_to_tip_length,
        })
    }

    #[must_use]
    pub const fn root(&self) -> NodeId {
        self.root
    }

    /// Borrow a node. Panics if `id` did not come from this tree.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All node ids in pre-order, root first, left subtree before right.
    #[must_use]
    pub fn preorder(&self) -> &[NodeId] {
        &self.preorder
    }

    pub fn tips(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.preorder
            .iter()
            .copied()
            .filter(|id| self.node(*id).is_tip())
    }

    #[must_use]
    pub const fn total_map_length(&self) -> f64 {
        self.total_map_length
    }

    #[must_use]
    pub const fn max_root_to_tip_length(&self) -> f64 {
        self.max_root_to_tip_length
    }

    /// Look up a node by its exact name.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::UnknownSpecies`] if no node carries `name`.
    pub fn node_by_name(&self, name: &str) -> Result<NodeId, TreeError> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| TreeError::UnknownSpecies(name.to_string()))
    }

    /// Most recent common ancestor of two named nodes.
    ///
    /// If one node is an ancestor of the other, the ancestor is returned.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::UnknownSpecies`] if either name cannot be resolved.
    pub fn node_mrca(&self, name_a: &str, name_b: &str) -> Result<NodeId, TreeError> {
        let a = self.node_by_name(name_a)?;
        let b = self.node_by_name(name_b)?;

        let mut on_path_a = vec![false; self.nodes.len()];
        let mut cursor = Some(a);
        while let Some(id) = cursor {
            on_path_a[id.0] = true;
            cursor = self.node(id).anc;
        }

        let mut cursor = Some(b);
        while let Some(id) = cursor {
            if on_path_a[id.0] {
                return Ok(id);
            }
            cursor = self.node(id).anc;
        }
        Ok(self.root)
    }

    /// Leftmost tip in the subtree rooted at `id` (the node itself for tips).
    #[must_use]
    pub fn leftmost_tip(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some(lf) = self.node(current).lf_desc {
            current = lf;
        }
        current
    }

    /// Resolve a map position to the node whose branch contains it.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::MapPositionOutOfRange`] for positions outside
    /// `[0, total_map_length)` (including NaN).
    pub fn node_by_map_time(&self, map_position: f64) -> Result<NodeId, TreeError> {
        if !(map_position >= 0.0 && map_position < self.total_map_length) {
            return Err(TreeError::MapPositionOutOfRange {
                position: map_position,
                total: self.total_map_length,
            });
        }

        // Non-root nodes appear in pre-order with strictly increasing map_start.
        let branches = &self.preorder[1..];
        let after = branches.partition_point(|id| self.node(*id).map_start <= map_position);
        let id = branches[after.saturating_sub(1)];
        debug_assert!(self.node(id).covers(map_position));
        Ok(id)
    }

    /// Distance from the root of a map position on `node`'s branch.
    #[must_use]
    pub fn absolute_time(&self, node: NodeId, map_position: f64) -> f64 {
        let n = self.node(node);
        n.time - (map_position - n.map_start)
    }

    /// Inverse of [`Tree::absolute_time`].
    #[must_use]
    pub fn map_time_for(&self, node: NodeId, absolute_time: f64) -> f64 {
        let n = self.node(node);
        n.map_start + (n.time - absolute_time)
    }
}
