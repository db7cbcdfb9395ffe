//! Call tree reconstruction from `(routine, caller)` edges
//!
//! The store only remembers, per routine, the caller it was first seen
//! with. At report time those edges are turned back into a tree rooted at
//! routine 0 (the un-instrumented top-level caller) and walked in pre-order
//! so parents print above their children.
//!
//! # Layout
//!
//! ```text
//! edges: (1,5) (5,0) (4,10) (9,4) (10,1)
//!
//!   0 ── 5 ── 1 ── 10 ── 4 ── 9
//!
//! nodes (arena):  [0] [1] [5] [4] [9] [10]
//! links:          first_child / next_sibling as Option<usize> indices
//! ```
//!
//! Every algorithm here is iterative: depth assignment, traversal and
//! teardown never recurse, so deeply recursive instrumented code cannot
//! exhaust the native stack at report time.

use crate::error::{Result, StopwatchError};
use serde::{Deserialize, Serialize};

/// Observed relationship between a routine and its first-seen caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub function_id: usize,
    pub caller_id: usize,
}

impl Edge {
    pub fn new(function_id: usize, caller_id: usize) -> Self {
        Self {
            function_id,
            caller_id,
        }
    }
}

impl From<(usize, usize)> for Edge {
    fn from((function_id, caller_id): (usize, usize)) -> Self {
        Self::new(function_id, caller_id)
    }
}

/// A routine placed in the call tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallTreeNode {
    /// Routine id
    pub function_id: usize,
    /// Distance from the root (root = 0)
    pub stack_depth: usize,
    first_child: Option<usize>,
    last_child: Option<usize>,
    next_sibling: Option<usize>,
}

impl CallTreeNode {
    fn new(function_id: usize) -> Self {
        Self {
            function_id,
            stack_depth: 0,
            first_child: None,
            last_child: None,
            next_sibling: None,
        }
    }
}

/// Arena-backed n-ary tree using first-child / next-sibling links
#[derive(Debug, Clone)]
pub struct CallTree {
    nodes: Vec<CallTreeNode>,
}

const ROOT_INDEX: usize = 0;

impl CallTree {
    /// Build a tree from edges
    ///
    /// Children keep the order in which their edges appear. Each
    /// `function_id` may appear once and must not be 0; each `caller_id`
    /// must be 0 or the `function_id` of another edge.
    ///
    /// # Example
    /// ```
    /// use stopwatch::call_tree::{CallTree, Edge};
    ///
    /// let edges = [Edge::new(1, 0), Edge::new(3, 0), Edge::new(9, 0)];
    /// let tree = CallTree::build(&edges).unwrap();
    /// let order: Vec<_> = tree.iter().map(|n| (n.function_id, n.stack_depth)).collect();
    /// assert_eq!(order, vec![(0, 0), (1, 1), (3, 1), (9, 1)]);
    /// ```
    pub fn build(edges: &[Edge]) -> Result<Self> {
        let max_id = edges.iter().map(|e| e.function_id).max().unwrap_or(0);

        // Dense id -> arena index lookup; ids are small and mostly contiguous
        let mut index: Vec<Option<usize>> = vec![None; max_id + 1];
        let mut nodes = Vec::with_capacity(edges.len() + 1);

        index[0] = Some(ROOT_INDEX);
        nodes.push(CallTreeNode::new(0));

        for edge in edges {
            let slot = &mut index[edge.function_id];
            if slot.is_some() {
                return Err(StopwatchError::DuplicateRoutine(edge.function_id));
            }
            *slot = Some(nodes.len());
            nodes.push(CallTreeNode::new(edge.function_id));
        }

        let mut tree = Self { nodes };

        // Edge i owns arena node i + 1
        for (position, edge) in edges.iter().enumerate() {
            let caller = index
                .get(edge.caller_id)
                .copied()
                .flatten()
                .ok_or(StopwatchError::DanglingCaller {
                    function_id: edge.function_id,
                    caller_id: edge.caller_id,
                })?;
            tree.attach(caller, position + 1);
        }

        let reached = tree.assign_depths();
        if reached != tree.nodes.len() {
            return Err(StopwatchError::CyclicCallGraph {
                unreachable: tree.nodes.len() - reached,
            });
        }

        tracing::trace!("built call tree with {} node(s)", tree.nodes.len());
        Ok(tree)
    }

    fn attach(&mut self, caller: usize, callee: usize) {
        let depth = self.nodes[caller].stack_depth + 1;
        match self.nodes[caller].last_child {
            None => self.nodes[caller].first_child = Some(callee),
            Some(tail) => self.nodes[tail].next_sibling = Some(callee),
        }
        self.nodes[caller].last_child = Some(callee);
        self.nodes[callee].stack_depth = depth;
    }

    /// Recompute every depth top-down, returning how many nodes were reached
    fn assign_depths(&mut self) -> usize {
        let mut reached = 0;
        let mut pending = Vec::with_capacity(self.nodes.len());
        pending.push((ROOT_INDEX, 0));

        while let Some((idx, depth)) = pending.pop() {
            self.nodes[idx].stack_depth = depth;
            reached += 1;

            let mut child = self.nodes[idx].first_child;
            while let Some(c) = child {
                pending.push((c, depth + 1));
                child = self.nodes[c].next_sibling;
            }
        }

        reached
    }

    /// The synthetic root (routine 0)
    pub fn root(&self) -> &CallTreeNode {
        &self.nodes[ROOT_INDEX]
    }

    /// Total number of nodes, root included
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Direct children of `node`, in attachment order
    pub fn children<'a>(&'a self, node: &CallTreeNode) -> Children<'a> {
        Children {
            tree: self,
            next: node.first_child,
        }
    }

    /// Pre-order depth-first iterator starting at the root
    pub fn iter(&self) -> CallTreeIter<'_> {
        CallTreeIter::new(self)
    }
}

impl<'a> IntoIterator for &'a CallTree {
    type Item = &'a CallTreeNode;
    type IntoIter = CallTreeIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the direct children of a node
#[derive(Debug, Clone)]
pub struct Children<'a> {
    tree: &'a CallTree,
    next: Option<usize>,
}

impl<'a> Iterator for Children<'a> {
    type Item = &'a CallTreeNode;

    fn next(&mut self) -> Option<Self::Item> {
        let tree = self.tree;
        let node = &tree.nodes[self.next?];
        self.next = node.next_sibling;
        Some(node)
    }
}

/// Traversal state of a [`CallTreeIter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterState {
    Ready,
    Exhausted,
}

/// Restartable pre-order walker with an explicit work stack
///
/// The stack never holds more entries than the tree has nodes.
#[derive(Debug, Clone)]
pub struct CallTreeIter<'a> {
    tree: &'a CallTree,
    stack: Vec<usize>,
}

impl<'a> CallTreeIter<'a> {
    fn new(tree: &'a CallTree) -> Self {
        let mut stack = Vec::with_capacity(tree.node_count());
        stack.push(ROOT_INDEX);
        Self { tree, stack }
    }

    /// Whether another node is available
    pub fn has_next(&self) -> bool {
        !self.stack.is_empty()
    }

    pub fn state(&self) -> IterState {
        if self.has_next() {
            IterState::Ready
        } else {
            IterState::Exhausted
        }
    }

    /// Pop the next node in pre-order
    pub fn next_node(&mut self) -> Result<&'a CallTreeNode> {
        let tree = self.tree;
        let idx = self.stack.pop().ok_or(StopwatchError::IteratorExhausted)?;
        let node = &tree.nodes[idx];

        // Push children then flip them so the first child is on top
        let mark = self.stack.len();
        let mut child = node.first_child;
        while let Some(c) = child {
            self.stack.push(c);
            child = tree.nodes[c].next_sibling;
        }
        self.stack[mark..].reverse();

        Ok(node)
    }

    /// Restart from the root
    pub fn reset(&mut self) {
        self.stack.clear();
        self.stack.push(ROOT_INDEX);
    }
}

impl<'a> Iterator for CallTreeIter<'a> {
    type Item = &'a CallTreeNode;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_node().ok()
    }
}
