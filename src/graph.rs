//! Dependency graph storage and layer extraction.
//!
//! The graph is an arena of nodes keyed by [`NodeId`]. Each node owns its release
//! action and the set of prerequisites it declared. Shutdown repeatedly peels off the
//! current *layer*: every node that no remaining node lists as a prerequisite.

use std::collections::{HashMap, HashSet};

use crate::release::Releaser;
use crate::types::NodeId;

pub(crate) struct Node {
    pub(crate) releaser: Option<Releaser>,
    pub(crate) prerequisites: HashSet<NodeId>,
}

/// Nodes removed from the graph together, releasable concurrently.
pub(crate) struct Layer {
    pub(crate) members: Vec<(NodeId, Option<Releaser>)>,
}

impl Layer {
    pub(crate) fn len(&self) -> usize {
        self.members.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[derive(Default)]
pub(crate) struct Graph {
    nodes: HashMap<NodeId, Node>,
    next_id: usize,
}

impl Graph {
    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Insert a node. Every prerequisite must already be present.
    pub(crate) fn insert(
        &mut self,
        releaser: Option<Releaser>,
        prerequisites: HashSet<NodeId>,
    ) -> NodeId {
        debug_assert!(prerequisites.iter().all(|id| self.contains(*id)));

        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            Node {
                releaser,
                prerequisites,
            },
        );
        id
    }

    /// Remove and return the current layer.
    ///
    /// Returns `None` once the graph is empty. A non-empty graph yields an empty layer
    /// only when the remaining nodes form a cycle.
    pub(crate) fn take_layer(&mut self) -> Option<Layer> {
        if self.nodes.is_empty() {
            return None;
        }

        let referenced: HashSet<NodeId> = self
            .nodes
            .values()
            .flat_map(|node| node.prerequisites.iter().copied())
            .collect();

        let mut ids: Vec<NodeId> = self
            .nodes
            .keys()
            .filter(|id| !referenced.contains(id))
            .copied()
            .collect();
        ids.sort(); // Deterministic dispatch order

        let members = ids
            .into_iter()
            .filter_map(|id| self.nodes.remove(&id).map(|node| (id, node.releaser)))
            .collect();

        Some(Layer { members })
    }

    // Adds an edge without validation; lets tests build cycles
    #[cfg(test)]
    pub(crate) fn link(&mut self, from: NodeId, to: NodeId) {
        if let Some(node) = self.nodes.get_mut(&from) {
            node.prerequisites.insert(to);
        }
    }
}
