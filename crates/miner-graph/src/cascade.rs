//! Cascading soft delete over the provenance graph
//!
//! Subsets and methods are handled as one node type and deleted with a
//! single work queue. A node already visited or already deleted ends its
//! branch.
//!
//! - Deleting a subset deletes every method applied on it, and drops the
//!   produced edge of the method that made it; that method is deleted too
//!   once it has no live produced subset left.
//! - Deleting a method deletes every subset it produced.

use crate::store::RecordStore;
use miner_protocol::{MethodId, SubsetId};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use tracing::debug;

/// Node of the provenance graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GraphNode {
    /// A subset
    Subset(SubsetId),
    /// A method
    Method(MethodId),
}

impl RecordStore {
    /// Soft-delete a subset and everything depending on it
    ///
    /// Returns the deleted nodes in deletion order; empty when the subset is
    /// missing, already deleted or a legacy entity.
    pub fn delete_subset(&mut self, id: SubsetId) -> Vec<GraphNode> {
        self.cascade_delete(GraphNode::Subset(id))
    }

    /// Soft-delete a method and everything it produced
    ///
    /// Returns the deleted nodes in deletion order.
    pub fn delete_method(&mut self, id: MethodId) -> Vec<GraphNode> {
        self.cascade_delete(GraphNode::Method(id))
    }

    fn cascade_delete(&mut self, start: GraphNode) -> Vec<GraphNode> {
        let mut queue = VecDeque::from([start]);
        let mut visited = HashSet::new();
        let mut deleted = Vec::new();

        while let Some(node) = queue.pop_front() {
            if !visited.insert(node) {
                continue;
            }
            match node {
                GraphNode::Subset(id) => {
                    let Some(subset) = self.subsets.get_mut(id.index()) else {
                        continue;
                    };
                    if !subset.tracks_deletion() || subset.deleted {
                        continue;
                    }
                    subset.deleted = true;
                    deleted.push(node);
                    queue.extend(subset.used_by.iter().map(|&m| GraphNode::Method(m)));

                    if let Some(parent) = subset.resulted_in {
                        let Some(method) = self.methods.get_mut(parent.index()) else {
                            continue;
                        };
                        if !method.is_live() {
                            continue;
                        }
                        method.produced.remove(&id);
                        let exhausted = method
                            .produced
                            .iter()
                            .all(|s| !self.subsets[s.index()].is_live());
                        if exhausted {
                            queue.push_back(GraphNode::Method(parent));
                        }
                    }
                }
                GraphNode::Method(id) => {
                    let Some(method) = self.methods.get_mut(id.index()) else {
                        continue;
                    };
                    if !method.tracks_deletion() || method.deleted {
                        continue;
                    }
                    method.deleted = true;
                    deleted.push(node);
                    queue.extend(method.produced.iter().map(|&s| GraphNode::Subset(s)));
                }
            }
        }

        debug!(?start, deleted = deleted.len(), "cascade delete finished");
        deleted
    }
}
