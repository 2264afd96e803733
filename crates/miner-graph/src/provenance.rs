//! Provenance graph validation

use crate::cascade::GraphNode;
use crate::error::GraphError;
use crate::store::RecordStore;
use petgraph::graphmap::DiGraphMap;

impl RecordStore {
    /// Directed provenance graph: subset → method for `applied_on`,
    /// method → subset for `produced`
    #[must_use]
    pub fn provenance_graph(&self) -> DiGraphMap<GraphNode, ()> {
        let mut graph = DiGraphMap::new();
        for subset in &self.subsets {
            graph.add_node(GraphNode::Subset(subset.id));
        }
        for method in &self.methods {
            let node = GraphNode::Method(method.id);
            graph.add_node(node);
            if let Some(input) = method.applied_on {
                graph.add_edge(GraphNode::Subset(input), node, ());
            }
            for &output in &method.produced {
                graph.add_edge(node, GraphNode::Subset(output), ());
            }
        }
        graph
    }

    /// Validate edge symmetry and acyclicity
    ///
    /// # Errors
    /// - `GraphError::DanglingReference` if an edge points outside the store
    ///   or lacks its reverse edge
    /// - `GraphError::CycleDetected` if provenance loops back on itself
    pub fn validate(&self) -> Result<(), GraphError> {
        for method in &self.methods {
            if let Some(input) = method.applied_on {
                let subset = self.subsets.get(input.index()).ok_or_else(|| {
                    GraphError::DanglingReference(format!(
                        "method {} applied on missing subset {input}",
                        method.id
                    ))
                })?;
                if !subset.used_by.contains(&method.id) {
                    return Err(GraphError::DanglingReference(format!(
                        "subset {input} does not list method {} as a user",
                        method.id
                    )));
                }
            }
            for &output in &method.produced {
                let subset = self.subsets.get(output.index()).ok_or_else(|| {
                    GraphError::DanglingReference(format!(
                        "method {} produced missing subset {output}",
                        method.id
                    ))
                })?;
                if subset.resulted_in != Some(method.id) {
                    return Err(GraphError::DanglingReference(format!(
                        "subset {output} does not name method {} as its producer",
                        method.id
                    )));
                }
            }
        }

        for subset in &self.subsets {
            for &user in &subset.used_by {
                if user.index() >= self.methods.len() {
                    return Err(GraphError::DanglingReference(format!(
                        "subset {} used by missing method {user}",
                        subset.id
                    )));
                }
            }
            if let Some(parent) = subset.resulted_in {
                if parent.index() >= self.methods.len() {
                    return Err(GraphError::DanglingReference(format!(
                        "subset {} produced by missing method {parent}",
                        subset.id
                    )));
                }
            }
            for &doc in &subset.has_elements {
                if doc.index() >= self.documents.len() {
                    return Err(GraphError::DanglingReference(format!(
                        "subset {} contains missing document {doc}",
                        subset.id
                    )));
                }
            }
        }

        if petgraph::algo::is_cyclic_directed(&self.provenance_graph()) {
            return Err(GraphError::CycleDetected);
        }
        Ok(())
    }
}
