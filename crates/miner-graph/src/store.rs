//! Record store
//!
//! Holds every document, subset and method of one dataset. Identifiers are
//! dense indices assigned in creation order; nothing is ever physically
//! removed.

use crate::entities::{
    Document, FieldValue, Method, NewMethod, NewSubset, Subset, CURRENT_SCHEMA_VERSION,
};
use crate::error::GraphError;
use crate::status::validate_transition;
use indexmap::IndexMap;
use miner_protocol::{DocumentId, MethodId, MethodStatus, SubsetId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::debug;

/// Store statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Total documents
    pub documents: usize,
    /// Live subsets
    pub live_subsets: usize,
    /// Live methods
    pub live_methods: usize,
}

/// All records of one dataset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordStore {
    pub(crate) documents: Vec<Document>,
    pub(crate) subsets: Vec<Subset>,
    pub(crate) methods: Vec<Method>,
}

impl RecordStore {
    /// Create an empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Documents
    // ------------------------------------------------------------------

    /// Append a document
    pub fn add_document(&mut self, values: IndexMap<String, Option<FieldValue>>) -> DocumentId {
        let id = DocumentId(self.documents.len() as u64);
        self.documents.push(Document {
            id,
            values,
            in_subsets: BTreeSet::new(),
        });
        id
    }

    /// Look up a document
    ///
    /// # Errors
    /// - `GraphError::DocumentNotFound` if the id is out of range
    pub fn document(&self, id: DocumentId) -> Result<&Document, GraphError> {
        self.documents
            .get(id.index())
            .ok_or(GraphError::DocumentNotFound(id))
    }

    /// Look up a document for modification
    ///
    /// # Errors
    /// - `GraphError::DocumentNotFound` if the id is out of range
    pub fn document_mut(&mut self, id: DocumentId) -> Result<&mut Document, GraphError> {
        self.documents
            .get_mut(id.index())
            .ok_or(GraphError::DocumentNotFound(id))
    }

    /// All documents
    #[inline]
    #[must_use]
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// Number of documents
    #[inline]
    #[must_use]
    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    // ------------------------------------------------------------------
    // Subsets
    // ------------------------------------------------------------------

    /// Create a subset
    ///
    /// Links the producing method only when it is live. Member documents are
    /// linked in both directions; duplicates are ignored.
    ///
    /// # Errors
    /// - `GraphError::MethodNotFound` if `resulted_in` does not exist
    /// - `GraphError::DocumentNotFound` if a member does not exist
    pub fn create_subset(&mut self, new: NewSubset) -> Result<SubsetId, GraphError> {
        if let Some(method_id) = new.resulted_in {
            if method_id.index() >= self.methods.len() {
                return Err(GraphError::MethodNotFound(method_id));
            }
        }
        for &doc in &new.elements {
            self.document(doc)?;
        }

        let id = SubsetId(self.subsets.len() as u64);
        let resulted_in = new
            .resulted_in
            .filter(|m| self.methods[m.index()].is_live());
        if let Some(method_id) = resulted_in {
            self.methods[method_id.index()].produced.insert(id);
        }

        let mut elements = Vec::with_capacity(new.elements.len());
        for doc in new.elements {
            if self.documents[doc.index()].in_subsets.insert(id) {
                elements.push(doc);
            }
        }

        self.subsets.push(Subset {
            id,
            label: new.label,
            description: new.description,
            resulted_in,
            used_by: BTreeSet::new(),
            has_elements: elements,
            deleted: false,
            modified: false,
            metadata: new.metadata,
            schema_version: CURRENT_SCHEMA_VERSION,
        });
        debug!(subset_id = %id, "subset created");
        Ok(id)
    }

    /// Look up a subset, deleted or not
    ///
    /// # Errors
    /// - `GraphError::SubsetNotFound` if the id is out of range
    pub fn subset(&self, id: SubsetId) -> Result<&Subset, GraphError> {
        self.subsets
            .get(id.index())
            .ok_or(GraphError::SubsetNotFound(id))
    }

    /// Look up a live subset
    ///
    /// # Errors
    /// - `GraphError::SubsetNotFound` if missing or deleted
    pub fn live_subset(&self, id: SubsetId) -> Result<&Subset, GraphError> {
        self.subset(id)
            .ok()
            .filter(|s| s.is_live())
            .ok_or(GraphError::SubsetNotFound(id))
    }

    /// Look up a live subset for modification
    ///
    /// # Errors
    /// - `GraphError::SubsetNotFound` if missing or deleted
    pub fn live_subset_mut(&mut self, id: SubsetId) -> Result<&mut Subset, GraphError> {
        self.subsets
            .get_mut(id.index())
            .filter(|s| s.is_live())
            .ok_or(GraphError::SubsetNotFound(id))
    }

    /// All subsets including deleted ones
    #[inline]
    #[must_use]
    pub fn subsets(&self) -> &[Subset] {
        &self.subsets
    }

    /// Live subsets in id order
    pub fn live_subsets(&self) -> impl Iterator<Item = &Subset> {
        self.subsets.iter().filter(|s| s.is_live())
    }

    // ------------------------------------------------------------------
    // Methods
    // ------------------------------------------------------------------

    /// Create a method in `InQueue` status
    ///
    /// # Errors
    /// - `GraphError::SubsetNotFound` if `applied_on` is missing or deleted
    pub fn create_method(&mut self, new: NewMethod) -> Result<MethodId, GraphError> {
        if let Some(subset_id) = new.applied_on {
            self.live_subset(subset_id)?;
        }
        let id = MethodId(self.methods.len() as u64);
        if let Some(subset_id) = new.applied_on {
            self.subsets[subset_id.index()].used_by.insert(id);
        }
        self.methods.push(Method {
            id,
            method_type: new.method_type,
            parameters: new.parameters,
            result: None,
            status: MethodStatus::InQueue,
            applied_on: new.applied_on,
            produced: BTreeSet::new(),
            deleted: false,
            modified: false,
            schema_version: CURRENT_SCHEMA_VERSION,
        });
        debug!(method_id = %id, method_type = %new.method_type, "method created");
        Ok(id)
    }

    /// Look up a method, deleted or not
    ///
    /// # Errors
    /// - `GraphError::MethodNotFound` if the id is out of range
    pub fn method(&self, id: MethodId) -> Result<&Method, GraphError> {
        self.methods
            .get(id.index())
            .ok_or(GraphError::MethodNotFound(id))
    }

    /// Look up a live method
    ///
    /// # Errors
    /// - `GraphError::MethodNotFound` if missing or deleted
    pub fn live_method(&self, id: MethodId) -> Result<&Method, GraphError> {
        self.method(id)
            .ok()
            .filter(|m| m.is_live())
            .ok_or(GraphError::MethodNotFound(id))
    }

    /// Look up a live method for modification
    ///
    /// # Errors
    /// - `GraphError::MethodNotFound` if missing or deleted
    pub fn live_method_mut(&mut self, id: MethodId) -> Result<&mut Method, GraphError> {
        self.methods
            .get_mut(id.index())
            .filter(|m| m.is_live())
            .ok_or(GraphError::MethodNotFound(id))
    }

    /// All methods including deleted ones
    #[inline]
    #[must_use]
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    /// Live methods in id order
    pub fn live_methods(&self) -> impl Iterator<Item = &Method> {
        self.methods.iter().filter(|m| m.is_live())
    }

    /// Live subsets produced by a method
    #[must_use]
    pub fn live_produced(&self, id: MethodId) -> Vec<SubsetId> {
        self.method(id)
            .map(|m| {
                m.produced
                    .iter()
                    .copied()
                    .filter(|s| self.subsets[s.index()].is_live())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Move a method to a new status
    ///
    /// # Errors
    /// - `GraphError::MethodNotFound` if missing or deleted
    /// - `GraphError::IllegalTransition` if the lifecycle forbids it
    pub fn set_method_status(
        &mut self,
        id: MethodId,
        status: MethodStatus,
    ) -> Result<(), GraphError> {
        let method = self.live_method_mut(id)?;
        validate_transition(method.status, status)?;
        method.status = status;
        Ok(())
    }

    /// Replace a method result
    ///
    /// # Errors
    /// - `GraphError::MethodNotFound` if missing or deleted
    pub fn set_method_result(&mut self, id: MethodId, result: Option<Value>) -> Result<(), GraphError> {
        self.live_method_mut(id)?.result = result;
        Ok(())
    }

    /// Fail every method left `InQueue` or `Training`
    ///
    /// Returns the affected methods.
    pub fn recover_interrupted(&mut self) -> Vec<MethodId> {
        let mut recovered = Vec::new();
        for method in &mut self.methods {
            if matches!(method.status, MethodStatus::InQueue | MethodStatus::Training) {
                method.status = MethodStatus::Error;
                recovered.push(method.id);
            }
        }
        recovered
    }

    /// Store statistics
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            documents: self.documents.len(),
            live_subsets: self.live_subsets().count(),
            live_methods: self.live_methods().count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use miner_protocol::MethodType;
    use serde_json::json;

    fn store_with_docs(n: usize) -> RecordStore {
        let mut store = RecordStore::new();
        for i in 0..n {
            let mut values = IndexMap::new();
            values.insert("n".to_string(), Some(FieldValue::Number(i as f64)));
            store.add_document(values);
        }
        store
    }

    fn method_on(subset: SubsetId) -> NewMethod {
        NewMethod {
            method_type: MethodType::Aggregate,
            parameters: json!({}),
            applied_on: Some(subset),
        }
    }

    #[test]
    fn subset_links_documents_both_ways() {
        let mut store = store_with_docs(3);
        let root = store
            .create_subset(NewSubset::new("root", vec![DocumentId(0), DocumentId(2), DocumentId(2)]))
            .unwrap();
        assert_eq!(root, SubsetId::ROOT);
        assert_eq!(store.subset(root).unwrap().has_elements, vec![DocumentId(0), DocumentId(2)]);
        assert!(store.document(DocumentId(2)).unwrap().in_subsets.contains(&root));
        assert!(store.document(DocumentId(1)).unwrap().in_subsets.is_empty());
    }

    #[test]
    fn subset_with_unknown_document_fails() {
        let mut store = store_with_docs(1);
        let err = store
            .create_subset(NewSubset::new("bad", vec![DocumentId(5)]))
            .unwrap_err();
        assert!(matches!(err, GraphError::DocumentNotFound(DocumentId(5))));
        assert!(store.subsets().is_empty());
    }

    #[test]
    fn method_links_applied_on_and_produced() {
        let mut store = store_with_docs(2);
        let root = store.create_subset(NewSubset::new("root", vec![DocumentId(0)])).unwrap();
        let method = store.create_method(method_on(root)).unwrap();
        let child = store
            .create_subset(NewSubset::new("child", vec![DocumentId(0)]).with_resulted_in(method))
            .unwrap();

        assert!(store.subset(root).unwrap().used_by.contains(&method));
        assert_eq!(store.method(method).unwrap().status, MethodStatus::InQueue);
        assert_eq!(store.live_produced(method), vec![child]);
        assert_eq!(store.subset(child).unwrap().resulted_in, Some(method));
    }

    #[test]
    fn method_on_missing_subset_fails() {
        let mut store = store_with_docs(0);
        assert!(matches!(
            store.create_method(method_on(SubsetId(3))),
            Err(GraphError::SubsetNotFound(SubsetId(3)))
        ));
    }

    #[test]
    fn recover_interrupted_marks_error() {
        let mut store = store_with_docs(1);
        let root = store.create_subset(NewSubset::new("root", vec![DocumentId(0)])).unwrap();
        let queued = store.create_method(method_on(root)).unwrap();
        let training = store.create_method(method_on(root)).unwrap();
        let finished = store.create_method(method_on(root)).unwrap();
        store.set_method_status(training, MethodStatus::Training).unwrap();
        store.set_method_status(finished, MethodStatus::Finished).unwrap();

        let recovered = store.recover_interrupted();
        assert_eq!(recovered, vec![queued, training]);
        assert_eq!(store.method(queued).unwrap().status, MethodStatus::Error);
        assert_eq!(store.method(finished).unwrap().status, MethodStatus::Finished);
    }

    #[cfg(not(feature = "strict-debug"))]
    #[test]
    fn status_cannot_move_backwards() {
        let mut store = store_with_docs(1);
        let root = store.create_subset(NewSubset::new("root", vec![DocumentId(0)])).unwrap();
        let method = store.create_method(method_on(root)).unwrap();
        store.set_method_status(method, MethodStatus::Finished).unwrap();
        assert!(store.set_method_status(method, MethodStatus::Training).is_err());
    }
}
