//! One dataset session
//!
//! A [`Session`] owns the record store of one dataset, the on-disk files and
//! the runners of its in-progress active-learning methods. Every mutating
//! operation persists the store before it returns.

use crate::aggregate;
use crate::error::SessionError;
use crate::format;
use crate::loader;
use crate::methods::active_learning::ActiveLearningRunner;
use crate::methods::clustering::{self, ClusteringOptions, ClusteringType, EMPTY_CLUSTER_LABEL};
use crate::methods::{is_textual, store_processing, tokenizer_for, MethodParameters};
use chrono::Utc;
use miner_engine::EngineError;
use miner_graph::{GraphNode, NewMethod, NewSubset, RecordStore, StoreFiles};
use miner_protocol::{
    DatasetBootstrap, DatasetInfo, DatasetUpdate, DocumentId, DocumentQuery, DocumentUpdate,
    FieldDescriptor, FieldType, FileInfo, MethodCreate, MethodId, MethodStatus, MethodStep,
    MethodType, MethodUpdate, Stopwords, SubsetId, SubsetUpdate,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fs;
use tracing::{error, info, warn};

const ROOT_LABEL: &str = "root";
const ROOT_DESCRIPTION: &str = "The root subset. Contains all records of the dataset.";
const DEFAULT_PAGE_SIZE: usize = 20;
const DOWNLOAD_DIR: &str = "downloads";

/// Label sent with an active-learning `update` step
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LabelUpdate {
    document_id: DocumentId,
    #[serde(default)]
    label: Option<i64>,
}

/// State of one attached dataset
#[derive(Debug)]
pub struct Session {
    info: DatasetInfo,
    file: FileInfo,
    schema: Vec<FieldDescriptor>,
    files: StoreFiles,
    store: RecordStore,
    runners: HashMap<MethodId, ActiveLearningRunner>,
}

impl Session {
    /// Build a fresh store from the dataset's source file
    ///
    /// Loads every record, creates the root subset and aggregates it.
    ///
    /// # Errors
    /// - `SessionError::Validation` if the source file or field list is missing
    /// - `SessionError::Io` / `SessionError::Graph` on storage failures
    pub fn create(bootstrap: DatasetBootstrap) -> Result<Self, SessionError> {
        let DatasetBootstrap { mut dataset, file } = bootstrap;
        let filepath = file
            .filepath
            .clone()
            .ok_or_else(|| SessionError::validation("file.filepath is required to create a dataset"))?;
        if !filepath.is_file() {
            return Err(SessionError::validation(format!(
                "source file {} does not exist",
                filepath.display()
            )));
        }
        if !file.fields.iter().any(|f| f.included) {
            return Err(SessionError::validation("at least one included field is required"));
        }
        if dataset.created.is_none() {
            dataset.created = Some(Utc::now().to_rfc3339());
        }

        let files = StoreFiles::new(&dataset.dbpath);
        files.create_clean()?;
        let mut store = RecordStore::new();
        let report = loader::load_file(
            &filepath,
            loader::delimiter_char(&file.delimiter),
            &file.fields,
            &mut store,
        )?;
        files.acquire_lock()?;

        let mut session = Self::attach(dataset, file, files, store);
        let all: Vec<DocumentId> = session.store.documents().iter().map(|d| d.id).collect();
        let root = session
            .store
            .create_subset(NewSubset::new(ROOT_LABEL, all).with_description(ROOT_DESCRIPTION))?;
        session.aggregate_subset(root)?;
        session.persist()?;

        info!(
            dataset_id = %session.info.id,
            documents = report.loaded,
            skipped = report.skipped,
            "dataset created"
        );
        Ok(session)
    }

    /// Reattach to an existing store
    ///
    /// Methods interrupted by a previous worker are marked failed.
    ///
    /// # Errors
    /// - `SessionError::NotFound` if no store exists at the dataset path
    /// - `SessionError::Graph` if the store is corrupt or inconsistent
    pub fn open(bootstrap: DatasetBootstrap) -> Result<Self, SessionError> {
        let DatasetBootstrap { dataset, file } = bootstrap;
        let files = StoreFiles::new(&dataset.dbpath);
        if !files.exists() {
            return Err(SessionError::NotFound(format!(
                "no dataset store at {}",
                files.store_path().display()
            )));
        }
        files.clear_stale_lock()?;
        let mut store = files.load()?;
        store.validate()?;
        let recovered = store.recover_interrupted();
        if !recovered.is_empty() {
            warn!(methods = ?recovered, "interrupted methods marked as failed");
        }
        files.acquire_lock()?;

        let session = Self::attach(dataset, file, files, store);
        session.persist()?;
        info!(
            dataset_id = %session.info.id,
            documents = session.store.document_count(),
            "dataset opened"
        );
        Ok(session)
    }

    fn attach(info: DatasetInfo, file: FileInfo, files: StoreFiles, store: RecordStore) -> Self {
        let schema = file.fields.iter().filter(|f| f.included).cloned().collect();
        Self {
            info,
            file,
            schema,
            files,
            store,
            runners: HashMap::new(),
        }
    }

    /// Persist and release the store
    ///
    /// # Errors
    /// - `SessionError::Graph` if the final snapshot cannot be written
    pub fn close(self) -> Result<(), SessionError> {
        self.persist()?;
        self.files.release_lock()?;
        info!(dataset_id = %self.info.id, "dataset closed");
        Ok(())
    }

    fn persist(&self) -> Result<(), SessionError> {
        self.files.save(&self.store)?;
        Ok(())
    }

    /// Dataset metadata
    #[inline]
    #[must_use]
    pub fn info(&self) -> &DatasetInfo {
        &self.info
    }

    /// Included fields in file order
    #[inline]
    #[must_use]
    pub fn schema(&self) -> &[FieldDescriptor] {
        &self.schema
    }

    /// Underlying record store
    #[inline]
    #[must_use]
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// On-disk layout
    #[inline]
    #[must_use]
    pub fn files(&self) -> &StoreFiles {
        &self.files
    }

    /// Runner of an in-progress active-learning method
    #[inline]
    #[must_use]
    pub fn runner(&self, id: MethodId) -> Option<&ActiveLearningRunner> {
        self.runners.get(&id)
    }

    // ------------------------------------------------------------------
    // Dataset
    // ------------------------------------------------------------------

    fn dataset_json(&self) -> Value {
        json!({
            "id": self.info.id,
            "name": self.info.name,
            "description": self.info.description,
            "created": self.info.created,
            "dbpath": self.info.dbpath,
            "delimiter": self.file.delimiter,
            "nDocuments": self.store.document_count(),
            "fields": self.schema,
            "processing": self.info.processing,
        })
    }

    /// Dataset metadata with its live subsets and methods
    #[must_use]
    pub fn dataset(&self) -> Value {
        json!({
            "datasets": self.dataset_json(),
            "subsets": self.subset_list(),
            "methods": self.method_list(),
        })
    }

    /// Rename or redescribe the dataset
    pub fn update_dataset(&mut self, update: DatasetUpdate) -> Value {
        if let Some(name) = update.name {
            self.info.name = name;
        }
        if let Some(description) = update.description {
            self.info.description = Some(description);
        }
        json!({ "datasets": self.dataset_json() })
    }

    // ------------------------------------------------------------------
    // Subsets
    // ------------------------------------------------------------------

    fn subset_list(&self) -> Vec<Value> {
        self.store
            .live_subsets()
            .map(|s| format::subset(&self.store, s))
            .collect()
    }

    /// Every live subset
    #[must_use]
    pub fn subsets(&self) -> Value {
        json!({ "subsets": self.subset_list() })
    }

    /// One subset with the live methods that consumed or produced it
    ///
    /// # Errors
    /// - `SessionError::Graph` (not found) for missing or deleted subsets
    pub fn subset(&self, id: SubsetId) -> Result<Value, SessionError> {
        let subset = self.store.live_subset(id)?;
        let methods: Vec<Value> = subset
            .resulted_in
            .iter()
            .chain(subset.used_by.iter())
            .filter_map(|&m| self.store.live_method(m).ok())
            .map(|m| format::method(&self.store, m))
            .collect();
        Ok(json!({
            "subsets": format::subset(&self.store, subset),
            "methods": methods,
        }))
    }

    /// Relabel or redescribe a subset
    ///
    /// # Errors
    /// - `SessionError::Graph` (not found) for missing or deleted subsets
    pub fn update_subset(&mut self, update: SubsetUpdate) -> Result<Value, SessionError> {
        let subset = self.store.live_subset_mut(update.subset_id)?;
        if let Some(label) = update.subset.label {
            subset.label = label;
        }
        if let Some(description) = update.subset.description {
            subset.description = Some(description);
        }
        self.persist()?;
        self.subset(update.subset_id)
    }

    /// Delete a subset and everything depending on it
    ///
    /// # Errors
    /// - `SessionError::Graph` (not found) for unknown subset ids
    pub fn delete_subset(&mut self, id: SubsetId) -> Result<Value, SessionError> {
        self.store.subset(id)?;
        let deleted = self.store.delete_subset(id);
        self.forget(&deleted);
        self.persist()?;
        info!(subset_id = %id, cascaded = deleted.len(), "subset deleted");
        Ok(deleted_json(&deleted))
    }

    /// Export a subset as a delimited file under the dataset directory
    ///
    /// # Errors
    /// - `SessionError::Graph` (not found) for missing or deleted subsets
    /// - `SessionError::Io` if the file cannot be written
    pub fn download_subset(&self, id: SubsetId) -> Result<Value, SessionError> {
        let subset = self.store.live_subset(id)?;
        let dir = self.files.root().join(DOWNLOAD_DIR);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("subset-{id}.csv"));

        let mut out = self
            .schema
            .iter()
            .map(|f| csv_escape(&f.name))
            .collect::<Vec<_>>()
            .join(",");
        out.push('\n');
        for &doc_id in &subset.has_elements {
            let document = self.store.document(doc_id)?;
            let row = self
                .schema
                .iter()
                .map(|f| {
                    document
                        .value(&f.name)
                        .map(|v| csv_escape(&v.display_string()).into_owned())
                        .unwrap_or_default()
                })
                .collect::<Vec<_>>()
                .join(",");
            out.push_str(&row);
            out.push('\n');
        }
        fs::write(&path, out)?;

        info!(subset_id = %id, path = %path.display(), "subset exported");
        Ok(json!({
            "path": path.display().to_string(),
            "rows": subset.has_elements.len(),
        }))
    }

    // ------------------------------------------------------------------
    // Methods
    // ------------------------------------------------------------------

    fn method_list(&self) -> Vec<Value> {
        self.store
            .live_methods()
            .map(|m| format::method(&self.store, m))
            .collect()
    }

    /// Every live method
    #[must_use]
    pub fn methods(&self) -> Value {
        json!({ "methods": self.method_list() })
    }

    /// One method with its input and live output subsets
    ///
    /// # Errors
    /// - `SessionError::Graph` (not found) for missing or deleted methods
    pub fn method(&self, id: MethodId) -> Result<Value, SessionError> {
        let method = self.store.live_method(id)?;
        let subsets: Vec<Value> = method
            .applied_on
            .into_iter()
            .chain(self.store.live_produced(id))
            .filter_map(|s| self.store.live_subset(s).ok())
            .map(|s| format::subset(&self.store, s))
            .collect();
        Ok(json!({
            "methods": format::method(&self.store, method),
            "subsets": subsets,
        }))
    }

    /// Create and run a method
    ///
    /// Aggregates and clusterings finish before this returns; active
    /// learning stays in `Training` until its `train` step.
    ///
    /// # Errors
    /// - `SessionError::Validation` for malformed parameters; no method is
    ///   created in that case
    /// - `SessionError::Training` if the method failed on its data; the
    ///   method is kept with status `Error`
    pub fn create_method(&mut self, create: MethodCreate) -> Result<Value, SessionError> {
        let method_type = create.method.method_type;
        let mut parameters = create.method.parameters;
        let params = MethodParameters::parse(&parameters)?;
        self.store.live_subset(params.subset_id)?;
        let stopwords = params.stopwords(&self.info.processing.stopwords);
        store_processing(&mut parameters, &stopwords);

        let id = match method_type {
            MethodType::Aggregate => {
                let fields = params.resolve_fields(&self.schema, |_| true)?;
                self.run_aggregate(params.subset_id, parameters, &fields, &stopwords)?
            }
            MethodType::Clustering => {
                let options = ClusteringOptions::parse(&params.method)?;
                let fields = match options.clustering_type {
                    ClusteringType::Text => params.resolve_fields(&self.schema, is_textual)?,
                    ClusteringType::Number => {
                        params.resolve_fields(&self.schema, |t| t == FieldType::Number)?
                    }
                };
                self.run_clustering(params.subset_id, parameters, &fields, &stopwords, &options)?
            }
            MethodType::ActiveLearning => {
                let query = params
                    .method
                    .get("query")
                    .and_then(Value::as_str)
                    .ok_or_else(|| SessionError::validation("active learning requires method.query"))?
                    .to_string();
                let fields = params.resolve_fields(&self.schema, is_textual)?;
                self.start_active_learning(params.subset_id, parameters, &fields, &stopwords, &query)?
            }
        };

        self.persist()?;
        info!(method_id = %id, %method_type, "method created");
        self.method(id)
    }

    fn new_method(
        &mut self,
        method_type: MethodType,
        subset_id: SubsetId,
        parameters: Value,
    ) -> Result<MethodId, SessionError> {
        Ok(self.store.create_method(NewMethod {
            method_type,
            parameters,
            applied_on: Some(subset_id),
        })?)
    }

    fn run_aggregate(
        &mut self,
        subset_id: SubsetId,
        parameters: Value,
        fields: &[String],
        stopwords: &Stopwords,
    ) -> Result<MethodId, SessionError> {
        let id = self.new_method(MethodType::Aggregate, subset_id, parameters)?;
        let descriptors: Vec<FieldDescriptor> = self
            .schema
            .iter()
            .filter(|f| fields.contains(&f.name))
            .cloned()
            .collect();
        let elements = self.store.live_subset(subset_id)?.has_elements.clone();
        let aggregates =
            aggregate::compute(&self.store, &elements, &descriptors, &tokenizer_for(stopwords));
        self.store
            .set_method_result(id, Some(json!({ "aggregates": aggregates })))?;
        self.store.set_method_status(id, MethodStatus::Finished)?;
        Ok(id)
    }

    /// Aggregate every included field of a subset with the dataset stopwords
    fn aggregate_subset(&mut self, subset_id: SubsetId) -> Result<MethodId, SessionError> {
        let fields: Vec<String> = self.schema.iter().map(|f| f.name.clone()).collect();
        let stopwords = self.info.processing.stopwords.clone();
        let mut parameters = json!({ "subsetId": subset_id, "fields": fields });
        store_processing(&mut parameters, &stopwords);
        self.run_aggregate(subset_id, parameters, &fields, &stopwords)
    }

    fn create_subset_with_aggregates(&mut self, new: NewSubset) -> Result<SubsetId, SessionError> {
        let id = self.store.create_subset(new)?;
        self.aggregate_subset(id)?;
        Ok(id)
    }

    fn run_clustering(
        &mut self,
        subset_id: SubsetId,
        parameters: Value,
        fields: &[String],
        stopwords: &Stopwords,
        options: &ClusteringOptions,
    ) -> Result<MethodId, SessionError> {
        let id = self.new_method(MethodType::Clustering, subset_id, parameters)?;
        self.store.set_method_status(id, MethodStatus::Training)?;
        let elements = self.store.live_subset(subset_id)?.has_elements.clone();

        let outcome = match clustering::run(
            &self.store,
            &elements,
            fields,
            tokenizer_for(stopwords),
            options,
        ) {
            Ok(outcome) => outcome,
            Err(err) => return Err(self.fail_method(id, &err)),
        };

        let mut subsets = Vec::with_capacity(outcome.clusters.len());
        for (i, cluster) in outcome.clusters.iter().enumerate() {
            let subset = self.create_subset_with_aggregates(
                NewSubset::new(cluster.label(i), cluster.doc_ids.clone()).with_resulted_in(id),
            )?;
            subsets.push(subset);
        }
        let empty = if outcome.empty.is_empty() {
            None
        } else {
            Some(self.create_subset_with_aggregates(
                NewSubset::new(EMPTY_CLUSTER_LABEL, outcome.empty.clone()).with_resulted_in(id),
            )?)
        };

        self.store
            .set_method_result(id, Some(outcome.to_json(&subsets, empty)))?;
        self.store.set_method_status(id, MethodStatus::Finished)?;
        Ok(id)
    }

    fn start_active_learning(
        &mut self,
        subset_id: SubsetId,
        parameters: Value,
        fields: &[String],
        stopwords: &Stopwords,
        query: &str,
    ) -> Result<MethodId, SessionError> {
        let id = self.new_method(MethodType::ActiveLearning, subset_id, parameters)?;
        self.store.set_method_status(id, MethodStatus::Training)?;
        let elements = self.store.live_subset(subset_id)?.has_elements.clone();

        let runner = match ActiveLearningRunner::init(
            &self.store,
            &elements,
            fields,
            tokenizer_for(stopwords),
            query,
        ) {
            Ok(runner) => runner,
            Err(err) => return Err(self.fail_method(id, &err)),
        };
        runner.write_parameters(&mut self.store.live_method_mut(id)?.parameters);
        self.runners.insert(id, runner);
        Ok(id)
    }

    /// Mark a method failed and turn the engine error into a response error
    fn fail_method(&mut self, id: MethodId, err: &EngineError) -> SessionError {
        error!(method_id = %id, %err, "method failed");
        if let Err(status_err) = self.store.set_method_status(id, MethodStatus::Error) {
            warn!(method_id = %id, %status_err, "could not mark method as failed");
        }
        if let Ok(method) = self.store.live_method_mut(id) {
            method.result = Some(json!({ "error": err.to_string() }));
        }
        if let Err(persist_err) = self.persist() {
            warn!(%persist_err, "could not persist failed method");
        }
        SessionError::Training(err.to_string())
    }

    /// Advance an active-learning method
    ///
    /// `update` records one label and picks the next candidate; `train`
    /// finalizes the model into a positive and a negative subset.
    ///
    /// # Errors
    /// - `SessionError::Validation` for methods without update steps, methods
    ///   no longer accepting labels, or malformed label payloads
    /// - `SessionError::Training` if finalization fails
    pub fn update_method(&mut self, update: MethodUpdate) -> Result<Value, SessionError> {
        let id = update.method_id;
        let method = self.store.live_method(id)?;
        if method.method_type != MethodType::ActiveLearning {
            return Err(SessionError::validation(format!(
                "method {id} of type {} has no update steps",
                method.method_type
            )));
        }
        if !self.runners.contains_key(&id) {
            return Err(SessionError::validation(format!(
                "method {id} is not accepting labels (status {:?})",
                method.status
            )));
        }

        match update.method.step {
            MethodStep::Update => {
                let next = update
                    .method
                    .parameters
                    .as_ref()
                    .and_then(|p| p.pointer("/method/documents/next"))
                    .ok_or_else(|| {
                        SessionError::validation("update step requires method.documents.next")
                    })?;
                let request = LabelUpdate::deserialize(next)
                    .map_err(|e| SessionError::validation(format!("invalid label update: {e}")))?;
                let label = i8::try_from(request.label.unwrap_or(0)).map_err(|_| {
                    SessionError::validation("label must be -1, 0 or 1")
                })?;

                let runner = self
                    .runners
                    .get_mut(&id)
                    .ok_or_else(|| SessionError::Internal(format!("runner for method {id} vanished")))?;
                runner.label(request.document_id, label)?;
                let method = self.store.live_method_mut(id)?;
                runner.write_parameters(&mut method.parameters);
                if runner.model_initialized() {
                    method.result = Some(runner.statistics());
                }
            }
            MethodStep::Train => {
                let mut runner = self
                    .runners
                    .remove(&id)
                    .ok_or_else(|| SessionError::Internal(format!("runner for method {id} vanished")))?;
                let finalized = match runner.finalize() {
                    Ok(finalized) => finalized,
                    Err(err) => return Err(self.fail_method(id, &err)),
                };
                let positive = self.create_subset_with_aggregates(
                    NewSubset::new(
                        finalized.positive.label("positive"),
                        finalized.positive.doc_ids.clone(),
                    )
                    .with_resulted_in(id),
                )?;
                let negative = self.create_subset_with_aggregates(
                    NewSubset::new(
                        finalized.negative.label("negative"),
                        finalized.negative.doc_ids.clone(),
                    )
                    .with_resulted_in(id),
                )?;
                self.store
                    .set_method_result(id, Some(finalized.to_json(Some(positive), Some(negative))))?;
                self.store.set_method_status(id, MethodStatus::Finished)?;
                info!(method_id = %id, "active learning trained");
            }
        }

        self.persist()?;
        self.method(id)
    }

    /// Delete a method and everything it produced
    ///
    /// # Errors
    /// - `SessionError::Graph` (not found) for unknown method ids
    pub fn delete_method(&mut self, id: MethodId) -> Result<Value, SessionError> {
        self.store.method(id)?;
        let deleted = self.store.delete_method(id);
        self.forget(&deleted);
        self.persist()?;
        info!(method_id = %id, cascaded = deleted.len(), "method deleted");
        Ok(deleted_json(&deleted))
    }

    /// Drop runners of deleted methods
    fn forget(&mut self, deleted: &[GraphNode]) {
        for node in deleted {
            if let GraphNode::Method(id) = node {
                if self.runners.remove(id).is_some() {
                    info!(method_id = %id, "active learning runner dropped");
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Documents
    // ------------------------------------------------------------------

    /// One page of a subset's documents
    ///
    /// `page` is 1-based and overrides `offset`.
    ///
    /// # Errors
    /// - `SessionError::Graph` (not found) for missing or deleted subsets
    /// - `SessionError::Validation` for `page == 0`
    pub fn documents(&self, query: &DocumentQuery) -> Result<Value, SessionError> {
        let subset_id = query.subset_id.unwrap_or(SubsetId::ROOT);
        let subset = self.store.live_subset(subset_id)?;
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        let offset = match query.page {
            Some(0) => return Err(SessionError::validation("page numbers start at 1")),
            Some(page) => (page - 1).checked_mul(limit).ok_or_else(|| {
                SessionError::validation(format!("page {page} of size {limit} is out of range"))
            })?,
            None => query.offset.unwrap_or(0),
        };

        let page: Vec<DocumentId> = subset
            .has_elements
            .iter()
            .skip(offset)
            .take(limit)
            .copied()
            .collect();
        let documents: Vec<Value> = page
            .iter()
            .filter_map(|&id| self.store.document(id).ok())
            .map(|d| format::document(&self.store, d))
            .collect();
        let aggregates = if query.aggregates {
            Value::from(aggregate::compute(
                &self.store,
                &page,
                &self.schema,
                &tokenizer_for(&self.info.processing.stopwords),
            ))
        } else {
            Value::Null
        };

        Ok(json!({
            "documents": documents,
            "aggregates": aggregates,
            "metadata": {
                "totalHits": subset.has_elements.len(),
                "offset": offset,
                "limit": limit,
            },
        }))
    }

    /// One document with the live subsets containing it
    ///
    /// # Errors
    /// - `SessionError::Graph` (not found) for unknown documents
    pub fn document(&self, id: DocumentId) -> Result<Value, SessionError> {
        let document = self.store.document(id)?;
        let subsets: Vec<Value> = document
            .in_subsets
            .iter()
            .filter_map(|&s| self.store.live_subset(s).ok())
            .map(|s| format::subset(&self.store, s))
            .collect();
        Ok(json!({
            "documents": format::document(&self.store, document),
            "subsets": subsets,
        }))
    }

    /// Overwrite field values of a document
    ///
    /// Values are typed by the schema; all of them are checked before any is
    /// written. Live subsets containing the document are flagged modified.
    ///
    /// # Errors
    /// - `SessionError::Validation` for unknown fields or mistyped values
    /// - `SessionError::Graph` (not found) for unknown documents
    pub fn update_document(&mut self, update: DocumentUpdate) -> Result<Value, SessionError> {
        let id = update.document_id;
        self.store.document(id)?;
        let mut typed = Vec::with_capacity(update.document.values.len());
        for (name, value) in &update.document.values {
            let field = self
                .schema
                .iter()
                .find(|f| &f.name == name)
                .ok_or_else(|| SessionError::validation(format!("unknown field '{name}'")))?;
            typed.push((name.clone(), loader::parse_json_value(value, field)?));
        }

        let document = self.store.document_mut(id)?;
        for (name, value) in typed {
            document.values.insert(name, value);
        }
        let containing: Vec<SubsetId> = document.in_subsets.iter().copied().collect();
        for subset_id in containing {
            if let Ok(subset) = self.store.live_subset_mut(subset_id) {
                subset.modified = true;
            }
        }

        self.persist()?;
        self.document(id)
    }
}

fn deleted_json(deleted: &[GraphNode]) -> Value {
    let mut subsets = Vec::new();
    let mut methods = Vec::new();
    for node in deleted {
        match node {
            GraphNode::Subset(id) => subsets.push(*id),
            GraphNode::Method(id) => methods.push(*id),
        }
    }
    json!({ "deleted": { "subsets": subsets, "methods": methods } })
}

fn csv_escape(value: &str) -> Cow<'_, str> {
    if value.contains(|c: char| matches!(c, ',' | '"' | '\n' | '\r')) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}
