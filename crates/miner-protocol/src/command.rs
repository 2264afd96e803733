//! Worker command set and content payloads

use crate::types::{DocumentId, FieldDescriptor, MethodId, MethodType, Processing, SessionId, SubsetId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Command sent to a session worker
///
/// Serialized as `{"cmd": "NAME", "content": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "content", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    /// Liveness handshake
    Init,
    /// Persist, close the store and exit
    Shutdown,
    /// Load a delimited file into a fresh store
    CreateDataset(DatasetBootstrap),
    /// Reattach to an existing store
    OpenDataset(DatasetBootstrap),
    /// Dataset metadata with live subsets and methods
    GetDataset,
    /// Rename or redescribe the dataset
    UpdateDataset(DatasetUpdate),
    /// All live subsets
    GetSubsets,
    /// One subset with the methods touching it
    GetSubset(SubsetRef),
    /// Relabel or redescribe a subset
    UpdateSubset(SubsetUpdate),
    /// Cascading soft delete of a subset
    DeleteSubset(SubsetRef),
    /// Export a subset as a delimited file
    DownloadSubset(SubsetRef),
    /// All live methods
    GetMethods,
    /// One method with its input and output subsets
    GetMethod(MethodRef),
    /// Create and start a method
    CreateMethod(MethodCreate),
    /// Advance an interactive method
    UpdateMethod(MethodUpdate),
    /// Cascading soft delete of a method
    DeleteMethod(MethodRef),
    /// Paged documents of a subset
    GetDocuments(DocumentQuery),
    /// One document with the subsets containing it
    GetDocument(DocumentRef),
    /// Change field values of one document
    UpdateDocument(DocumentUpdate),
}

impl Command {
    /// Wire name of the command
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Shutdown => "SHUTDOWN",
            Self::CreateDataset(_) => "CREATE_DATASET",
            Self::OpenDataset(_) => "OPEN_DATASET",
            Self::GetDataset => "GET_DATASET",
            Self::UpdateDataset(_) => "UPDATE_DATASET",
            Self::GetSubsets => "GET_SUBSETS",
            Self::GetSubset(_) => "GET_SUBSET",
            Self::UpdateSubset(_) => "UPDATE_SUBSET",
            Self::DeleteSubset(_) => "DELETE_SUBSET",
            Self::DownloadSubset(_) => "DOWNLOAD_SUBSET",
            Self::GetMethods => "GET_METHODS",
            Self::GetMethod(_) => "GET_METHOD",
            Self::CreateMethod(_) => "CREATE_METHOD",
            Self::UpdateMethod(_) => "UPDATE_METHOD",
            Self::DeleteMethod(_) => "DELETE_METHOD",
            Self::GetDocuments(_) => "GET_DOCUMENTS",
            Self::GetDocument(_) => "GET_DOCUMENT",
            Self::UpdateDocument(_) => "UPDATE_DOCUMENT",
        }
    }

    /// Whether the command attaches a dataset to the worker
    #[inline]
    #[must_use]
    pub fn is_bootstrap(&self) -> bool {
        matches!(self, Self::CreateDataset(_) | Self::OpenDataset(_))
    }
}

/// Dataset creation / reopen payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetBootstrap {
    /// Dataset metadata
    pub dataset: DatasetInfo,
    /// Source file description
    pub file: FileInfo,
}

/// Dataset metadata owned by the outer metadata store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetInfo {
    /// Dataset identifier
    pub id: SessionId,
    /// Display name
    pub name: String,
    /// Optional description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Creation timestamp (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    /// Directory holding the dataset store
    pub dbpath: PathBuf,
    /// Dataset-level text processing defaults
    #[serde(default)]
    pub processing: Processing,
}

/// Delimited source file description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    /// Source file (unused when reopening)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filepath: Option<PathBuf>,
    /// Column delimiter
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    /// Column descriptors in file order
    pub fields: Vec<FieldDescriptor>,
}

fn default_delimiter() -> String {
    ",".to_string()
}

/// Dataset metadata changes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetUpdate {
    /// New name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Reference to a subset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubsetRef {
    /// Subset identifier
    pub subset_id: SubsetId,
}

/// Subset label/description change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubsetUpdate {
    /// Subset identifier
    pub subset_id: SubsetId,
    /// Changed attributes
    pub subset: SubsetChanges,
}

/// Changeable subset attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubsetChanges {
    /// New label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// New description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Reference to a method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodRef {
    /// Method identifier
    pub method_id: MethodId,
}

/// Method creation payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCreate {
    /// Method description
    pub method: NewMethod,
}

/// Method type and parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMethod {
    /// Method kind
    #[serde(rename = "type")]
    pub method_type: MethodType,
    /// Method-specific parameters (`subsetId`, `fields`, `processing`, `method`)
    pub parameters: Value,
}

/// Method advancement payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodUpdate {
    /// Method identifier
    pub method_id: MethodId,
    /// Step and its parameters
    pub method: MethodStepRequest,
}

/// Step requested of an interactive method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodStepRequest {
    /// Which step to run
    pub step: MethodStep,
    /// Step parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// Interactive method steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodStep {
    /// Record a label and fetch the next candidate
    Update,
    /// Finalize the model and materialize output subsets
    Train,
}

/// Paged document listing request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentQuery {
    /// Subset to list (root when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subset_id: Option<SubsetId>,
    /// Number of documents to skip
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    /// Page size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// 1-based page number, overrides `offset`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
    /// Also compute aggregates over the page
    #[serde(default)]
    pub aggregates: bool,
}

/// Reference to a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRef {
    /// Document identifier
    pub document_id: DocumentId,
}

/// Document change payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUpdate {
    /// Document identifier
    pub document_id: DocumentId,
    /// Changed values
    pub document: DocumentChanges,
}

/// New field values keyed by field name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentChanges {
    /// Raw values, typed by the dataset schema
    #[serde(default)]
    pub values: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn unit_commands_serialize_without_content() {
        assert_eq!(serde_json::to_value(Command::Init).unwrap(), json!({"cmd": "INIT"}));
        let parsed: Command = serde_json::from_value(json!({"cmd": "GET_SUBSETS"})).unwrap();
        assert_eq!(parsed, Command::GetSubsets);
    }

    #[test]
    fn content_commands_use_camel_case_keys() {
        let cmd = Command::DeleteSubset(SubsetRef {
            subset_id: SubsetId(4),
        });
        assert_eq!(
            serde_json::to_value(&cmd).unwrap(),
            json!({"cmd": "DELETE_SUBSET", "content": {"subsetId": 4}})
        );
    }

    #[test]
    fn method_update_parses_step() {
        let parsed: Command = serde_json::from_value(json!({
            "cmd": "UPDATE_METHOD",
            "content": {
                "methodId": 3,
                "method": {"step": "train"}
            }
        }))
        .unwrap();
        match parsed {
            Command::UpdateMethod(update) => {
                assert_eq!(update.method_id, MethodId(3));
                assert_eq!(update.method.step, MethodStep::Train);
                assert!(update.method.parameters.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn unknown_command_is_rejected() {
        let parsed = serde_json::from_value::<Command>(json!({"cmd": "EXPLODE"}));
        assert!(parsed.is_err());
    }

    #[test]
    fn bootstrap_defaults() {
        let parsed: DatasetBootstrap = serde_json::from_value(json!({
            "dataset": {"id": 1, "name": "news", "dbpath": "/tmp/news"},
            "file": {"fields": [{"name": "title", "type": "text"}]}
        }))
        .unwrap();
        assert_eq!(parsed.file.delimiter, ",");
        assert_eq!(parsed.dataset.processing.stopwords.language, "none");
        assert!(Command::OpenDataset(parsed).is_bootstrap());
    }
}
