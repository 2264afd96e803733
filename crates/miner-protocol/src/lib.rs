//! Miner Protocol - the RPC contract between the control plane and session workers
//!
//! Defines:
//! - Request/response envelopes with request-id correlation
//! - The worker command set and typed content payloads
//! - Shared identifiers and enumerations
//! - The JSON-lines wire codec
//!
//! # Example
//!
//! ```rust
//! use miner_protocol::{Command, RequestEnvelope, codec};
//!
//! let line = codec::encode_line(&RequestEnvelope::new(1, Command::Init)).unwrap();
//! assert_eq!(line, "{\"requestId\":1,\"body\":{\"cmd\":\"INIT\"}}\n");
//! ```

pub mod codec;
pub mod command;
pub mod envelope;
pub mod types;

pub use codec::CodecError;
pub use command::{
    Command, DatasetBootstrap, DatasetInfo, DatasetUpdate, DocumentChanges, DocumentQuery,
    DocumentRef, DocumentUpdate, FileInfo, MethodCreate, MethodRef, MethodStep,
    MethodStepRequest, MethodUpdate, NewMethod, SubsetChanges, SubsetRef, SubsetUpdate,
};
pub use envelope::{RemoteError, RequestEnvelope, ResponseEnvelope};
pub use types::{
    AggregateType, DocumentId, ErrorKind, FieldDescriptor, FieldType, MethodId, MethodStatus,
    MethodType, Processing, SessionId, Stopwords, SubsetId,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
