//! Miner Graph - the record store of one dataset
//!
//! Maintains documents, subsets and methods together with their provenance
//! edges:
//! - Subset ↔ document membership
//! - Method `applied_on` ↔ subset `used_by`
//! - Method `produced` ↔ subset `resulted_in`
//!
//! Deletion is soft and cascades along provenance edges (see [`cascade`]).
//! Method statuses only move forward (see [`status`]).

pub mod cascade;
pub mod entities;
pub mod error;
pub mod persist;
pub mod provenance;
pub mod status;
pub mod store;

pub use cascade::GraphNode;
pub use entities::{
    Document, FieldValue, Method, NewMethod, NewSubset, Subset, CURRENT_SCHEMA_VERSION,
    LEGACY_SCHEMA_VERSION,
};
pub use error::GraphError;
pub use persist::StoreFiles;
pub use store::{RecordStore, StoreStats};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
