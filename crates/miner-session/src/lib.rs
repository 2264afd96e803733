//! Miner Session - one isolated, stateful analysis session per dataset
//!
//! A session worker owns exactly one dataset store and executes commands
//! against it strictly one at a time:
//! - [`loader`] reads delimited source files into typed records
//! - [`aggregate`] summarises subsets field by field
//! - [`methods`] hosts the clustering and active-learning runners
//! - [`session`] ties the store, its files and the runners together
//! - [`runtime`] maps wire commands onto a session
//! - [`worker`] hosts a runtime over stdio or an in-process thread
//!
//! The `miner-worker` binary is the stdio host spawned by the control plane.

pub mod aggregate;
pub mod error;
pub mod format;
pub mod loader;
pub mod logging;
pub mod methods;
pub mod runtime;
pub mod session;
pub mod worker;

pub use error::{SessionError, WorkerError};
pub use runtime::{Dispatch, WorkerRuntime};
pub use session::Session;
pub use worker::{run_stdio, spawn_local, LocalWorker};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
