//! Miner Pool - the control plane of dataset sessions
//!
//! Every dataset runs in its own worker so that a crash or a resource spike
//! in one session cannot affect another. The pool:
//! - Spawns workers through a [`WorkerSpawner`] (OS process or thread)
//! - Correlates requests and responses by a pool-wide request id
//! - Extends or expires stale requests on a periodic sweep
//! - Shuts down sessions that have been idle for too long
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use miner_pool::{PoolConfig, ProcessSpawner, SessionPool};
//! use miner_protocol::{Command, SessionId};
//!
//! # async fn run() -> Result<(), miner_pool::PoolError> {
//! let config = PoolConfig::default();
//! let spawner = Arc::new(ProcessSpawner::new(&config.worker_path));
//! let pool = SessionPool::start(config, spawner)?;
//!
//! pool.create_session(SessionId(1)).await?;
//! let hello = pool.send(SessionId(1), Command::Init).await?;
//! assert_eq!(hello["initialized"], true);
//!
//! pool.close_all().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod pending;
pub mod pool;
pub mod transport;

pub use config::{PoolConfig, TimeoutPolicy};
pub use error::PoolError;
pub use pending::{PendingTable, SweepOutcome};
pub use pool::{PoolStats, SessionPool};
pub use transport::{LocalSpawner, ProcessSpawner, WorkerChannel, WorkerSpawner};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
