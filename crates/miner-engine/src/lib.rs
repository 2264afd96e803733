//! Miner Engine - the embedded analytics engine
//!
//! Self-contained numeric building blocks used by session method runners:
//! - [`Tokenizer`] and [`TextFeatureSpace`] turn text fields into sparse
//!   TF-IDF rows of a [`FeatureMatrix`]
//! - [`LinearSvm`] and [`ActiveLearner`] drive interactive labelling
//! - [`kmeans`] clusters dense rows
//! - [`SummaryStats`] summarises distance samples
//!
//! # Example
//!
//! ```rust
//! use miner_engine::{TextFeatureSpace, Tokenizer, RankOrder};
//!
//! let texts = ["foo bar", "bar baz", "foo foo"];
//! let space = TextFeatureSpace::fit(Tokenizer::default(), &texts).unwrap();
//! let matrix = space.extract_matrix(&texts);
//! let query = space.extract_vector("foo");
//! let best = matrix.rank_by_similarity(&query, RankOrder::Descending, 0, 1).unwrap();
//! assert_eq!(best[0].0, 2);
//! ```

pub mod classifier;
pub mod error;
pub mod features;
pub mod kmeans;
pub mod learner;
pub mod stats;
pub mod tokenize;

pub use classifier::{Classifier, LinearSvm, SvmOptions};
pub use error::EngineError;
pub use features::{FeatureMatrix, RankOrder, TextFeatureSpace};
pub use kmeans::{kmeans, Distance, KMeansModel, KMeansOptions};
pub use learner::ActiveLearner;
pub use stats::{median, SummaryStats};
pub use tokenize::Tokenizer;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
