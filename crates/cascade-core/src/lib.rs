//! `cascade-core` holds the tensor-free half of a multi-behavior recommender.
//!
//! Users interact with items through several behavior types (view, cart,
//! buy, ...). Each behavior is a bipartite [`BehaviorGraph`]; the last one
//! is the target behavior the model learns to rank.
//!
//! # Modules
//!
//! - [`graph`]: CSR behavior graphs and the [`InteractionData`] bundle
//! - [`normalize`]: `D^{-1/2} A D^{-1/2}` propagation operators
//! - [`sampling`]: seeded positive/negative sampling for training and testing
//! - [`formats`]: CSV dataset loading
//!
//! # Example
//!
//! ```rust
//! use cascade_core::{AdjacencyNormalizer, BehaviorGraph, NegativeSampler};
//!
//! let buy = BehaviorGraph::from_edges(2, 4, &[(0, 0), (1, 2)]).unwrap();
//! let op = AdjacencyNormalizer::normalize(&buy);
//! assert!(op.is_symmetric(0.0));
//!
//! let mut sampler = NegativeSampler::new(3, 42);
//! let batch = sampler.sample_train(&buy, &[0, 1]).unwrap();
//! assert_eq!(batch.len(), 12);
//! ```

pub mod error;
pub mod formats;
pub mod graph;
pub mod normalize;
pub mod sampling;

pub use error::{Error, Result};
pub use formats::CsvDataset;
pub use graph::{BehaviorGraph, InteractionData};
pub use normalize::{AdjacencyNormalizer, NormalizedOperator, DEGREE_EPSILON};
pub use sampling::{NegativeSampler, TestInstance, TrainBatch, TEST_NEGATIVES};
