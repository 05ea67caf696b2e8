//! `cascade-nn` is the learning half of a cascading multi-behavior recommender.
//!
//! Behaviors are ordered from the weakest signal (e.g. view) to the target
//! behavior (e.g. buy). Each behavior's graph refines the latents produced for
//! the behavior before it:
//!
//! ```text
//! x_0 = [user_embed; item_embed]
//! x_t = l2norm(LightGCN_t(x_{t-1})) + x_{t-1}
//! ```
//!
//! Every behavior owns a [`PredictionHead`]. Training sums the pairwise
//! ranking loss of all behaviors; evaluation ranks with the target behavior
//! only.
//!
//! # Modules
//!
//! - [`conv`]: sparse propagation operator and LightGCN layer averaging
//! - [`encoder`]: the residual cascade over behaviors
//! - [`head`]: per-behavior scoring
//! - [`loss`]: hinge ranking loss and L2 regularization
//! - [`model`]: encoder and heads bundled with their parameters
//! - [`training`]: configuration, Adam with staircase decay, the epoch loop
//! - [`evaluation`]: sampled HR@K / NDCG@K
//! - [`checkpoint`]: safetensors parameters plus JSON history and config

pub mod checkpoint;
pub mod conv;
pub mod encoder;
pub mod error;
pub mod evaluation;
pub mod head;
pub mod init;
pub mod loss;
pub mod model;
pub mod training;

pub use checkpoint::{Checkpoint, MetricsHistory};
pub use conv::{LightGCNConv, SparseOperator};
pub use encoder::{CascadeEncoder, Latents};
pub use error::{Error, Result};
pub use evaluation::{Evaluator, HitMetrics};
pub use head::PredictionHead;
pub use loss::RankingLoss;
pub use model::{BatchLoss, MultiBehaviorModel};
pub use training::{EpochLog, EpochReport, StepLoss, Trainer, TrainingConfig};
