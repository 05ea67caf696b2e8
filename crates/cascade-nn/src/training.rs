//! Training loop for the cascading multi-behavior recommender.
//!
//! Each epoch:
//! 1. Shuffle all users and keep the first `trn_num` of them
//! 2. Slice them into mini-batches of `batch_size`
//! 3. For each mini-batch, sample positives/negatives, run the cascade
//!    forward pass, compute the ranking loss over every behavior plus
//!    regularization, and take one Adam step
//! 4. Every `test_every` epochs, run HR@K / NDCG@K over all test users
//!
//! Mini-batches are strictly sequential: one batch's update is applied
//! before the next batch is sampled.
//!
//! The learning rate follows a staircase exponential decay,
//! `lr * decay^floor(step / decay_steps)`, with `step` counted across epochs.
//!
//! # Example
//!
//! ```rust,ignore
//! use cascade_nn::training::{Trainer, TrainingConfig};
//!
//! let config = TrainingConfig::default()
//!     .with_embedding_dim(16)
//!     .with_epochs(30)
//!     .with_gcn_layers(vec![2, 1, 1]);
//!
//! let mut trainer = Trainer::new(config, &data, &Device::Cpu)?;
//! let metrics = trainer.fit(&data, None, |_| {})?;
//! println!("{}", metrics.summary());
//! ```

use candle_core::Device;
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use cascade_core::{InteractionData, NegativeSampler, TEST_NEGATIVES};
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;
use serde::{Deserialize, Serialize};

use crate::checkpoint::{Checkpoint, MetricsHistory};
use crate::error::{Error, Result};
use crate::evaluation::{Evaluator, HitMetrics};
use crate::loss::RankingLoss;
use crate::model::MultiBehaviorModel;

/// Training configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Embedding dimension (default: 16).
    pub embedding_dim: usize,
    /// Initial learning rate (default: 2e-4).
    pub learning_rate: f64,
    /// Learning-rate decay factor per decay period (default: 0.99).
    pub decay: f64,
    /// Steps per decay period (default: `trn_num / batch_size`).
    pub decay_steps: Option<usize>,
    /// Users per mini-batch (default: 32).
    pub batch_size: usize,
    /// Regularization weight (default: 5e-2).
    pub regularization: f64,
    /// Number of training epochs (default: 120).
    pub epochs: usize,
    /// Score multiplier applied to the latent product (default: 100).
    pub mult: f64,
    /// Positive and negative samples per user (default: 80).
    pub samples_per_user: usize,
    /// K for HR@K and NDCG@K (default: 10).
    pub top_k: usize,
    /// Users trained per epoch (default: 10000).
    pub trn_num: usize,
    /// Evaluate every this many epochs (default: 3).
    pub test_every: usize,
    /// Save history and parameters every this many epochs (default: 5).
    pub save_every: usize,
    /// LightGCN depth per behavior; missing entries default to 2.
    pub gcn_layers: Vec<usize>,
    /// Users scored per evaluation pass (default: `batch_size * samples_per_user / 100`).
    pub eval_batch_size: Option<usize>,
    /// Sampled negatives per test user (default: 99).
    pub test_negatives: usize,
    /// Random seed (default: 42).
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            embedding_dim: 16,
            learning_rate: 2e-4,
            decay: 0.99,
            decay_steps: None,
            batch_size: 32,
            regularization: 5e-2,
            epochs: 120,
            mult: 100.0,
            samples_per_user: 80,
            top_k: 10,
            trn_num: 10000,
            test_every: 3,
            save_every: 5,
            gcn_layers: Vec::new(),
            eval_batch_size: None,
            test_negatives: TEST_NEGATIVES,
            seed: 42,
        }
    }
}

impl TrainingConfig {
    pub fn with_embedding_dim(mut self, dim: usize) -> Self {
        self.embedding_dim = dim;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_decay(mut self, decay: f64, decay_steps: Option<usize>) -> Self {
        self.decay = decay;
        self.decay_steps = decay_steps;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_regularization(mut self, reg: f64) -> Self {
        self.regularization = reg;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_mult(mut self, mult: f64) -> Self {
        self.mult = mult;
        self
    }

    pub fn with_samples_per_user(mut self, n: usize) -> Self {
        self.samples_per_user = n;
        self
    }

    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = k;
        self
    }

    pub fn with_trn_num(mut self, n: usize) -> Self {
        self.trn_num = n;
        self
    }

    pub fn with_test_every(mut self, epochs: usize) -> Self {
        self.test_every = epochs;
        self
    }

    pub fn with_gcn_layers(mut self, layers: Vec<usize>) -> Self {
        self.gcn_layers = layers;
        self
    }

    pub fn with_eval_batch_size(mut self, n: usize) -> Self {
        self.eval_batch_size = Some(n);
        self
    }

    pub fn with_test_negatives(mut self, n: usize) -> Self {
        self.test_negatives = n;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Steps between learning-rate decays.
    pub fn resolved_decay_steps(&self) -> usize {
        self.decay_steps
            .unwrap_or(self.trn_num / self.batch_size.max(1))
            .max(1)
    }

    /// Users per evaluation pass.
    pub fn resolved_eval_batch_size(&self) -> usize {
        self.eval_batch_size
            .unwrap_or(self.batch_size * self.samples_per_user / 100)
            .max(1)
    }

    /// Staircase learning rate at a global step.
    pub fn learning_rate_at(&self, step: usize) -> f64 {
        let periods = (step / self.resolved_decay_steps()) as i32;
        self.learning_rate * self.decay.powi(periods)
    }

    /// Check the configuration against the number of behavior types.
    pub fn validate(&self, num_types: usize) -> Result<()> {
        let positive = [
            ("embedding_dim", self.embedding_dim),
            ("batch_size", self.batch_size),
            ("samples_per_user", self.samples_per_user),
            ("top_k", self.top_k),
            ("trn_num", self.trn_num),
            ("test_every", self.test_every),
            ("save_every", self.save_every),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(Error::InvalidConfig(format!("{name} must be positive")));
            }
        }
        if self.gcn_layers.len() > num_types {
            return Err(Error::InvalidConfig(format!(
                "{} GCN layer counts given for {} behaviors",
                self.gcn_layers.len(),
                num_types
            )));
        }
        if self.learning_rate.is_nan() || self.learning_rate <= 0.0 {
            return Err(Error::InvalidConfig("learning_rate must be positive".into()));
        }
        if self.decay.is_nan() || self.decay <= 0.0 || self.decay > 1.0 {
            return Err(Error::InvalidConfig("decay must be in (0, 1]".into()));
        }
        if self.regularization < 0.0 {
            return Err(Error::InvalidConfig("regularization must be non-negative".into()));
        }
        Ok(())
    }
}

/// Loss values of a single optimizer step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepLoss {
    /// Full objective.
    pub loss: f64,
    /// Ranking loss of the target behavior.
    pub pre_loss: f64,
    /// Regularization term.
    pub reg_loss: f64,
}

/// Per-step averages over one epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EpochReport {
    pub loss: f64,
    pub pre_loss: f64,
    pub reg_loss: f64,
    pub steps: usize,
}

/// What happened in one epoch of [`Trainer::fit`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochLog {
    pub epoch: usize,
    pub epochs: usize,
    pub train: EpochReport,
    pub test: Option<HitMetrics>,
}

impl EpochLog {
    pub fn train_line(&self) -> String {
        format!(
            "Epoch {}/{}, Train: Loss = {:.4}, preLoss = {:.4}",
            self.epoch, self.epochs, self.train.loss, self.train.pre_loss
        )
    }

    pub fn test_line(&self) -> Option<String> {
        self.test.map(|m| format!("Epoch {}/{}, Test: HR = {:.4}, NDCG = {:.4}", self.epoch, self.epochs, m.hr, m.ndcg))
    }
}

/// Sampler seeded for a run starting at `start_epoch`.
fn sampler_for(config: &TrainingConfig, start_epoch: usize) -> NegativeSampler {
    let seed = config
        .seed
        .wrapping_add(1)
        .wrapping_add((start_epoch as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    NegativeSampler::new(config.samples_per_user, seed).with_test_negatives(config.test_negatives)
}

/// Drives sampling, loss, optimizer steps and periodic evaluation.
pub struct Trainer {
    config: TrainingConfig,
    model: MultiBehaviorModel,
    optimizer: AdamW,
    sampler: NegativeSampler,
    ranking: RankingLoss,
    evaluator: Evaluator,
    global_step: usize,
    history: MetricsHistory,
}

impl Trainer {
    /// Build a model for `data` and an Adam optimizer over all its parameters.
    pub fn new(config: TrainingConfig, data: &InteractionData, device: &Device) -> Result<Self> {
        config.validate(data.num_types())?;

        let mut rng = XorShiftRng::seed_from_u64(config.seed);
        let model = MultiBehaviorModel::new(
            data.graphs(),
            config.embedding_dim,
            &config.gcn_layers,
            config.mult,
            &mut rng,
            device,
        )?;

        // Regularization lives in the loss, so Adam runs without weight decay.
        let optimizer = AdamW::new(
            model.vars(),
            ParamsAdamW {
                lr: config.learning_rate,
                weight_decay: 0.0,
                ..Default::default()
            },
        )?;

        let sampler = sampler_for(&config, 0);
        let ranking = RankingLoss::new(config.batch_size);
        let evaluator = Evaluator::new(config.top_k, config.resolved_eval_batch_size());

        tracing::info!(
            users = data.num_users(),
            items = data.num_items(),
            behaviors = data.num_types(),
            "model prepared"
        );

        Ok(Self {
            config,
            model,
            optimizer,
            sampler,
            ranking,
            evaluator,
            global_step: 0,
            history: MetricsHistory::default(),
        })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn model(&self) -> &MultiBehaviorModel {
        &self.model
    }

    pub fn history(&self) -> &MetricsHistory {
        &self.history
    }

    pub fn global_step(&self) -> usize {
        self.global_step
    }

    /// Learning rate the next step will use.
    pub fn current_learning_rate(&self) -> f64 {
        self.config.learning_rate_at(self.global_step)
    }

    /// Restore parameters and history from a checkpoint and continue from there.
    pub fn resume(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        checkpoint.load_params(&self.model)?;
        self.restore_history(checkpoint.load_history()?);
        tracing::info!(epoch = self.history.epochs_completed, step = self.global_step, "model loaded");
        Ok(())
    }

    /// Continue from `history`, with a sampler stream that does not replay earlier epochs.
    fn restore_history(&mut self, history: MetricsHistory) {
        self.sampler = sampler_for(&self.config, history.epochs_completed);
        self.global_step = history.global_step;
        self.history = history;
    }

    /// One optimizer step on a mini-batch of users.
    pub fn train_step(&mut self, data: &InteractionData, users: &[usize]) -> Result<StepLoss> {
        self.optimizer.set_learning_rate(self.current_learning_rate());

        let batch = self.sampler.sample_train(data.label(), users)?;
        let loss = self.model.batch_loss(&batch, &self.ranking, self.config.regularization)?;
        let value = loss.total.to_scalar::<f32>()?;
        self.optimizer.backward_step(&loss.total)?;
        self.global_step += 1;

        Ok(StepLoss {
            loss: value as f64,
            pre_loss: loss.target() as f64,
            reg_loss: loss.reg as f64,
        })
    }

    /// One pass over a random subset of `trn_num` users.
    pub fn train_epoch(&mut self, data: &InteractionData) -> Result<EpochReport> {
        let users = self.sampler.permutation(data.num_users(), self.config.trn_num);
        let steps = users.len().div_ceil(self.config.batch_size);

        let mut report = EpochReport {
            steps,
            ..Default::default()
        };
        for (i, batch) in users.chunks(self.config.batch_size).enumerate() {
            let step = self.train_step(data, batch)?;
            report.loss += step.loss;
            report.pre_loss += step.pre_loss;
            report.reg_loss += step.reg_loss;
            tracing::debug!(step = i, steps, loss = step.loss, reg_loss = step.reg_loss, "train step");
        }

        if steps > 0 {
            let n = steps as f64;
            report.loss /= n;
            report.pre_loss /= n;
            report.reg_loss /= n;
        }
        Ok(report)
    }

    /// HR@K / NDCG@K over every test user.
    pub fn evaluate(&mut self, data: &InteractionData) -> Result<HitMetrics> {
        let metrics = self.evaluator.evaluate(&self.model, data, &mut self.sampler)?;
        if metrics.num_users == 0 {
            tracing::warn!("no test users; HR and NDCG are undefined");
        }
        Ok(metrics)
    }

    /// Train for the configured number of epochs, then evaluate once more.
    ///
    /// Starts from the epoch recorded in the history (zero unless resumed).
    /// `checkpoint`, when given, receives parameters and history every
    /// `save_every` epochs and at the end. `on_epoch` sees every epoch.
    pub fn fit<F>(&mut self, data: &InteractionData, checkpoint: Option<&Checkpoint>, mut on_epoch: F) -> Result<HitMetrics>
    where
        F: FnMut(&EpochLog),
    {
        let epochs = self.config.epochs;
        for epoch in self.history.epochs_completed..epochs {
            let train = self.train_epoch(data)?;
            let test = if epoch % self.config.test_every == 0 {
                let metrics = self.evaluate(data)?;
                if metrics.num_users > 0 {
                    self.history.record(&train, &metrics);
                }
                Some(metrics)
            } else {
                None
            };
            self.history.epochs_completed = epoch + 1;
            self.history.global_step = self.global_step;

            let log = EpochLog {
                epoch,
                epochs,
                train,
                test,
            };
            tracing::info!("{}", log.train_line());
            if let Some(line) = log.test_line() {
                tracing::info!("{line}");
            }

            if epoch % self.config.save_every == 0 {
                if let Some(ckpt) = checkpoint {
                    ckpt.save(&self.model, &self.config, &self.history)?;
                }
            }
            on_epoch(&log);
        }

        let metrics = self.evaluate(data)?;
        tracing::info!("Epoch {epochs}/{epochs}, Test: HR = {:.4}, NDCG = {:.4}", metrics.hr, metrics.ndcg);
        if metrics.num_users > 0 {
            self.history.final_test = Some(metrics);
        }
        if epochs > 0 {
            if let Some(ckpt) = checkpoint {
                ckpt.save(&self.model, &self.config, &self.history)?;
            }
        }
        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::BehaviorGraph;

    #[test]
    fn test_training_config_builder() {
        let config = TrainingConfig::default()
            .with_embedding_dim(64)
            .with_learning_rate(0.01)
            .with_epochs(50)
            .with_gcn_layers(vec![2, 1, 1]);

        assert_eq!(config.embedding_dim, 64);
        assert!((config.learning_rate - 0.01).abs() < 1e-12);
        assert_eq!(config.epochs, 50);
        assert_eq!(config.gcn_layers, vec![2, 1, 1]);
    }

    #[test]
    fn test_derived_defaults() {
        let config = TrainingConfig::default();
        assert_eq!(config.resolved_decay_steps(), 10000 / 32);
        assert_eq!(config.resolved_eval_batch_size(), 32 * 80 / 100);
        let tiny = TrainingConfig::default().with_batch_size(1).with_samples_per_user(2);
        assert_eq!(tiny.resolved_eval_batch_size(), 1);
        assert_eq!(tiny.clone().with_eval_batch_size(7).resolved_eval_batch_size(), 7);
    }

    #[test]
    fn test_staircase_schedule() {
        let config = TrainingConfig::default()
            .with_learning_rate(1.0)
            .with_decay(0.5, Some(10));
        assert_eq!(config.learning_rate_at(0), 1.0);
        assert_eq!(config.learning_rate_at(9), 1.0);
        assert_eq!(config.learning_rate_at(10), 0.5);
        assert_eq!(config.learning_rate_at(25), 0.25);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(TrainingConfig::default().validate(3).is_ok());
        assert!(TrainingConfig::default().with_batch_size(0).validate(3).is_err());
        assert!(TrainingConfig::default().with_top_k(0).validate(3).is_err());
        assert!(TrainingConfig::default()
            .with_gcn_layers(vec![1, 1, 1, 1])
            .validate(3)
            .is_err());
        assert!(TrainingConfig::default().with_decay(1.5, None).validate(1).is_err());
        assert!(TrainingConfig::default().with_learning_rate(f64::NAN).validate(1).is_err());
    }

    #[test]
    fn test_config_json_defaults_missing_fields() {
        let config: TrainingConfig = serde_json::from_str(r#"{"embedding_dim": 8}"#).unwrap();
        assert_eq!(config.embedding_dim, 8);
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.test_negatives, TEST_NEGATIVES);
    }

    fn data() -> InteractionData {
        let view = BehaviorGraph::from_edges(4, 8, &[(0, 0), (0, 1), (1, 2), (2, 3), (3, 4), (3, 5)]).unwrap();
        let buy = BehaviorGraph::from_edges(4, 8, &[(0, 1), (1, 2), (2, 3), (3, 5)]).unwrap();
        InteractionData::new(vec!["view".into(), "buy".into()], vec![view, buy], &[(0, 6), (2, 7)]).unwrap()
    }

    fn small_config() -> TrainingConfig {
        TrainingConfig::default()
            .with_embedding_dim(4)
            .with_batch_size(2)
            .with_samples_per_user(3)
            .with_trn_num(4)
            .with_test_negatives(3)
            .with_top_k(2)
            .with_mult(1.0)
            .with_epochs(2)
            .with_learning_rate(0.01)
    }

    #[test]
    fn test_train_epoch_steps_and_global_step() {
        let mut trainer = Trainer::new(small_config(), &data(), &Device::Cpu).unwrap();
        let report = trainer.train_epoch(&data()).unwrap();
        assert_eq!(report.steps, 2);
        assert_eq!(trainer.global_step(), 2);
        assert!(report.loss.is_finite());
        assert!(report.reg_loss > 0.0);
    }

    #[test]
    fn test_restored_history_moves_sampler_stream() {
        let data = data();
        let mut fresh = Trainer::new(small_config(), &data, &Device::Cpu).unwrap();
        let mut restored = Trainer::new(small_config(), &data, &Device::Cpu).unwrap();
        restored.restore_history(MetricsHistory {
            epochs_completed: 2,
            global_step: 4,
            ..Default::default()
        });

        assert_eq!(restored.global_step(), 4);
        assert_eq!(restored.history().epochs_completed, 2);
        assert_ne!(
            fresh.sampler.permutation(64, 64),
            restored.sampler.permutation(64, 64)
        );

        // Restoring epoch zero reproduces the fresh stream.
        let mut again = Trainer::new(small_config(), &data, &Device::Cpu).unwrap();
        again.restore_history(MetricsHistory::default());
        let mut fresh = Trainer::new(small_config(), &data, &Device::Cpu).unwrap();
        assert_eq!(fresh.sampler.permutation(64, 64), again.sampler.permutation(64, 64));
    }

    #[test]
    fn test_fit_records_test_epochs() {
        let data = data();
        let mut trainer = Trainer::new(small_config().with_epochs(4), &data, &Device::Cpu).unwrap();
        let mut seen = Vec::new();
        let metrics = trainer.fit(&data, None, |log| seen.push((log.epoch, log.test.is_some()))).unwrap();

        assert_eq!(seen, vec![(0, true), (1, false), (2, false), (3, true)]);
        let h = trainer.history();
        assert_eq!(h.epochs_completed, 4);
        assert_eq!(h.train_loss.len(), 2);
        assert_eq!(h.test_hr.len(), 2);
        assert_eq!(h.final_test, Some(metrics));
        assert!((0.0..=1.0).contains(&metrics.hr));
        assert!((0.0..=1.0).contains(&metrics.ndcg));
    }
}
