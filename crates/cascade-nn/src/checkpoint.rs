//! Saving and restoring trained models.
//!
//! A checkpoint named `name` in `dir` is three files:
//!
//! - `name.safetensors`: every parameter, keyed by [`MultiBehaviorModel::named_vars`]
//! - `name.history.json`: [`MetricsHistory`]
//! - `name.config.json`: the [`TrainingConfig`] the model was built with

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use candle_core::Tensor;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::evaluation::HitMetrics;
use crate::model::MultiBehaviorModel;
use crate::training::{EpochReport, TrainingConfig};

/// Per-test-epoch metric series plus resume position.
///
/// The four series are appended together, once per evaluated epoch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsHistory {
    pub epochs_completed: usize,
    pub global_step: usize,
    pub train_loss: Vec<f64>,
    pub train_pre_loss: Vec<f64>,
    pub test_hr: Vec<f64>,
    pub test_ndcg: Vec<f64>,
    /// Evaluation after the last epoch.
    pub final_test: Option<HitMetrics>,
}

impl MetricsHistory {
    pub fn record(&mut self, train: &EpochReport, test: &HitMetrics) {
        self.train_loss.push(train.loss);
        self.train_pre_loss.push(train.pre_loss);
        self.test_hr.push(test.hr);
        self.test_ndcg.push(test.ndcg);
    }

    /// Best HR seen so far and the NDCG of that evaluation.
    pub fn best(&self) -> Option<(f64, f64)> {
        self.test_hr
            .iter()
            .zip(&self.test_ndcg)
            .map(|(&hr, &ndcg)| (hr, ndcg))
            .fold(None, |best, cur| match best {
                Some(b) if b.0 >= cur.0 => Some(b),
                _ => Some(cur),
            })
    }
}

/// Location of a named checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    dir: PathBuf,
    name: String,
}

impl Checkpoint {
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            name: name.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn file(&self, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}.{suffix}", self.name))
    }

    pub fn params_path(&self) -> PathBuf {
        self.file("safetensors")
    }

    pub fn history_path(&self) -> PathBuf {
        self.file("history.json")
    }

    pub fn config_path(&self) -> PathBuf {
        self.file("config.json")
    }

    /// Whether all three files are present.
    pub fn exists(&self) -> bool {
        self.params_path().is_file() && self.history_path().is_file() && self.config_path().is_file()
    }

    /// Write parameters, history and config.
    pub fn save(&self, model: &MultiBehaviorModel, config: &TrainingConfig, history: &MetricsHistory) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let tensors: HashMap<String, Tensor> = model
            .named_vars()
            .into_iter()
            .map(|(name, var)| (name, var.as_tensor().clone()))
            .collect();
        candle_core::safetensors::save(&tensors, self.params_path())?;

        serde_json::to_writer_pretty(BufWriter::new(File::create(self.history_path())?), history)?;
        serde_json::to_writer_pretty(BufWriter::new(File::create(self.config_path())?), config)?;

        tracing::info!(path = %self.params_path().display(), epoch = history.epochs_completed, "model saved");
        Ok(())
    }

    pub fn load_config(&self) -> Result<TrainingConfig> {
        Ok(serde_json::from_reader(BufReader::new(File::open(self.config_path())?))?)
    }

    pub fn load_history(&self) -> Result<MetricsHistory> {
        Ok(serde_json::from_reader(BufReader::new(File::open(self.history_path())?))?)
    }

    /// Overwrite the model's parameters in place.
    ///
    /// Every parameter must be present with the model's exact shape.
    pub fn load_params(&self, model: &MultiBehaviorModel) -> Result<()> {
        let tensors = candle_core::safetensors::load(self.params_path(), model.device())?;
        for (name, var) in model.named_vars() {
            let saved = tensors
                .get(&name)
                .ok_or_else(|| Error::Checkpoint(format!("missing parameter `{name}`")))?;
            if saved.dims() != var.as_tensor().dims() {
                return Err(Error::Checkpoint(format!(
                    "shape mismatch for `{name}`: saved {:?}, model {:?}",
                    saved.dims(),
                    var.as_tensor().dims()
                )));
            }
            var.set(saved)?;
        }
        tracing::info!(path = %self.params_path().display(), "parameters loaded");
        Ok(())
    }
}
