//! Cascade CLI - train and evaluate multi-behavior recommenders.
//!
//! # Usage
//!
//! ```bash
//! # Train on data/{view,cart,buy,test}.csv, checkpointing as runs/tmall.*
//! cascade train --data data --behaviors view,cart,buy --save tmall --checkpoint-dir runs
//!
//! # Continue training from the checkpoint
//! cascade train --data data --behaviors view,cart,buy --load tmall --epochs 200 --save tmall
//!
//! # Evaluate a checkpoint
//! cascade evaluate --data data --behaviors view,cart,buy --load tmall
//! ```
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `info`).

use anyhow::{bail, Context, Result};
use candle_core::Device;
use cascade_core::{CsvDataset, InteractionData};
use cascade_nn::{Checkpoint, Trainer, TrainingConfig};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cascade")]
#[command(about = "Cascading multi-behavior recommender", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model, optionally resuming from a checkpoint
    Train {
        #[command(flatten)]
        data: DataArgs,

        #[command(flatten)]
        hyper: HyperArgs,

        /// Checkpoint name to save to
        #[arg(long)]
        save: Option<String>,

        /// Checkpoint name to resume from
        #[arg(long)]
        load: Option<String>,

        /// Directory holding checkpoints
        #[arg(long, default_value = "checkpoints")]
        checkpoint_dir: PathBuf,
    },

    /// Evaluate HR@K / NDCG@K of a saved checkpoint
    Evaluate {
        #[command(flatten)]
        data: DataArgs,

        /// Checkpoint name to evaluate
        #[arg(long)]
        load: String,

        /// Directory holding checkpoints
        #[arg(long, default_value = "checkpoints")]
        checkpoint_dir: PathBuf,

        /// K for HR@K and NDCG@K
        #[arg(long)]
        top_k: Option<usize>,

        /// Sampled negatives per test user
        #[arg(long)]
        test_negatives: Option<usize>,

        /// Random seed for negative sampling
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Args)]
struct DataArgs {
    /// Dataset directory with one CSV per behavior plus test.csv
    #[arg(long)]
    data: PathBuf,

    /// Behavior names in cascade order, target behavior last
    #[arg(long, value_delimiter = ',', required = true)]
    behaviors: Vec<String>,

    /// Number of users (default: 1 + max id in the data)
    #[arg(long, requires = "num_items")]
    num_users: Option<usize>,

    /// Number of items (default: 1 + max id in the data)
    #[arg(long, requires = "num_users")]
    num_items: Option<usize>,
}

/// Overrides for [`TrainingConfig`]; unset flags keep the default (or the loaded config).
#[derive(Args)]
struct HyperArgs {
    /// Embedding dimension
    #[arg(long)]
    latdim: Option<usize>,

    /// Learning rate
    #[arg(long)]
    lr: Option<f64>,

    /// Learning-rate decay factor
    #[arg(long)]
    decay: Option<f64>,

    /// Steps per learning-rate decay
    #[arg(long)]
    decay_steps: Option<usize>,

    /// Users per mini-batch
    #[arg(long)]
    batch: Option<usize>,

    /// Regularization weight
    #[arg(long)]
    reg: Option<f64>,

    /// Number of epochs
    #[arg(long)]
    epochs: Option<usize>,

    /// Score multiplier
    #[arg(long)]
    mult: Option<f64>,

    /// Positive/negative samples per user
    #[arg(long)]
    samp_num: Option<usize>,

    /// K for HR@K and NDCG@K
    #[arg(long)]
    top_k: Option<usize>,

    /// Users trained per epoch
    #[arg(long)]
    trn_num: Option<usize>,

    /// Evaluate every N epochs
    #[arg(long)]
    test_every: Option<usize>,

    /// Save every N epochs
    #[arg(long)]
    save_every: Option<usize>,

    /// LightGCN depth per behavior, comma separated
    #[arg(long, value_delimiter = ',')]
    gcn_layers: Option<Vec<usize>>,

    /// Users scored per evaluation pass
    #[arg(long)]
    eval_batch: Option<usize>,

    /// Sampled negatives per test user
    #[arg(long)]
    test_negatives: Option<usize>,

    /// Random seed
    #[arg(long)]
    seed: Option<u64>,
}

impl HyperArgs {
    fn apply(self, mut config: TrainingConfig) -> TrainingConfig {
        if let Some(v) = self.latdim {
            config.embedding_dim = v;
        }
        if let Some(v) = self.lr {
            config.learning_rate = v;
        }
        if let Some(v) = self.decay {
            config.decay = v;
        }
        if self.decay_steps.is_some() {
            config.decay_steps = self.decay_steps;
        }
        if let Some(v) = self.batch {
            config.batch_size = v;
        }
        if let Some(v) = self.reg {
            config.regularization = v;
        }
        if let Some(v) = self.epochs {
            config.epochs = v;
        }
        if let Some(v) = self.mult {
            config.mult = v;
        }
        if let Some(v) = self.samp_num {
            config.samples_per_user = v;
        }
        if let Some(v) = self.top_k {
            config.top_k = v;
        }
        if let Some(v) = self.trn_num {
            config.trn_num = v;
        }
        if let Some(v) = self.test_every {
            config.test_every = v;
        }
        if let Some(v) = self.save_every {
            config.save_every = v;
        }
        if let Some(v) = self.gcn_layers {
            config.gcn_layers = v;
        }
        if self.eval_batch.is_some() {
            config.eval_batch_size = self.eval_batch;
        }
        if let Some(v) = self.test_negatives {
            config.test_negatives = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
        config
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train {
            data,
            hyper,
            save,
            load,
            checkpoint_dir,
        } => cmd_train(&data, hyper, save, load, checkpoint_dir),
        Commands::Evaluate {
            data,
            load,
            checkpoint_dir,
            top_k,
            test_negatives,
            seed,
        } => cmd_evaluate(&data, &load, checkpoint_dir, top_k, test_negatives, seed),
    }
}

fn load_data(args: &DataArgs) -> Result<InteractionData> {
    let start = Instant::now();
    let pb = ProgressBar::new_spinner();
    pb.set_message(format!("Loading {}...", args.data.display()));

    let shape = args.num_users.zip(args.num_items);
    let data = CsvDataset::load(&args.data, &args.behaviors, shape)
        .with_context(|| format!("Failed to load dataset from {}", args.data.display()))?;

    pb.finish_with_message(format!("Loaded in {:.2?}", start.elapsed()));
    println!(
        "USER {}, ITEM {}, BEHAVIORS {}",
        data.num_users(),
        data.num_items(),
        data.behaviors().join(",")
    );
    Ok(data)
}

fn cmd_train(
    args: &DataArgs,
    hyper: HyperArgs,
    save: Option<String>,
    load: Option<String>,
    checkpoint_dir: PathBuf,
) -> Result<()> {
    let data = load_data(args)?;

    let resume_from = load.map(|name| Checkpoint::new(&checkpoint_dir, name));
    let base = match &resume_from {
        Some(ckpt) => ckpt
            .load_config()
            .with_context(|| format!("Failed to read config {}", ckpt.config_path().display()))?,
        None => TrainingConfig::default(),
    };
    let config = hyper.apply(base);
    let epochs = config.epochs;

    let mut trainer = Trainer::new(config, &data, &Device::Cpu).context("Failed to build model")?;
    if let Some(ckpt) = &resume_from {
        trainer
            .resume(ckpt)
            .with_context(|| format!("Failed to load checkpoint {}", ckpt.params_path().display()))?;
    }
    let save_to = save.map(|name| Checkpoint::new(&checkpoint_dir, name));

    let start_epoch = trainer.history().epochs_completed;
    let pb = ProgressBar::new(epochs.saturating_sub(start_epoch) as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} epochs {msg}")
            .context("Invalid progress template")?,
    );

    let start = Instant::now();
    let metrics = trainer.fit(&data, save_to.as_ref(), |log| {
        pb.suspend(|| {
            println!("{}", log.train_line());
            if let Some(line) = log.test_line() {
                println!("{line}");
            }
        });
        pb.set_message(format!("loss {:.4}", log.train.loss));
        pb.inc(1);
    })?;
    pb.finish_with_message(format!("done in {:.2?}", start.elapsed()));

    println!("Epoch {epochs}/{epochs}, Test: HR = {:.4}, NDCG = {:.4}", metrics.hr, metrics.ndcg);
    if let Some((hr, ndcg)) = trainer.history().best() {
        println!("Best: HR = {hr:.4}, NDCG = {ndcg:.4}");
    }
    if let Some(ckpt) = &save_to {
        println!("Saved {}", ckpt.params_path().display());
    }
    Ok(())
}

fn cmd_evaluate(
    args: &DataArgs,
    load: &str,
    checkpoint_dir: PathBuf,
    top_k: Option<usize>,
    test_negatives: Option<usize>,
    seed: Option<u64>,
) -> Result<()> {
    let ckpt = Checkpoint::new(checkpoint_dir, load);
    if !ckpt.exists() {
        bail!("No checkpoint named {load} in {}", ckpt.dir().display());
    }
    let data = load_data(args)?;

    let mut config = ckpt
        .load_config()
        .with_context(|| format!("Failed to read config {}", ckpt.config_path().display()))?;
    if let Some(k) = top_k {
        config.top_k = k;
    }
    if let Some(n) = test_negatives {
        config.test_negatives = n;
    }
    if let Some(s) = seed {
        config.seed = s;
    }

    let mut trainer = Trainer::new(config, &data, &Device::Cpu).context("Failed to build model")?;
    trainer
        .resume(&ckpt)
        .with_context(|| format!("Failed to load checkpoint {}", ckpt.params_path().display()))?;

    let metrics = trainer.evaluate(&data)?;
    println!(
        "Test: HR@{} = {:.4}, NDCG@{} = {:.4}, users = {}",
        trainer.config().top_k,
        metrics.hr,
        trainer.config().top_k,
        metrics.ndcg,
        metrics.num_users
    );
    Ok(())
}
