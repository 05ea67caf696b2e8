//! Cascading residual encoder over all behavior graphs.
//!
//! Behaviors are visited in declared order (target last). Each step runs
//! LightGCN over that behavior's operator, L2-normalizes the rows, and adds
//! the result onto a running embedding:
//!
//! ```text
//! total_0     = [U_embed; I_embed]
//! total_{t+1} = rownorm(LightGCN_t(total_t)) + total_t
//! ```
//!
//! `total_{t+1}` is the latent snapshot for behavior `t`, so later behaviors
//! see every earlier behavior's residual.

use candle_core::{Device, Tensor, Var};
use cascade_core::{AdjacencyNormalizer, BehaviorGraph};
use rand::Rng;

use crate::conv::{LightGCNConv, SparseOperator};
use crate::error::{Error, Result};
use crate::init;

/// Epsilon used twice in row normalization: `x / (eps + sqrt(eps + Σx²))`.
pub const NORM_EPSILON: f64 = 1e-6;

/// Propagation depth for behaviors without an explicit layer count.
pub const DEFAULT_GCN_LAYERS: usize = 2;

/// User and item latents for one behavior type.
#[derive(Debug, Clone)]
pub struct Latents {
    /// `(num_users, d)`
    pub users: Tensor,
    /// `(num_items, d)`
    pub items: Tensor,
}

/// Row-wise L2 normalization, `x / (eps + sqrt(eps + Σx²))`.
pub fn l2_normalize_rows(x: &Tensor) -> Result<Tensor> {
    let sq = x.sqr()?.sum_keepdim(1)?;
    let denom = ((sq + NORM_EPSILON)?.sqrt()? + NORM_EPSILON)?;
    Ok(x.broadcast_div(&denom)?)
}

/// Owns the embedding tables and the per-behavior operators.
pub struct CascadeEncoder {
    num_users: usize,
    num_items: usize,
    dim: usize,
    user_embed: Var,
    item_embed: Var,
    operators: Vec<SparseOperator>,
    convs: Vec<LightGCNConv>,
}

impl CascadeEncoder {
    /// Build the encoder, normalizing every graph once.
    ///
    /// `gcn_layers[t]` is the propagation depth for behavior `t`; missing
    /// entries use [`DEFAULT_GCN_LAYERS`].
    pub fn new<R: Rng + ?Sized>(
        graphs: &[BehaviorGraph],
        dim: usize,
        gcn_layers: &[usize],
        rng: &mut R,
        device: &Device,
    ) -> Result<Self> {
        if graphs.is_empty() {
            return Err(Error::InvalidConfig("no behavior graphs".into()));
        }
        if dim == 0 {
            return Err(Error::InvalidConfig("embedding dimension must be positive".into()));
        }
        if gcn_layers.len() > graphs.len() {
            return Err(Error::InvalidConfig(format!(
                "{} GCN layer counts given for {} behaviors",
                gcn_layers.len(),
                graphs.len()
            )));
        }

        let num_users = graphs[0].num_users();
        let num_items = graphs[0].num_items();

        let operators = AdjacencyNormalizer::normalize_all(graphs)
            .iter()
            .map(|op| SparseOperator::from_normalized(op, device))
            .collect::<Result<Vec<_>>>()?;
        let convs = (0..graphs.len())
            .map(|t| LightGCNConv::new(gcn_layers.get(t).copied().unwrap_or(DEFAULT_GCN_LAYERS)))
            .collect();

        let user_embed = init::xavier_uniform(num_users, dim, rng, device)?;
        let item_embed = init::xavier_uniform(num_items, dim, rng, device)?;

        tracing::debug!(num_users, num_items, dim, behaviors = graphs.len(), "built cascade encoder");

        Ok(Self {
            num_users,
            num_items,
            dim,
            user_embed,
            item_embed,
            operators,
            convs,
        })
    }

    pub fn num_users(&self) -> usize {
        self.num_users
    }

    pub fn num_items(&self) -> usize {
        self.num_items
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn num_types(&self) -> usize {
        self.convs.len()
    }

    /// Propagation depth per behavior.
    pub fn layer_counts(&self) -> Vec<usize> {
        self.convs.iter().map(LightGCNConv::num_layers).collect()
    }

    pub fn user_embed(&self) -> &Var {
        &self.user_embed
    }

    pub fn item_embed(&self) -> &Var {
        &self.item_embed
    }

    /// Run the cascade and return one latent snapshot per behavior.
    pub fn forward(&self) -> Result<Vec<Latents>> {
        let mut total = Tensor::cat(&[self.user_embed.as_tensor(), self.item_embed.as_tensor()], 0)?;
        let mut snapshots = Vec::with_capacity(self.convs.len());

        for (conv, op) in self.convs.iter().zip(&self.operators) {
            let propagated = conv.forward(&total, op)?;
            let normalized = l2_normalize_rows(&propagated)?;
            total = (normalized + &total)?;
            snapshots.push(Latents {
                users: total.narrow(0, 0, self.num_users)?,
                items: total.narrow(0, self.num_users, self.num_items)?,
            });
        }

        Ok(snapshots)
    }
}
