//! Pairwise scoring head.
//!
//! ```text
//! score(u, i) = w · (mult * (z_u ⊙ z_i)) + b
//! ```
//!
//! One head exists per behavior type; each owns its own `w` and `b`.

use candle_core::{Device, Tensor, Var};
use candle_nn::{Linear, Module};
use rand::Rng;

use crate::encoder::Latents;
use crate::error::{Error, Result};
use crate::init;

/// Affine projection of the scaled Hadamard product of two latents.
pub struct PredictionHead {
    weight: Var,
    bias: Var,
    linear: Linear,
    mult: f64,
}

impl PredictionHead {
    /// Create a head for `dim`-dimensional latents.
    pub fn new<R: Rng + ?Sized>(dim: usize, mult: f64, rng: &mut R, device: &Device) -> Result<Self> {
        let weight = init::xavier_uniform(1, dim, rng, device)?;
        let bias = init::zeros(1, device)?;
        let linear = Linear::new(weight.as_tensor().clone(), Some(bias.as_tensor().clone()));
        Ok(Self {
            weight,
            bias,
            linear,
            mult,
        })
    }

    pub fn weight(&self) -> &Var {
        &self.weight
    }

    pub fn bias(&self) -> &Var {
        &self.bias
    }

    pub fn mult(&self) -> f64 {
        self.mult
    }

    /// Score row-aligned user/item latents, both `(B, d)`. Returns `(B,)`.
    pub fn forward(&self, user_lat: &Tensor, item_lat: &Tensor) -> Result<Tensor> {
        let product = (user_lat * item_lat)?.affine(self.mult, 0.0)?;
        Ok(self.linear.forward(&product)?.squeeze(1)?)
    }

    /// Score `(users[k], items[k])` pairs against one behavior's latents.
    pub fn score_pairs(&self, latents: &Latents, users: &[usize], items: &[usize]) -> Result<Tensor> {
        if users.len() != items.len() {
            return Err(Error::DimensionMismatch {
                expected: users.len(),
                got: items.len(),
            });
        }
        let device = latents.users.device();
        let uids = index_tensor(users, device)?;
        let iids = index_tensor(items, device)?;
        let u = latents.users.index_select(&uids, 0)?;
        let i = latents.items.index_select(&iids, 0)?;
        self.forward(&u, &i)
    }
}

fn index_tensor(ids: &[usize], device: &Device) -> Result<Tensor> {
    let ids: Vec<u32> = ids.iter().map(|&i| i as u32).collect();
    let n = ids.len();
    Ok(Tensor::from_vec(ids, n, device)?)
}
