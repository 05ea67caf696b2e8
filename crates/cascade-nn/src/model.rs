//! The full multi-behavior recommender: cascade encoder plus one head per behavior.

use candle_core::{Device, Tensor, Var};
use cascade_core::{BehaviorGraph, TrainBatch};
use rand::Rng;

use crate::encoder::{CascadeEncoder, Latents};
use crate::error::{Error, Result};
use crate::head::PredictionHead;
use crate::loss::{regularization, RankingLoss};

/// Loss terms for one mini-batch.
#[derive(Debug, Clone)]
pub struct BatchLoss {
    /// `Σ_t L_t + reg`, the tensor to differentiate.
    pub total: Tensor,
    /// Ranking loss of each behavior type, in order.
    pub per_type: Vec<f32>,
    /// Regularization term.
    pub reg: f32,
}

impl BatchLoss {
    /// Ranking loss of the target (last) behavior.
    pub fn target(&self) -> f32 {
        self.per_type.last().copied().unwrap_or(0.0)
    }
}

/// Encoder, heads and the trainable parameter set they share.
pub struct MultiBehaviorModel {
    encoder: CascadeEncoder,
    heads: Vec<PredictionHead>,
    device: Device,
}

impl MultiBehaviorModel {
    /// Build a model over `graphs` (target behavior last).
    pub fn new<R: Rng + ?Sized>(
        graphs: &[BehaviorGraph],
        dim: usize,
        gcn_layers: &[usize],
        mult: f64,
        rng: &mut R,
        device: &Device,
    ) -> Result<Self> {
        let encoder = CascadeEncoder::new(graphs, dim, gcn_layers, rng, device)?;
        let heads = (0..graphs.len())
            .map(|_| PredictionHead::new(dim, mult, rng, device))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            encoder,
            heads,
            device: device.clone(),
        })
    }

    pub fn encoder(&self) -> &CascadeEncoder {
        &self.encoder
    }

    pub fn heads(&self) -> &[PredictionHead] {
        &self.heads
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn num_types(&self) -> usize {
        self.heads.len()
    }

    /// Every trainable parameter, keyed by a stable name.
    pub fn named_vars(&self) -> Vec<(String, Var)> {
        let mut vars = vec![
            ("user_embed".to_string(), self.encoder.user_embed().clone()),
            ("item_embed".to_string(), self.encoder.item_embed().clone()),
        ];
        for (t, head) in self.heads.iter().enumerate() {
            vars.push((format!("head.{t}.weight"), head.weight().clone()));
            vars.push((format!("head.{t}.bias"), head.bias().clone()));
        }
        vars
    }

    pub fn vars(&self) -> Vec<Var> {
        self.named_vars().into_iter().map(|(_, v)| v).collect()
    }

    /// Latent snapshots for every behavior.
    pub fn forward(&self) -> Result<Vec<Latents>> {
        self.encoder.forward()
    }

    /// Score pairs with behavior `t`'s head on behavior `t`'s latents.
    pub fn score(&self, t: usize, latents: &[Latents], users: &[usize], items: &[usize]) -> Result<Tensor> {
        let (head, lat) = self.heads.get(t).zip(latents.get(t)).ok_or(Error::DimensionMismatch {
            expected: self.heads.len(),
            got: t,
        })?;
        head.score_pairs(lat, users, items)
    }

    /// Score pairs for the target behavior.
    pub fn score_target(&self, latents: &[Latents], users: &[usize], items: &[usize]) -> Result<Tensor> {
        self.score(self.num_types() - 1, latents, users, items)
    }

    /// Full training objective for one sampled batch.
    pub fn batch_loss(&self, batch: &TrainBatch, ranking: &RankingLoss, reg_coef: f64) -> Result<BatchLoss> {
        let latents = self.forward()?;

        let mut total: Option<Tensor> = None;
        let mut per_type = Vec::with_capacity(latents.len());
        for t in 0..self.num_types() {
            let scores = self.score(t, &latents, &batch.users, &batch.items)?;
            let l = ranking.forward(&scores)?;
            per_type.push(l.to_scalar::<f32>()?);
            total = Some(match total {
                Some(acc) => (acc + l)?,
                None => l,
            });
        }

        let vars = self.vars();
        let params: Vec<&Tensor> = vars.iter().map(|v| v.as_tensor()).collect();
        let reg = regularization(&params, reg_coef)?;
        let reg_value = reg.to_scalar::<f32>()?;

        let total = match total {
            Some(acc) => (acc + reg)?,
            None => reg,
        };

        Ok(BatchLoss {
            total,
            per_type,
            reg: reg_value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::NegativeSampler;
    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;

    fn model() -> (Vec<BehaviorGraph>, MultiBehaviorModel) {
        let graphs = vec![
            BehaviorGraph::from_edges(3, 6, &[(0, 0), (0, 1), (1, 2), (2, 3), (2, 4)]).unwrap(),
            BehaviorGraph::from_edges(3, 6, &[(0, 1), (1, 2), (2, 4)]).unwrap(),
        ];
        let mut rng = XorShiftRng::seed_from_u64(5);
        let m = MultiBehaviorModel::new(&graphs, 4, &[], 10.0, &mut rng, &Device::Cpu).unwrap();
        (graphs, m)
    }

    #[test]
    fn test_named_vars() {
        let (_, m) = model();
        let names: Vec<String> = m.named_vars().into_iter().map(|(n, _)| n).collect();
        assert_eq!(
            names,
            vec![
                "user_embed",
                "item_embed",
                "head.0.weight",
                "head.0.bias",
                "head.1.weight",
                "head.1.bias"
            ]
        );
    }

    #[test]
    fn test_batch_loss_terms() {
        let (graphs, m) = model();
        let batch = NegativeSampler::new(2, 1).sample_train(&graphs[1], &[0, 1, 2]).unwrap();
        let loss = m.batch_loss(&batch, &RankingLoss::new(3), 0.01).unwrap();
        assert_eq!(loss.per_type.len(), 2);
        assert!(loss.reg > 0.0);
        let total = loss.total.to_scalar::<f32>().unwrap();
        let parts: f32 = loss.per_type.iter().sum::<f32>() + loss.reg;
        assert!((total - parts).abs() < 1e-4);
        assert_eq!(loss.target(), loss.per_type[1]);
    }

    #[test]
    fn test_every_parameter_receives_gradient() {
        let (graphs, m) = model();
        let batch = NegativeSampler::new(2, 1).sample_train(&graphs[1], &[0, 1, 2]).unwrap();
        let loss = m.batch_loss(&batch, &RankingLoss::new(3), 0.01).unwrap();
        let grads = loss.total.backward().unwrap();
        for (name, var) in m.named_vars() {
            assert!(grads.get(var.as_tensor()).is_some(), "no gradient for {name}");
        }
    }
}
