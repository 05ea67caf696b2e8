//! Margin ranking loss and parameter regularization.
//!
//! For a scored batch laid out positives-first, negatives-second:
//!
//! ```text
//! L_t = Σ_k max(0, 1 - (s_pos[k] - s_neg[k])) / B
//! L   = Σ_t L_t + λ Σ_p ||p||²
//! ```

use candle_core::Tensor;

use crate::error::{Error, Result};

/// Hinge margin between paired positive and negative scores.
pub const MARGIN: f64 = 1.0;

/// Pairwise hinge loss normalized by a fixed batch size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankingLoss {
    batch_size: usize,
}

impl RankingLoss {
    pub fn new(batch_size: usize) -> Self {
        Self { batch_size }
    }

    /// Loss over explicitly paired scores, both `(P,)`.
    pub fn pairwise(&self, pos: &Tensor, neg: &Tensor) -> Result<Tensor> {
        let hinge = (neg - pos)?.affine(1.0, MARGIN)?.relu()?;
        Ok(hinge.sum_all()?.affine(1.0 / self.batch_size.max(1) as f64, 0.0)?)
    }

    /// Loss over a `(2P,)` score vector whose halves are positives and negatives.
    pub fn forward(&self, scores: &Tensor) -> Result<Tensor> {
        let n = scores.dims1()?;
        if n % 2 != 0 {
            return Err(Error::DimensionMismatch {
                expected: n + 1,
                got: n,
            });
        }
        let half = n / 2;
        self.pairwise(&scores.narrow(0, 0, half)?, &scores.narrow(0, half, half)?)
    }
}

/// `coef * Σ ||p||²` over the given parameters.
pub fn regularization(params: &[&Tensor], coef: f64) -> Result<Tensor> {
    let mut total: Option<Tensor> = None;
    for p in params {
        let sq = p.sqr()?.sum_all()?;
        total = Some(match total {
            Some(t) => (t + sq)?,
            None => sq,
        });
    }
    match total {
        Some(t) => Ok(t.affine(coef, 0.0)?),
        None => Err(Error::InvalidConfig("no parameters to regularize".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn scores(v: &[f32]) -> Tensor {
        Tensor::new(v, &Device::Cpu).unwrap()
    }

    fn scalar(t: &Tensor) -> f32 {
        t.to_scalar::<f32>().unwrap()
    }

    #[test]
    fn test_zero_when_margin_met() {
        let loss = RankingLoss::new(2);
        // pos - neg >= 1 everywhere
        let l = loss.forward(&scores(&[3.0, 2.5, 1.0, 1.5])).unwrap();
        assert_eq!(scalar(&l), 0.0);
    }

    #[test]
    fn test_positive_when_margin_violated() {
        let loss = RankingLoss::new(2);
        // second pair: 2.0 - 1.5 = 0.5 -> hinge 0.5, divided by batch 2
        let l = loss.forward(&scores(&[3.0, 2.0, 1.0, 1.5])).unwrap();
        assert!((scalar(&l) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_inverted_pair() {
        let loss = RankingLoss::new(1);
        let l = loss.pairwise(&scores(&[0.0]), &scores(&[2.0])).unwrap();
        assert!((scalar(&l) - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_odd_length_rejected() {
        assert!(RankingLoss::new(1).forward(&scores(&[1.0, 2.0, 3.0])).is_err());
    }

    #[test]
    fn test_regularization_sum_of_squares() {
        let a = Tensor::new(&[[1f32, 2.0], [0.0, 1.0]], &Device::Cpu).unwrap();
        let b = Tensor::new(&[3f32], &Device::Cpu).unwrap();
        let r = regularization(&[&a, &b], 0.5).unwrap();
        assert!((scalar(&r) - 7.5).abs() < 1e-6);
        assert!(regularization(&[], 0.5).is_err());
    }
}
