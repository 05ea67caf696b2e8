//! Sampled leave-one-out ranking evaluation.
//!
//! # Protocol
//!
//! Each test user has one held-out target-behavior item. The item is ranked
//! against 99 sampled items the user never interacted with:
//!
//! 1. Score all 100 candidates with the target behavior's head and latents
//! 2. Sort by score, descending (ties keep candidate-list order)
//! 3. Take the top `K` ids
//!
//! # Metrics
//!
//! | Metric | Range | Per-user contribution |
//! |--------|-------|-----------------------|
//! | HR@K | [0, 1] | 1 if the held-out item is in the top K |
//! | NDCG@K | [0, 1] | `1 / log2(rank + 2)` with zero-based rank, 0 outside top K |
//!
//! Both are averaged over all test users of the epoch. Users are processed in
//! fixed-size batches; contributions are accumulated per user, so the batch
//! size never changes the result.

use cascade_core::{InteractionData, NegativeSampler};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::MultiBehaviorModel;

/// Aggregate hit-rate and NDCG.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HitMetrics {
    /// Fraction of users whose held-out item reached the top K.
    pub hr: f64,
    /// Mean rank-discounted gain.
    pub ndcg: f64,
    /// Number of users evaluated.
    pub num_users: usize,
}

impl HitMetrics {
    /// Average accumulated totals.
    ///
    /// With zero users both metrics are NaN: there is nothing to average.
    pub fn from_totals(hits: usize, ndcg: f64, num_users: usize) -> Self {
        if num_users == 0 {
            return Self {
                hr: f64::NAN,
                ndcg: f64::NAN,
                num_users,
            };
        }
        let n = num_users as f64;
        Self {
            hr: hits as f64 / n,
            ndcg: ndcg / n,
            num_users,
        }
    }

    /// Format as summary string.
    pub fn summary(&self) -> String {
        format!("HR = {:.4}, NDCG = {:.4} (n={})", self.hr, self.ndcg, self.num_users)
    }
}

/// Zero-based position of `held_out` among the top `k` candidates, if present.
///
/// NaN scores rank below every number, tied with `-inf`.
pub fn top_k_rank(scores: &[f32], candidates: &[usize], held_out: usize, k: usize) -> Option<usize> {
    let mut ranked: Vec<(f32, usize)> = scores
        .iter()
        .map(|&s| if s.is_nan() { f32::NEG_INFINITY } else { s })
        .zip(candidates.iter().copied())
        .collect();
    // Stable sort: equal scores keep their candidate-list order.
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0));
    ranked.iter().take(k).position(|&(_, item)| item == held_out)
}

/// HR and NDCG contribution of one ranked candidate list.
pub fn hit_and_ndcg(scores: &[f32], candidates: &[usize], held_out: usize, k: usize) -> (bool, f64) {
    match top_k_rank(scores, candidates, held_out, k) {
        Some(rank) => (true, 1.0 / ((rank + 2) as f64).log2()),
        None => (false, 0.0),
    }
}

/// HR@K / NDCG@K evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluator {
    top_k: usize,
    batch_size: usize,
}

impl Evaluator {
    /// `top_k` is K; `batch_size` is the number of users scored per pass.
    pub fn new(top_k: usize, batch_size: usize) -> Self {
        Self {
            top_k,
            batch_size: batch_size.max(1),
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Evaluate every test user of `data`.
    pub fn evaluate(
        &self,
        model: &MultiBehaviorModel,
        data: &InteractionData,
        sampler: &mut NegativeSampler,
    ) -> Result<HitMetrics> {
        let latents = model.forward()?;
        let users = data.test_users();
        let steps = users.len().div_ceil(self.batch_size);

        let mut hits = 0usize;
        let mut ndcg = 0.0f64;

        for (step, chunk) in users.chunks(self.batch_size).enumerate() {
            let mut instances = Vec::with_capacity(chunk.len());
            for &user in chunk {
                let held_out = data
                    .test_item(user)
                    .ok_or_else(|| Error::InvalidConfig(format!("test user {user} has no held-out item")))?;
                instances.push(sampler.sample_test(data.label(), user, held_out)?);
            }

            let mut user_col = Vec::new();
            let mut item_col = Vec::new();
            for inst in &instances {
                user_col.extend(inst.user_column());
                item_col.extend_from_slice(&inst.candidates);
            }
            let scores = model.score_target(&latents, &user_col, &item_col)?.to_vec1::<f32>()?;

            let mut offset = 0;
            let mut step_hits = 0;
            for inst in &instances {
                let len = inst.candidates.len();
                let (hit, gain) = hit_and_ndcg(&scores[offset..offset + len], &inst.candidates, inst.held_out, self.top_k);
                offset += len;
                if hit {
                    step_hits += 1;
                    ndcg += gain;
                }
            }
            hits += step_hits;
            tracing::debug!(step, steps, hits = step_hits, "evaluation step");
        }

        Ok(HitMetrics::from_totals(hits, ndcg, users.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates() -> Vec<usize> {
        (100..200).collect()
    }

    #[test]
    fn test_strict_best_is_full_hit() {
        let cands = candidates();
        let mut scores: Vec<f32> = (0..100).map(|v| v as f32 * 0.01).collect();
        scores[99] = 10.0;
        for k in [1, 5, 10, 100] {
            let (hit, gain) = hit_and_ndcg(&scores, &cands, 199, k);
            assert!(hit);
            assert!((gain - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_rank_k_or_worse_is_miss() {
        let cands = candidates();
        // held-out (last slot) gets the 4th best score: rank 3
        let mut scores = vec![0.0f32; 100];
        scores[0] = 5.0;
        scores[1] = 4.0;
        scores[2] = 3.0;
        scores[99] = 2.0;
        assert_eq!(top_k_rank(&scores, &cands, 199, 10), Some(3));
        assert_eq!(hit_and_ndcg(&scores, &cands, 199, 3), (false, 0.0));
        let (hit, gain) = hit_and_ndcg(&scores, &cands, 199, 4);
        assert!(hit);
        assert!((gain - 1.0 / 5f64.log2()).abs() < 1e-12);
    }

    #[test]
    fn test_ties_keep_list_order() {
        // All equal: the held-out item sits in the last slot, so it ranks last.
        let cands = vec![7, 8, 9];
        let scores = vec![1.0f32; 3];
        assert_eq!(top_k_rank(&scores, &cands, 9, 3), Some(2));
        assert_eq!(top_k_rank(&scores, &cands, 9, 2), None);
    }

    #[test]
    fn test_nan_scores_rank_last() {
        let cands = candidates();
        let mut scores: Vec<f32> = (0..100)
            .map(|v| if v % 7 == 0 { f32::NAN } else { (v * 37 % 101) as f32 * 0.01 })
            .collect();
        scores[98] = 5.0;
        assert_eq!(top_k_rank(&scores, &cands, 198, 10), Some(0));

        // A NaN held-out item never reaches the top K while finite scores remain.
        assert_eq!(top_k_rank(&scores, &cands, 100, 50), None);

        let all_nan = vec![f32::NAN; 3];
        assert_eq!(top_k_rank(&all_nan, &[4, 5, 6], 6, 3), Some(2));
    }

    #[test]
    fn test_empty_test_set_is_nan() {
        let m = HitMetrics::from_totals(0, 0.0, 0);
        assert!(m.hr.is_nan());
        assert!(m.ndcg.is_nan());
        assert_eq!(m.num_users, 0);
    }

    #[test]
    fn test_from_totals_average() {
        let m = HitMetrics::from_totals(3, 1.5, 4);
        assert!((m.hr - 0.75).abs() < 1e-12);
        assert!((m.ndcg - 0.375).abs() < 1e-12);
    }
}
