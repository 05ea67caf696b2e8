//! Positive/negative item sampling for training and evaluation.
//!
//! # Key Types
//!
//! - [`NegativeSampler`] - seeded sampler shared by the training loop and the evaluator
//! - [`TrainBatch`] - positives-first, negatives-second item layout for one mini-batch
//! - [`TestInstance`] - sampled candidate list for one held-out item

use crate::error::{Error, Result};
use crate::graph::BehaviorGraph;
use rand::prelude::*;
use rand_xorshift::XorShiftRng;

/// Sampled negatives per test user in the standard protocol.
pub const TEST_NEGATIVES: usize = 99;

/// One mini-batch of (user, item) pairs.
///
/// `users[k]` and `items[k]` form a pair. The first half of the arrays holds
/// positives, the second half negatives, and offset `k` and `k + half()` always
/// refer to the same user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainBatch {
    pub users: Vec<usize>,
    pub items: Vec<usize>,
}

impl TrainBatch {
    /// Number of positive (equivalently, negative) pairs.
    pub fn half(&self) -> usize {
        self.items.len() / 2
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Candidate list for ranking one held-out item.
///
/// The held-out item always occupies the final slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestInstance {
    pub user: usize,
    pub held_out: usize,
    pub candidates: Vec<usize>,
}

impl TestInstance {
    /// User id repeated once per candidate, for batched scoring.
    pub fn user_column(&self) -> Vec<usize> {
        vec![self.user; self.candidates.len()]
    }
}

/// Seeded sampler over a target-behavior label matrix.
#[derive(Debug, Clone)]
pub struct NegativeSampler {
    rng: XorShiftRng,
    samples_per_user: usize,
    test_negatives: usize,
}

impl NegativeSampler {
    /// Create a sampler drawing `samples_per_user` positives and negatives per user.
    pub fn new(samples_per_user: usize, seed: u64) -> Self {
        Self {
            rng: XorShiftRng::seed_from_u64(seed),
            samples_per_user,
            test_negatives: TEST_NEGATIVES,
        }
    }

    /// Override the number of sampled negatives per test user.
    pub fn with_test_negatives(mut self, n: usize) -> Self {
        self.test_negatives = n;
        self
    }

    pub fn samples_per_user(&self) -> usize {
        self.samples_per_user
    }

    pub fn test_negatives(&self) -> usize {
        self.test_negatives
    }

    /// Draw a training batch for `users`.
    ///
    /// Positives are drawn uniformly (with replacement) from each user's
    /// label row. Negatives come from a fresh permutation of all items: the
    /// first `samples_per_user` non-positive items in that permutation form
    /// the user's pool, and negatives are drawn uniformly from it.
    pub fn sample_train(&mut self, label: &BehaviorGraph, users: &[usize]) -> Result<TrainBatch> {
        let samp = self.samples_per_user;
        let half = users.len() * samp;
        let mut out_users = vec![0; 2 * half];
        let mut out_items = vec![0; 2 * half];

        let mut permutation: Vec<usize> = (0..label.num_items()).collect();
        permutation.shuffle(&mut self.rng);

        let mut cur = 0;
        for &user in users {
            if user >= label.num_users() {
                return Err(Error::IndexOutOfRange {
                    kind: "user",
                    index: user,
                    bound: label.num_users(),
                });
            }
            let positives = label.items_of(user);
            if positives.is_empty() {
                return Err(Error::InsufficientCandidates {
                    user,
                    kind: "positive",
                    needed: 1,
                    available: 0,
                });
            }

            let pool: Vec<usize> = permutation
                .iter()
                .copied()
                .filter(|&i| !label.contains(user, i))
                .take(samp)
                .collect();
            if pool.is_empty() {
                return Err(Error::InsufficientCandidates {
                    user,
                    kind: "negative",
                    needed: 1,
                    available: 0,
                });
            }

            for _ in 0..samp {
                let pos = positives[self.rng.random_range(0..positives.len())];
                let neg = pool[self.rng.random_range(0..pool.len())];
                out_users[cur] = user;
                out_users[cur + half] = user;
                out_items[cur] = pos;
                out_items[cur + half] = neg;
                cur += 1;
            }
        }

        Ok(TrainBatch {
            users: out_users,
            items: out_items,
        })
    }

    /// Build the candidate list for one test user.
    ///
    /// Negatives are distinct items with no target interaction, excluding the
    /// held-out item itself.
    pub fn sample_test(&mut self, label: &BehaviorGraph, user: usize, held_out: usize) -> Result<TestInstance> {
        if user >= label.num_users() {
            return Err(Error::IndexOutOfRange {
                kind: "user",
                index: user,
                bound: label.num_users(),
            });
        }
        let mut pool: Vec<usize> = (0..label.num_items())
            .filter(|&i| i != held_out && !label.contains(user, i))
            .collect();
        if pool.len() < self.test_negatives {
            return Err(Error::InsufficientCandidates {
                user,
                kind: "test negative",
                needed: self.test_negatives,
                available: pool.len(),
            });
        }

        pool.shuffle(&mut self.rng);
        pool.truncate(self.test_negatives);
        pool.push(held_out);

        Ok(TestInstance {
            user,
            held_out,
            candidates: pool,
        })
    }

    /// Shuffle `0..n` and keep at most `take` entries.
    pub fn permutation(&mut self, n: usize, take: usize) -> Vec<usize> {
        let mut ids: Vec<usize> = (0..n).collect();
        ids.shuffle(&mut self.rng);
        ids.truncate(take);
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label() -> BehaviorGraph {
        BehaviorGraph::from_edges(3, 8, &[(0, 0), (0, 1), (1, 2), (2, 3), (2, 4), (2, 5)]).unwrap()
    }

    #[test]
    fn test_train_layout() {
        let mut s = NegativeSampler::new(4, 7);
        let batch = s.sample_train(&label(), &[0, 2]).unwrap();
        assert_eq!(batch.len(), 2 * 4 * 2);
        assert_eq!(batch.half(), 8);
        for k in 0..batch.half() {
            assert_eq!(batch.users[k], batch.users[k + batch.half()]);
        }
        assert!(batch.users[..4].iter().all(|&u| u == 0));
        assert!(batch.users[4..8].iter().all(|&u| u == 2));
    }

    #[test]
    fn test_train_positives_and_negatives_respect_label() {
        let g = label();
        let mut s = NegativeSampler::new(16, 3);
        let batch = s.sample_train(&g, &[0, 1, 2]).unwrap();
        let half = batch.half();
        for k in 0..half {
            assert!(g.contains(batch.users[k], batch.items[k]));
            assert!(!g.contains(batch.users[k + half], batch.items[k + half]));
        }
    }

    #[test]
    fn test_train_same_seed_same_batch() {
        let g = label();
        let a = NegativeSampler::new(5, 11).sample_train(&g, &[0, 1]).unwrap();
        let b = NegativeSampler::new(5, 11).sample_train(&g, &[0, 1]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_user_without_positives_is_reported() {
        let g = BehaviorGraph::from_edges(2, 3, &[(0, 0)]).unwrap();
        let err = NegativeSampler::new(2, 1).sample_train(&g, &[1]).unwrap_err();
        assert!(matches!(err, Error::InsufficientCandidates { user: 1, kind: "positive", .. }));
    }

    #[test]
    fn test_user_positive_everywhere_is_reported() {
        let g = BehaviorGraph::from_edges(1, 2, &[(0, 0), (0, 1)]).unwrap();
        let err = NegativeSampler::new(2, 1).sample_train(&g, &[0]).unwrap_err();
        assert!(matches!(err, Error::InsufficientCandidates { kind: "negative", .. }));
    }

    #[test]
    fn test_candidates_end_with_held_out() {
        let g = label();
        let mut s = NegativeSampler::new(1, 5).with_test_negatives(4);
        let inst = s.sample_test(&g, 0, 6).unwrap();
        assert_eq!(inst.candidates.len(), 5);
        assert_eq!(*inst.candidates.last().unwrap(), 6);
        let negs = &inst.candidates[..4];
        for &i in negs {
            assert_ne!(i, 6);
            assert!(!g.contains(0, i));
        }
        let mut uniq = negs.to_vec();
        uniq.sort_unstable();
        uniq.dedup();
        assert_eq!(uniq.len(), 4);
        assert_eq!(inst.user_column(), vec![0; 5]);
    }

    #[test]
    fn test_too_few_test_negatives() {
        let g = label();
        // user 0 has 8 - 2 - 1 = 5 eligible negatives
        let err = NegativeSampler::new(1, 5).sample_test(&g, 0, 7).unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientCandidates { needed: TEST_NEGATIVES, available: 5, .. }
        ));
    }

    #[test]
    fn test_permutation_truncates() {
        let mut s = NegativeSampler::new(1, 0);
        let p = s.permutation(10, 4);
        assert_eq!(p.len(), 4);
        let all = s.permutation(3, 10);
        let mut sorted = all.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2]);
    }
}
