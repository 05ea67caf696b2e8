//! Property-based tests for behavior graphs, normalization and sampling.
//!
//! These tests verify invariants that should hold for any interaction graph:
//! - The normalized operator is symmetric, finite and non-negative
//! - Isolated nodes stay all-zero
//! - Sampled negatives never hit the label matrix, for any seed

use cascade_core::{AdjacencyNormalizer, BehaviorGraph, Error, NegativeSampler};
use proptest::prelude::*;

/// Random bipartite graph with at least one user and one item.
fn arb_graph() -> impl Strategy<Value = BehaviorGraph> {
    (1usize..8, 1usize..12).prop_flat_map(|(users, items)| {
        prop::collection::vec((0..users, 0..items), 0..40)
            .prop_map(move |edges| BehaviorGraph::from_edges(users, items, &edges).unwrap())
    })
}

mod normalize_props {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn operator_is_symmetric(g in arb_graph()) {
            let op = AdjacencyNormalizer::normalize(&g);
            prop_assert_eq!(op.dim(), g.num_users() + g.num_items());
            prop_assert_eq!(op.nnz(), 2 * g.num_edges());
            prop_assert!(op.is_symmetric(0.0));
        }

        #[test]
        fn entries_are_finite_and_non_negative(g in arb_graph()) {
            let op = AdjacencyNormalizer::normalize(&g);
            for (_, _, v) in op.triplets() {
                prop_assert!(v.is_finite());
                prop_assert!(v > 0.0);
                prop_assert!(v <= 1.0);
            }
        }

        #[test]
        fn isolated_nodes_have_empty_rows(g in arb_graph()) {
            let op = AdjacencyNormalizer::normalize(&g);
            let degrees: Vec<usize> = g
                .user_degrees()
                .into_iter()
                .chain(g.item_degrees())
                .collect();
            for (node, &d) in degrees.iter().enumerate() {
                let (cols, _) = op.row(node);
                prop_assert_eq!(cols.len(), d);
            }
        }

        #[test]
        fn blocks_are_bipartite(g in arb_graph()) {
            let op = AdjacencyNormalizer::normalize(&g);
            let u = g.num_users();
            for (i, j, _) in op.triplets() {
                prop_assert!((i < u) != (j < u), "edge ({}, {}) inside a diagonal block", i, j);
            }
        }
    }
}

mod sampler_props {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn negatives_never_positive(g in arb_graph(), seed in any::<u64>(), samp in 1usize..10) {
            let users: Vec<usize> = (0..g.num_users()).collect();
            let mut sampler = NegativeSampler::new(samp, seed);
            match sampler.sample_train(&g, &users) {
                Ok(batch) => {
                    let half = batch.half();
                    prop_assert_eq!(half, users.len() * samp);
                    for k in 0..half {
                        prop_assert_eq!(batch.users[k], batch.users[k + half]);
                        prop_assert!(g.contains(batch.users[k], batch.items[k]));
                        prop_assert!(!g.contains(batch.users[k + half], batch.items[k + half]));
                    }
                }
                Err(Error::InsufficientCandidates { user, kind, .. }) => {
                    let deg = g.items_of(user).len();
                    prop_assert!(
                        (kind == "positive" && deg == 0)
                            || (kind == "negative" && deg == g.num_items())
                    );
                }
                Err(e) => prop_assert!(false, "unexpected error: {}", e),
            }
        }

        #[test]
        fn test_candidates_are_distinct_negatives(g in arb_graph(), seed in any::<u64>(), held in 0usize..12) {
            let held = held % g.num_items();
            let eligible = (0..g.num_items())
                .filter(|&i| i != held && !g.contains(0, i))
                .count();
            let want = eligible.min(3);
            let mut sampler = NegativeSampler::new(1, seed).with_test_negatives(want);
            let inst = sampler.sample_test(&g, 0, held).unwrap();
            prop_assert_eq!(inst.candidates.len(), want + 1);
            prop_assert_eq!(inst.candidates[want], held);
            let mut negs = inst.candidates[..want].to_vec();
            for &i in &negs {
                prop_assert!(i != held);
                prop_assert!(!g.contains(0, i));
            }
            negs.sort_unstable();
            negs.dedup();
            prop_assert_eq!(negs.len(), want);
        }
    }
}
