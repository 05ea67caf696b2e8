//! Symmetric normalization of bipartite behavior graphs.
//!
//! A user×item graph `R` is lifted onto the joint node space of size
//! `N = U + I` (users first, then items):
//!
//! ```text
//!     A = | 0    R |
//!         | R^T  0 |
//!
//!     Â = D^{-1/2} A D^{-1/2},   D = diag(deg(A) + 1e-7)
//! ```
//!
//! The epsilon keeps isolated nodes finite: their rows and columns in `A`
//! are empty, so they stay all-zero in `Â`.

use crate::graph::BehaviorGraph;

/// Added to every node degree before taking `deg^{-1/2}`.
pub const DEGREE_EPSILON: f64 = 1e-7;

/// `D^{-1/2} A D^{-1/2}` over the joint user+item space, in CSR form.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedOperator {
    num_users: usize,
    dim: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f32>,
}

impl NormalizedOperator {
    /// Side length `U + I`.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Users occupy rows `0..num_users`; items follow.
    pub fn num_users(&self) -> usize {
        self.num_users
    }

    /// Number of stored non-zeros.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Column indices and values of one row.
    pub fn row(&self, i: usize) -> (&[usize], &[f32]) {
        let range = self.row_ptr[i]..self.row_ptr[i + 1];
        (&self.col_idx[range.clone()], &self.values[range])
    }

    /// Entry `(i, j)`, zero when not stored.
    pub fn get(&self, i: usize, j: usize) -> f32 {
        if i >= self.dim {
            return 0.0;
        }
        let (cols, vals) = self.row(i);
        cols.binary_search(&j).map_or(0.0, |k| vals[k])
    }

    /// All stored entries as `(row, col, value)` in row-major order.
    pub fn triplets(&self) -> impl Iterator<Item = (usize, usize, f32)> + '_ {
        (0..self.dim).flat_map(move |i| {
            let (cols, vals) = self.row(i);
            cols.iter().zip(vals).map(move |(&j, &v)| (i, j, v))
        })
    }

    /// Whether `Â[i, j] == Â[j, i]` for every stored entry, within `tol`.
    pub fn is_symmetric(&self, tol: f32) -> bool {
        self.triplets().all(|(i, j, v)| (self.get(j, i) - v).abs() <= tol)
    }
}

/// Builds the propagation operator for each behavior graph.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdjacencyNormalizer;

impl AdjacencyNormalizer {
    /// Normalize a single graph.
    #[must_use]
    pub fn normalize(graph: &BehaviorGraph) -> NormalizedOperator {
        let num_users = graph.num_users();
        let num_items = graph.num_items();
        let dim = num_users + num_items;

        let user_deg = graph.user_degrees();
        let item_deg = graph.item_degrees();
        let inv_sqrt: Vec<f64> = user_deg
            .iter()
            .chain(item_deg.iter())
            .map(|&d| (d as f64 + DEGREE_EPSILON).powf(-0.5))
            .collect();

        let isolated = user_deg.iter().chain(item_deg.iter()).filter(|&&d| d == 0).count();
        if isolated > 0 {
            tracing::warn!(isolated, dim, "normalizing graph with isolated nodes");
        }

        // Item rows need R^T: bucket users by item.
        let mut item_ptr = vec![0; num_items + 1];
        for (i, &d) in item_deg.iter().enumerate() {
            item_ptr[i + 1] = item_ptr[i] + d;
        }
        let mut item_users = vec![0; graph.num_edges()];
        let mut fill = item_ptr.clone();
        for (u, i) in graph.edges() {
            item_users[fill[i]] = u;
            fill[i] += 1;
        }

        let mut row_ptr = Vec::with_capacity(dim + 1);
        let mut col_idx = Vec::with_capacity(2 * graph.num_edges());
        let mut values = Vec::with_capacity(2 * graph.num_edges());
        row_ptr.push(0);

        for u in 0..num_users {
            for &i in graph.items_of(u) {
                let j = num_users + i;
                col_idx.push(j);
                values.push((inv_sqrt[u] * inv_sqrt[j]) as f32);
            }
            row_ptr.push(col_idx.len());
        }
        for i in 0..num_items {
            let row = num_users + i;
            // Users were pushed in ascending order, so columns stay sorted.
            for &u in &item_users[item_ptr[i]..item_ptr[i + 1]] {
                col_idx.push(u);
                values.push((inv_sqrt[row] * inv_sqrt[u]) as f32);
            }
            row_ptr.push(col_idx.len());
        }

        NormalizedOperator {
            num_users,
            dim,
            row_ptr,
            col_idx,
            values,
        }
    }

    /// Normalize every graph once, preserving behavior order.
    #[must_use]
    pub fn normalize_all(graphs: &[BehaviorGraph]) -> Vec<NormalizedOperator> {
        graphs.iter().map(Self::normalize).collect()
    }
}
