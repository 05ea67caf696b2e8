//! Bipartite behavior graphs and the dataset they come in.
//!
//! A [`BehaviorGraph`] is a 0/1 user×item matrix for one behavior type
//! (view, cart, buy, ...), stored in CSR form: each user row holds the
//! sorted, de-duplicated item ids that user interacted with.

use crate::error::{Error, Result};

/// Sparse 0/1 user×item interaction matrix for one behavior type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BehaviorGraph {
    num_users: usize,
    num_items: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
}

impl BehaviorGraph {
    /// Build a graph from `(user, item)` pairs.
    ///
    /// Repeated pairs collapse into a single edge. Fails if any index is
    /// outside `[0, num_users)` / `[0, num_items)`.
    pub fn from_edges(num_users: usize, num_items: usize, edges: &[(usize, usize)]) -> Result<Self> {
        for &(u, i) in edges {
            if u >= num_users {
                return Err(Error::IndexOutOfRange {
                    kind: "user",
                    index: u,
                    bound: num_users,
                });
            }
            if i >= num_items {
                return Err(Error::IndexOutOfRange {
                    kind: "item",
                    index: i,
                    bound: num_items,
                });
            }
        }

        let mut sorted_edges = edges.to_vec();
        sorted_edges.sort_unstable();
        sorted_edges.dedup();

        let mut row_ptr = vec![0; num_users + 1];
        let mut col_idx = Vec::with_capacity(sorted_edges.len());

        for (u, i) in sorted_edges {
            row_ptr[u + 1] += 1;
            col_idx.push(i);
        }

        for u in 0..num_users {
            row_ptr[u + 1] += row_ptr[u];
        }

        Ok(Self {
            num_users,
            num_items,
            row_ptr,
            col_idx,
        })
    }

    pub fn num_users(&self) -> usize {
        self.num_users
    }

    pub fn num_items(&self) -> usize {
        self.num_items
    }

    /// Number of distinct (user, item) edges.
    pub fn num_edges(&self) -> usize {
        self.col_idx.len()
    }

    /// Sorted item ids the user interacted with.
    pub fn items_of(&self, user: usize) -> &[usize] {
        &self.col_idx[self.row_ptr[user]..self.row_ptr[user + 1]]
    }

    /// Whether `(user, item)` is an edge.
    pub fn contains(&self, user: usize, item: usize) -> bool {
        user < self.num_users && self.items_of(user).binary_search(&item).is_ok()
    }

    /// Number of items each user interacted with.
    pub fn user_degrees(&self) -> Vec<usize> {
        self.row_ptr.windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// Number of users each item was touched by.
    pub fn item_degrees(&self) -> Vec<usize> {
        let mut deg = vec![0; self.num_items];
        for &i in &self.col_idx {
            deg[i] += 1;
        }
        deg
    }

    /// All edges in row-major order.
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.num_users).flat_map(move |u| self.items_of(u).iter().map(move |&i| (u, i)))
    }
}

/// Everything a training run consumes from the dataset.
///
/// Graphs are ordered by behavior type; the last one is the target behavior
/// and doubles as the label matrix for sampling.
#[derive(Debug, Clone)]
pub struct InteractionData {
    behaviors: Vec<String>,
    graphs: Vec<BehaviorGraph>,
    test_items: Vec<Option<usize>>,
    test_users: Vec<usize>,
}

impl InteractionData {
    /// Assemble a dataset from per-behavior graphs and held-out test pairs.
    ///
    /// `test_pairs` lists `(user, held_out_item)` in evaluation order.
    pub fn new(
        behaviors: Vec<String>,
        graphs: Vec<BehaviorGraph>,
        test_pairs: &[(usize, usize)],
    ) -> Result<Self> {
        if graphs.is_empty() {
            return Err(Error::InvalidConfig("at least one behavior graph is required".into()));
        }
        if behaviors.len() != graphs.len() {
            return Err(Error::DimensionMismatch {
                expected: graphs.len(),
                got: behaviors.len(),
            });
        }

        let num_users = graphs[0].num_users();
        let num_items = graphs[0].num_items();
        if num_users == 0 || num_items == 0 {
            return Err(Error::InvalidConfig("dataset has no users or no items".into()));
        }
        for g in &graphs[1..] {
            if g.num_users() != num_users {
                return Err(Error::DimensionMismatch {
                    expected: num_users,
                    got: g.num_users(),
                });
            }
            if g.num_items() != num_items {
                return Err(Error::DimensionMismatch {
                    expected: num_items,
                    got: g.num_items(),
                });
            }
        }

        let mut test_items = vec![None; num_users];
        let mut test_users = Vec::with_capacity(test_pairs.len());
        for &(u, i) in test_pairs {
            if u >= num_users {
                return Err(Error::IndexOutOfRange {
                    kind: "user",
                    index: u,
                    bound: num_users,
                });
            }
            if i >= num_items {
                return Err(Error::IndexOutOfRange {
                    kind: "item",
                    index: i,
                    bound: num_items,
                });
            }
            if test_items[u].is_none() {
                test_users.push(u);
            }
            test_items[u] = Some(i);
        }

        Ok(Self {
            behaviors,
            graphs,
            test_items,
            test_users,
        })
    }

    pub fn behaviors(&self) -> &[String] {
        &self.behaviors
    }

    pub fn graphs(&self) -> &[BehaviorGraph] {
        &self.graphs
    }

    pub fn num_types(&self) -> usize {
        self.graphs.len()
    }

    pub fn num_users(&self) -> usize {
        self.graphs[0].num_users()
    }

    pub fn num_items(&self) -> usize {
        self.graphs[0].num_items()
    }

    /// Target-behavior label matrix (the last graph).
    pub fn label(&self) -> &BehaviorGraph {
        &self.graphs[self.graphs.len() - 1]
    }

    /// Users to evaluate, in the order they were listed.
    pub fn test_users(&self) -> &[usize] {
        &self.test_users
    }

    /// Held-out item for a test user.
    pub fn test_item(&self, user: usize) -> Option<usize> {
        self.test_items.get(user).copied().flatten()
    }
}
