//! CSV dataset support.
//!
//! A dataset directory holds one headerless edge list per behavior,
//! `<behavior>.csv`, with rows `user,item`, plus `test.csv` listing the
//! held-out `user,item` pair for every evaluated user:
//!
//! ```text
//! data/
//!   view.csv
//!   cart.csv
//!   buy.csv     <- target behavior, listed last
//!   test.csv
//! ```

use crate::error::{Error, Result};
use crate::graph::{BehaviorGraph, InteractionData};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// File holding held-out test pairs.
pub const TEST_FILE: &str = "test.csv";

/// CSV format handler.
pub struct CsvDataset;

impl CsvDataset {
    /// Read `user,item` pairs from a headerless CSV.
    ///
    /// Blank lines are skipped; surrounding whitespace is trimmed.
    pub fn read_edges<R: Read>(reader: R) -> Result<Vec<(usize, usize)>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut edges = Vec::new();
        for result in reader.records() {
            let record = result?;
            if record.len() == 1 && record[0].is_empty() {
                continue;
            }
            if record.len() < 2 {
                return Err(Error::Parse(format!(
                    "expected `user,item`, got {} column(s) at line {}",
                    record.len(),
                    record.position().map_or(0, |p| p.line())
                )));
            }
            edges.push((parse_index(&record[0])?, parse_index(&record[1])?));
        }
        Ok(edges)
    }

    /// Load a dataset directory.
    ///
    /// `behaviors` is the ordered list of behavior names; the last one is the
    /// target behavior. User and item counts are `1 + max id` over all files
    /// unless `shape` is given.
    pub fn load(dir: impl AsRef<Path>, behaviors: &[String], shape: Option<(usize, usize)>) -> Result<InteractionData> {
        let dir = dir.as_ref();
        if behaviors.is_empty() {
            return Err(Error::InvalidConfig("no behaviors given".into()));
        }

        let mut edge_lists = Vec::with_capacity(behaviors.len());
        for behavior in behaviors {
            let file = File::open(dir.join(format!("{behavior}.csv")))?;
            edge_lists.push(Self::read_edges(file)?);
        }
        let test_pairs = Self::read_edges(File::open(dir.join(TEST_FILE))?)?;

        let (num_users, num_items) = match shape {
            Some(s) => s,
            None => edge_lists
                .iter()
                .flatten()
                .chain(test_pairs.iter())
                .fold((0, 0), |(u, i), &(eu, ei)| (u.max(eu + 1), i.max(ei + 1))),
        };

        let graphs = edge_lists
            .iter()
            .map(|edges| BehaviorGraph::from_edges(num_users, num_items, edges))
            .collect::<Result<Vec<_>>>()?;

        for (name, g) in behaviors.iter().zip(&graphs) {
            tracing::info!(behavior = %name, edges = g.num_edges(), "loaded behavior graph");
        }

        InteractionData::new(behaviors.to_vec(), graphs, &test_pairs)
    }
}

fn parse_index(field: &str) -> Result<usize> {
    field
        .parse::<usize>()
        .map_err(|e| Error::Parse(format!("`{field}` is not an index: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_edges() {
        let text = "0,1\n 2 , 3\n\n4,0\n";
        let edges = CsvDataset::read_edges(text.as_bytes()).unwrap();
        assert_eq!(edges, vec![(0, 1), (2, 3), (4, 0)]);
    }

    #[test]
    fn test_read_edges_rejects_garbage() {
        let err = CsvDataset::read_edges("a,b\n".as_bytes()).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
        let err = CsvDataset::read_edges("3\n".as_bytes()).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_load_directory() {
        let dir = std::env::temp_dir().join(format!("cascade-csv-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("view.csv"), "0,0\n0,1\n1,2\n").unwrap();
        std::fs::write(dir.join("buy.csv"), "0,1\n1,2\n").unwrap();
        std::fs::write(dir.join("test.csv"), "1,3\n").unwrap();

        let behaviors = vec!["view".to_string(), "buy".to_string()];
        let data = CsvDataset::load(&dir, &behaviors, None).unwrap();
        assert_eq!(data.num_types(), 2);
        assert_eq!(data.num_users(), 2);
        assert_eq!(data.num_items(), 4);
        assert_eq!(data.label().num_edges(), 2);
        assert_eq!(data.test_users(), &[1]);
        assert_eq!(data.test_item(1), Some(3));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
