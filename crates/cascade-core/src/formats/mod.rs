//! On-disk dataset formats.

pub mod csv;

pub use self::csv::CsvDataset;
