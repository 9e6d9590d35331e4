//! Tabular data model and per-query result tuples

use crate::error::{LinkError, Result};
use serde::{Deserialize, Serialize};

/// Name of the synthetic column carrying each row's source ordinal
pub const INDEX_COLUMN: &str = "index";

/// Sentinel for "no candidate" in a [`ResultTuple`]
pub const NO_MATCH: i64 = -1;

/// A single record: an ordered mapping from column name to cell value.
///
/// Cells are stored as (header, value) pairs in declared order — the order
/// the loader sets them, which matches the source table's column order —
/// so iteration and the name-column lookup respect the table layout, and
/// persisted engines serialize deterministically. Every ingested row
/// carries the synthetic `index` column with the string form of its
/// zero-based ordinal in the source table.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Row {
    cells: Vec<(String, String)>,
}

impl Row {
    /// Create an empty row
    pub fn new() -> Self {
        Self::default()
    }

    /// Cell value for a header, if the column exists
    pub fn get(&self, header: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(h, _)| h == header)
            .map(|(_, v)| v.as_str())
    }

    /// Cell value for a header, or the empty string when the column is absent
    pub fn value(&self, header: &str) -> &str {
        self.get(header).unwrap_or("")
    }

    /// Set a cell value, keeping the column's declared position if it
    /// already exists
    pub fn set(&mut self, header: impl Into<String>, value: impl Into<String>) {
        let header = header.into();
        let value = value.into();
        match self.cells.iter_mut().find(|(h, _)| *h == header) {
            Some(cell) => cell.1 = value,
            None => self.cells.push((header, value)),
        }
    }

    /// The row's source ordinal, parsed from the synthetic `index` column
    pub fn index(&self) -> Result<usize> {
        let raw = self
            .get(INDEX_COLUMN)
            .ok_or_else(|| LinkError::Input(format!("row is missing the '{INDEX_COLUMN}' column")))?;
        raw.parse::<usize>()
            .map_err(|_| LinkError::Input(format!("malformed row index '{raw}'")))
    }

    /// Iterate over (header, value) pairs in declared column order
    pub fn cells(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cells.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// All cell values, excluding the synthetic index column
    pub fn data_values(&self) -> impl Iterator<Item = &str> {
        self.cells
            .iter()
            .filter(|(k, _)| k.as_str() != INDEX_COLUMN)
            .map(|(_, v)| v.as_str())
    }

    /// Value of the first column (in declared order) whose lowercase name
    /// contains `"name"`, or the empty string if no such column exists
    pub fn name_value(&self) -> &str {
        self.cells
            .iter()
            .find(|(k, _)| k.to_lowercase().contains("name"))
            .map(|(_, v)| v.as_str())
            .unwrap_or("")
    }
}

/// An ordered sequence of rows with a known column list
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    /// Create an empty table with the given column list
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Column names in source order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Append a row
    pub fn push(&mut self, row: Row) {
        self.rows.push(row);
    }

    /// Row at a position, if present
    pub fn get(&self, idx: usize) -> Option<&Row> {
        self.rows.get(idx)
    }

    /// Mutable row at a position, if present
    pub fn get_mut(&mut self, idx: usize) -> Option<&mut Row> {
        self.rows.get_mut(idx)
    }

    /// All rows in source order
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when the table holds no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Clone the rows at the given positions, skipping out-of-range entries
    pub fn subset(&self, indices: &[usize]) -> Vec<Row> {
        indices
            .iter()
            .filter_map(|&i| self.rows.get(i).cloned())
            .collect()
    }
}

/// A reference-row candidate produced by the scoring pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredRow {
    /// The matched reference row
    pub row: Row,
    /// Source ordinal of the matched row
    pub index: usize,
    /// Accumulated relevance weight; `f64::INFINITY` for exact-key hits
    pub weight: f64,
}

/// Rearrangement state of a result tuple
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Still eligible for collision rearrangement
    #[default]
    Open,
    /// Latched: the rearranger will not touch this tuple again
    Verified,
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchStatus::Open => write!(f, "open"),
            MatchStatus::Verified => write!(f, "verified"),
        }
    }
}

/// One result line per query row
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ResultTuple {
    /// Ordinal of the query row this tuple belongs to
    pub query_idx: usize,
    /// Top-ranked reference row, or [`NO_MATCH`]
    pub top_idx: i64,
    /// Weight of the top candidate
    pub top_weight: f64,
    /// Runner-up reference row, or [`NO_MATCH`]
    pub second_idx: i64,
    /// Weight of the runner-up
    pub second_weight: f64,
    /// Normalized Damerau-Levenshtein similarity against the top row
    pub damerau_sim: f64,
    /// Jaccard similarity against the top row
    pub jaccard_sim: f64,
    /// Whether the query key column equals the top row's key column
    pub same_id: bool,
    /// Rearrangement state
    pub status: MatchStatus,
}

impl ResultTuple {
    /// Tuple for a query row that produced no candidates
    pub fn unmatched(query_idx: usize) -> Self {
        Self {
            query_idx,
            top_idx: NO_MATCH,
            top_weight: 0.0,
            second_idx: NO_MATCH,
            second_weight: 0.0,
            damerau_sim: -1.0,
            jaccard_sim: -1.0,
            same_id: false,
            status: MatchStatus::Open,
        }
    }

    /// True once the rearranger has latched this tuple
    pub fn is_verified(&self) -> bool {
        self.status == MatchStatus::Verified
    }

    /// True when a runner-up candidate is available
    pub fn has_second(&self) -> bool {
        self.second_idx >= 0
    }
}
