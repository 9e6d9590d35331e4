//! Inverted token index: Pool -> Bucket -> Posting
//!
//! Each reference-side group owns one [`Pool`]. A pool maps every token
//! observed on the group's headers to a [`Bucket`] of postings, one per
//! distinct reference row, with weights added when the same (token, row)
//! pair arrives again. Pools are read-only once the reference table has
//! been ingested.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A (reference-row-index, weight) pair inside a bucket
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Posting {
    /// Zero-based ordinal of the reference row
    pub row: usize,
    /// Accumulated weight contributed by the group's headers
    pub weight: f64,
}

impl Posting {
    pub fn new(row: usize, weight: f64) -> Self {
        Self { row, weight }
    }
}

/// All postings for one token, deduplicated by row index
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Bucket {
    postings: Vec<Posting>,
    // row index -> slot in `postings`; BTreeMap so persisted engines
    // serialize deterministically
    by_row: BTreeMap<usize, usize>,
}

impl Bucket {
    /// Add a posting. A repeated row index folds its weight into the
    /// existing posting; no duplicate postings ever exist.
    pub fn add(&mut self, posting: Posting) {
        match self.by_row.get(&posting.row) {
            Some(&slot) => self.postings[slot].weight += posting.weight,
            None => {
                self.by_row.insert(posting.row, self.postings.len());
                self.postings.push(posting);
            }
        }
    }

    /// Number of distinct row indices in this bucket
    pub fn size(&self) -> usize {
        self.postings.len()
    }

    /// Postings in insertion order
    pub fn entries(&self) -> &[Posting] {
        &self.postings
    }

    /// Posting for a row index, if present
    pub fn get(&self, row: usize) -> Option<&Posting> {
        self.by_row.get(&row).map(|&slot| &self.postings[slot])
    }
}

/// Token -> bucket index owned by exactly one reference group
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Pool {
    buckets: BTreeMap<String, Bucket>,
}

impl Pool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bucket for a token, if any posting was ever placed under it
    pub fn get(&self, token: &str) -> Option<&Bucket> {
        self.buckets.get(token)
    }

    /// Place a posting under a token, creating the bucket on first use
    pub fn place(&mut self, token: &str, posting: Posting) {
        self.buckets
            .entry(token.to_string())
            .or_default()
            .add(posting);
    }

    /// Number of distinct tokens
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// True when no token has been placed yet
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Iterate (token, bucket) pairs in token order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Bucket)> {
        self.buckets.iter().map(|(t, b)| (t.as_str(), b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_row_folds_weight() {
        let mut bucket = Bucket::default();
        bucket.add(Posting::new(4, 0.5));
        bucket.add(Posting::new(4, 0.25));
        bucket.add(Posting::new(9, 1.0));

        assert_eq!(bucket.size(), 2);
        assert_eq!(bucket.get(4).unwrap().weight, 0.75);
    }

    #[test]
    fn entries_preserve_insertion_order() {
        let mut bucket = Bucket::default();
        bucket.add(Posting::new(7, 1.0));
        bucket.add(Posting::new(2, 1.0));
        bucket.add(Posting::new(7, 1.0));

        let rows: Vec<usize> = bucket.entries().iter().map(|p| p.row).collect();
        assert_eq!(rows, vec![7, 2]);
    }

    #[test]
    fn no_duplicate_rows_in_bucket() {
        let mut bucket = Bucket::default();
        for _ in 0..5 {
            bucket.add(Posting::new(1, 0.1));
        }
        let mut rows: Vec<usize> = bucket.entries().iter().map(|p| p.row).collect();
        rows.dedup();
        assert_eq!(rows.len(), bucket.size());
    }

    #[test]
    fn pool_place_creates_bucket_on_first_use() {
        let mut pool = Pool::new();
        assert!(pool.get("acme").is_none());

        pool.place("acme", Posting::new(0, 0.4));
        pool.place("acme", Posting::new(0, 0.6));

        let bucket = pool.get("acme").unwrap();
        assert_eq!(bucket.size(), 1);
        assert_eq!(bucket.get(0).unwrap().weight, 1.0);
    }
}
