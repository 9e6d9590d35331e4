//! Per-query scratch state
//!
//! One [`QueryAnalyzer`] lives for exactly one query: the tokenized cells by
//! header, the token lists routed into each target group, the candidate
//! weight map, and a max-heap of candidates. The heap uses lazy deletion: a
//! weight update pushes a fresh entry and stale entries are skipped during
//! the drain. Keeping this state here (instead of on the backbone) leaves
//! the backbone read-only while queries run.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq)]
struct HeapEntry {
    weight: f64,
    idx: usize,
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // max-heap on weight; ties yield the smaller candidate index first
        self.weight
            .total_cmp(&other.weight)
            .then_with(|| other.idx.cmp(&self.idx))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Scratch for a single query row
#[derive(Debug, Default)]
pub struct QueryAnalyzer {
    header_tokens: BTreeMap<String, Vec<String>>,
    group_tokens: BTreeMap<String, Vec<String>>,
    weights: HashMap<usize, f64>,
    heap: BinaryHeap<HeapEntry>,
}

impl QueryAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the tokenized form of one query header
    pub fn set_header_tokens(&mut self, header: impl Into<String>, tokens: Vec<String>) {
        self.header_tokens.insert(header.into(), tokens);
    }

    /// Tokens produced for a header, empty if the header was never set
    pub fn header_tokens(&self, header: &str) -> &[String] {
        self.header_tokens
            .get(header)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Append a header's tokens to a target group's token list
    pub fn route_to_group(&mut self, group: impl Into<String>, tokens: &[String]) {
        self.group_tokens
            .entry(group.into())
            .or_default()
            .extend_from_slice(tokens);
    }

    /// Token list accumulated for a target group, empty if none
    pub fn group_tokens(&self, group: &str) -> &[String] {
        self.group_tokens
            .get(group)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Take the routed token lists, leaving the scratch empty. Groups come
    /// out in name order, which fixes the accumulation order of the
    /// scoring loop.
    pub fn take_group_tokens(&mut self) -> BTreeMap<String, Vec<String>> {
        std::mem::take(&mut self.group_tokens)
    }

    /// Accumulate weight for a candidate reference row
    pub fn increase(&mut self, idx: usize, delta: f64) {
        let weight = self.weights.entry(idx).or_insert(0.0);
        *weight += delta;
        self.heap.push(HeapEntry {
            weight: *weight,
            idx,
        });
    }

    /// Current weight of a candidate, if present
    pub fn weight(&self, idx: usize) -> Option<f64> {
        self.weights.get(&idx).copied()
    }

    /// Number of distinct candidates
    pub fn candidate_count(&self) -> usize {
        self.weights.len()
    }

    /// Empty the heap and the map, yielding candidates in strictly
    /// descending weight order (ties by candidate index)
    pub fn drain_sorted(&mut self) -> Vec<(usize, f64)> {
        let mut emitted: HashSet<usize> = HashSet::with_capacity(self.weights.len());
        let mut out = Vec::with_capacity(self.weights.len());

        while let Some(entry) = self.heap.pop() {
            if emitted.contains(&entry.idx) {
                continue;
            }
            match self.weights.get(&entry.idx) {
                // stale heap entry from before a weight update
                Some(&current) if current != entry.weight => continue,
                Some(&current) => {
                    emitted.insert(entry.idx);
                    out.push((entry.idx, current));
                }
                None => continue,
            }
        }

        self.weights.clear();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_yields_descending_weights() {
        let mut analyzer = QueryAnalyzer::new();
        analyzer.increase(1, 0.5);
        analyzer.increase(2, 2.0);
        analyzer.increase(3, 1.0);

        let drained = analyzer.drain_sorted();
        assert_eq!(drained, vec![(2, 2.0), (3, 1.0), (1, 0.5)]);
    }

    #[test]
    fn increase_updates_existing_candidate() {
        let mut analyzer = QueryAnalyzer::new();
        analyzer.increase(7, 0.25);
        analyzer.increase(9, 0.6);
        analyzer.increase(7, 0.5);

        assert_eq!(analyzer.weight(7), Some(0.75));
        let drained = analyzer.drain_sorted();
        assert_eq!(drained, vec![(7, 0.75), (9, 0.6)]);
    }

    #[test]
    fn ties_break_by_candidate_index() {
        let mut analyzer = QueryAnalyzer::new();
        analyzer.increase(5, 1.0);
        analyzer.increase(2, 1.0);

        let drained = analyzer.drain_sorted();
        assert_eq!(drained, vec![(2, 1.0), (5, 1.0)]);
    }

    #[test]
    fn drain_empties_the_scratch() {
        let mut analyzer = QueryAnalyzer::new();
        analyzer.increase(1, 1.0);
        analyzer.drain_sorted();

        assert_eq!(analyzer.candidate_count(), 0);
        assert!(analyzer.drain_sorted().is_empty());
    }

    #[test]
    fn routed_tokens_accumulate_per_group() {
        let mut analyzer = QueryAnalyzer::new();
        analyzer.route_to_group("Name", &["$acme$".to_string()]);
        analyzer.route_to_group("Name", &["$corp$".to_string()]);

        assert_eq!(analyzer.group_tokens("Name").len(), 2);
        assert!(analyzer.group_tokens("ID").is_empty());
    }
}
