//! Row and string similarity
//!
//! Edit-distance kernels (plain Levenshtein and the restricted
//! Damerau-Levenshtein with adjacent transpositions) plus the row-level
//! comparators used for emitted coefficients and candidate re-ranking.
//! Every comparator returns a value in [0, 1]; degenerate inputs never
//! error (two empty rows compare as identical).

use crate::backbone::{Backbone, Side};
use crate::types::{Row, ScoredRow};

/// Plain Levenshtein distance over characters
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    edit_distance(&a, &b, false)
}

/// Restricted Damerau-Levenshtein distance (adjacent transpositions count 1)
pub fn damerau_levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    edit_distance(&a, &b, true)
}

fn edit_distance(a: &[char], b: &[char], transpositions: bool) -> usize {
    let (m, n) = (a.len(), b.len());
    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }

    let mut dp = vec![vec![0usize; n + 1]; m + 1];
    for (i, row) in dp.iter_mut().enumerate() {
        row[0] = i;
    }
    for j in 0..=n {
        dp[0][j] = j;
    }

    for i in 1..=m {
        for j in 1..=n {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            let mut best = (dp[i - 1][j] + 1)
                .min(dp[i][j - 1] + 1)
                .min(dp[i - 1][j - 1] + cost);
            if transpositions && i > 1 && j > 1 && a[i - 1] == b[j - 2] && a[i - 2] == b[j - 1] {
                best = best.min(dp[i - 2][j - 2] + 1);
            }
            dp[i][j] = best;
        }
    }
    dp[m][n]
}

/// Normalized similarity from an edit distance: `1 - d / max_len`
fn normalize(distance: usize, len_a: usize, len_b: usize) -> f64 {
    let max_len = len_a.max(len_b);
    if max_len == 0 {
        return 1.0;
    }
    1.0 - distance as f64 / max_len as f64
}

/// Row-level comparator bound to the input header lists of both sides
#[derive(Debug, Clone)]
pub struct SimilarityComparator {
    target_headers: Vec<String>,
    reference_headers: Vec<String>,
}

/// Blend weights for composite candidate ranking
const BLEND_DAMERAU: f64 = 0.6;
const BLEND_JACCARD: f64 = 0.15;
const BLEND_LEV_TRANS: f64 = 0.25;

impl SimilarityComparator {
    pub fn new(target_headers: Vec<String>, reference_headers: Vec<String>) -> Self {
        Self {
            target_headers,
            reference_headers,
        }
    }

    /// Comparator over the backbone's input headers on each side
    pub fn from_backbone(backbone: &Backbone) -> Self {
        Self::new(
            backbone.input_headers(Side::Target),
            backbone.input_headers(Side::Reference),
        )
    }

    /// Normalized Damerau-Levenshtein over the lexicographically sorted,
    /// space-joined cell values of each row. 1.0 when both rows are empty.
    pub fn damerau(&self, target: &Row, reference: &Row) -> f64 {
        let a = sorted_concat(target, &self.target_headers);
        let b = sorted_concat(reference, &self.reference_headers);
        let d = damerau_levenshtein(&a, &b);
        normalize(d, a.chars().count(), b.chars().count())
    }

    /// Jaccard similarity over the two rows' non-empty cell values.
    /// 1.0 when the union is empty.
    pub fn jaccard(&self, target: &Row, reference: &Row) -> f64 {
        let a: std::collections::BTreeSet<&str> =
            target.data_values().filter(|v| !v.is_empty()).collect();
        let b: std::collections::BTreeSet<&str> =
            reference.data_values().filter(|v| !v.is_empty()).collect();

        let union = a.union(&b).count();
        if union == 0 {
            return 1.0;
        }
        let intersection = a.intersection(&b).count();
        intersection as f64 / union as f64
    }

    /// Normalized transposition-aware distance over the ordered (unsorted)
    /// concatenations of each row's values
    pub fn lev_transposition(&self, target: &Row, reference: &Row) -> f64 {
        let a = ordered_concat(target, &self.target_headers);
        let b = ordered_concat(reference, &self.reference_headers);
        let d = damerau_levenshtein(&a, &b);
        normalize(d, a.chars().count(), b.chars().count())
    }

    /// Weighted blend of the three comparators
    pub fn blend(&self, target: &Row, reference: &Row) -> f64 {
        BLEND_DAMERAU * self.damerau(target, reference)
            + BLEND_JACCARD * self.jaccard(target, reference)
            + BLEND_LEV_TRANS * self.lev_transposition(target, reference)
    }

    /// Sort candidates descending by blended similarity against a query row
    pub fn rank_by_similarity(&self, target: &Row, candidates: &mut [ScoredRow]) {
        candidates.sort_by(|a, b| {
            let sa = self.blend(target, &a.row);
            let sb = self.blend(target, &b.row);
            sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
        });
    }
}

/// Non-empty values in header order, sorted lexicographically, space-joined
fn sorted_concat(row: &Row, headers: &[String]) -> String {
    let mut values: Vec<&str> = headers
        .iter()
        .map(|h| row.value(h))
        .filter(|v| !v.is_empty())
        .collect();
    values.sort_unstable();
    values.join(" ")
}

/// Non-empty values joined in header order
fn ordered_concat(row: &Row, headers: &[String]) -> String {
    headers
        .iter()
        .map(|h| row.value(h))
        .filter(|v| !v.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> Row {
        let mut r = Row::new();
        for (k, v) in pairs {
            r.set(*k, *v);
        }
        r
    }

    fn single_header_comparator() -> SimilarityComparator {
        SimilarityComparator::new(vec!["A".to_string()], vec!["A".to_string()])
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", "abc"), 0);
    }

    #[test]
    fn transposition_counts_one() {
        assert_eq!(levenshtein("ab", "ba"), 2);
        assert_eq!(damerau_levenshtein("ab", "ba"), 1);
        assert_eq!(damerau_levenshtein("acb", "abc"), 1);
    }

    #[test]
    fn damerau_normalization_on_single_values() {
        let c = single_header_comparator();
        let sim = c.damerau(&row(&[("A", "abc")]), &row(&[("A", "acb")]));
        assert!((sim - (1.0 - 1.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn empty_rows_compare_as_identical() {
        let c = single_header_comparator();
        assert_eq!(c.damerau(&Row::new(), &Row::new()), 1.0);
        assert_eq!(c.jaccard(&Row::new(), &Row::new()), 1.0);
    }

    #[test]
    fn jaccard_over_value_sets() {
        let c = SimilarityComparator::new(
            vec!["A".to_string(), "B".to_string()],
            vec!["A".to_string(), "B".to_string()],
        );
        let t = row(&[("A", "x"), ("B", "y")]);
        let r = row(&[("A", "x"), ("B", "z")]);
        // |{x}| / |{x, y, z}|
        assert!((c.jaccard(&t, &r) - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn sorted_concat_ignores_value_order() {
        let c = SimilarityComparator::new(
            vec!["A".to_string(), "B".to_string()],
            vec!["A".to_string(), "B".to_string()],
        );
        let t = row(&[("A", "beta"), ("B", "alpha")]);
        let r = row(&[("A", "alpha"), ("B", "beta")]);
        assert_eq!(c.damerau(&t, &r), 1.0);
    }

    #[test]
    fn blend_ranks_closer_candidates_first() {
        let c = single_header_comparator();
        let query = row(&[("A", "acme corp")]);

        let mut candidates = vec![
            ScoredRow {
                row: row(&[("A", "zeta holdings")]),
                index: 0,
                weight: 1.0,
            },
            ScoredRow {
                row: row(&[("A", "acme corp")]),
                index: 1,
                weight: 1.0,
            },
        ];
        c.rank_by_similarity(&query, &mut candidates);
        assert_eq!(candidates[0].index, 1);
    }
}
