//! The matching engine
//!
//! [`FuzzyDatabase`] owns the backbone (with its per-group token pools),
//! the reference table, and the scoring constants. Queries run in two
//! phases: an exact-key fast path over the key column's pools, then the
//! fuzzy pipeline — tokenize per header, route token lists into target
//! groups, walk every linked reference pool, and accumulate weighted
//! contributions per candidate row.
//!
//! Reference pools are never mutated after the build; per-query state
//! lives in [`QueryAnalyzer`], so one engine can serve queries without
//! interior mutation.

use crate::analyzer::QueryAnalyzer;
use crate::backbone::{Backbone, Side};
use crate::error::Result;
use crate::index::Posting;
use crate::tokenizer::{Tokenizer, TokenizerProfile};
use crate::types::{Row, ScoredRow, Table};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Tuning constants of the scoring pipeline.
///
/// The defaults are frozen: scores are only comparable across runs built
/// with the same profile. The length curve discounts short token matches
/// and grows smoothly with token length; the bucket filter damps tokens
/// that appear in many postings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoringProfile {
    /// Length curve scale (`c`)
    pub length_scale: f64,
    /// Length curve shift (`s`)
    pub length_shift: f64,
    /// Length curve margin (`m`)
    pub length_margin: f64,
    /// Bucket filter numerator (`c2`)
    pub bucket_damp: f64,
    /// Bucket filter shift (`h`)
    pub bucket_damp_shift: f64,
    /// Tokenizer tuning
    pub tokenizer: TokenizerProfile,
}

impl Default for ScoringProfile {
    fn default() -> Self {
        Self {
            length_scale: 2.0,
            length_shift: -7.0,
            length_margin: 0.2,
            bucket_damp: 10.0,
            bucket_damp_shift: 0.7,
            tokenizer: TokenizerProfile::default(),
        }
    }
}

impl ScoringProfile {
    /// Length weight `L = max(0, exp((len+s)/c) - exp(s/c) - m)`
    pub fn length_weight(&self, token_len: usize) -> f64 {
        let curve = ((token_len as f64 + self.length_shift) / self.length_scale).exp()
            - (self.length_shift / self.length_scale).exp()
            - self.length_margin;
        curve.max(0.0)
    }

    /// Bucket filter `F = c2 / (size + h) + 0.5`
    pub fn bucket_filter(&self, bucket_size: usize) -> f64 {
        self.bucket_damp / (bucket_size as f64 + self.bucket_damp_shift) + 0.5
    }
}

/// The matching engine: token index + reference table + scoring profile
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FuzzyDatabase {
    backbone: Backbone,
    reference: Table,
    profile: ScoringProfile,
    built_at: chrono::DateTime<chrono::Utc>,
}

impl FuzzyDatabase {
    /// Ingest a reference table into the backbone's pools.
    ///
    /// For every row and every reference-side input header, the cell is
    /// tokenized once and a `Posting(row_index, softmax_header_weight)` is
    /// placed for each token into the pool of every group containing that
    /// header. Repeated (token, row) pairs fold additively, so a token
    /// shared by two headers of one group ends up with the summed weight.
    pub fn build(mut backbone: Backbone, reference: Table, profile: ScoringProfile) -> Result<Self> {
        let tokenizer = Tokenizer::new(profile.tokenizer.clone());
        let headers = backbone.input_headers(Side::Reference);

        for row in reference.rows() {
            let idx = row.index()?;
            for header in &headers {
                let cell = row.value(header);
                if cell.is_empty() {
                    continue;
                }
                let tokens = tokenizer.tokenize(cell);
                if tokens.is_empty() {
                    continue;
                }
                let group_names = backbone
                    .group_names_from_header(header, Side::Reference)
                    .to_vec();
                for name in group_names {
                    let Some(group) = backbone.group_mut(Side::Reference, &name) else {
                        continue;
                    };
                    let Some(weight) = group.weight_of(header) else {
                        continue;
                    };
                    let pool = group.pool_mut();
                    for token in &tokens {
                        pool.place(token, Posting::new(idx, weight));
                    }
                }
            }
        }

        let engine = Self {
            backbone,
            reference,
            profile,
            built_at: chrono::Utc::now(),
        };
        tracing::info!(
            rows = engine.reference.len(),
            groups = engine.index_stats().len(),
            "reference index built"
        );
        Ok(engine)
    }

    /// The routing backbone
    pub fn backbone(&self) -> &Backbone {
        &self.backbone
    }

    /// The ingested reference table
    pub fn reference(&self) -> &Table {
        &self.reference
    }

    /// The active scoring constants
    pub fn profile(&self) -> &ScoringProfile {
        &self.profile
    }

    /// When the reference index was built
    pub fn built_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.built_at
    }

    /// Distinct-token count per built reference group
    pub fn index_stats(&self) -> Vec<(String, usize)> {
        self.backbone
            .groups(Side::Reference)
            .iter()
            .filter_map(|(name, group)| group.pool().map(|p| (name.clone(), p.len())))
            .collect()
    }

    fn tokenizer(&self) -> Tokenizer {
        Tokenizer::new(self.profile.tokenizer.clone())
    }

    /// Exact-key fast path: every reference row whose key column equals
    /// `key` exactly, annotated with an infinite weight.
    ///
    /// The pools never hold a bare non-numeric literal (the tokenizer
    /// wraps every word in `$...$` sentinels), so the probe is the
    /// sentinel-wrapped normalized key; numeric ids are probed bare as
    /// well since they are indexed unwrapped too.
    pub fn lookup_by_id(&self, key: &str) -> Vec<ScoredRow> {
        let normalized = key.trim().to_lowercase();
        if normalized.is_empty() {
            return Vec::new();
        }
        let probes = [format!("${normalized}$"), normalized];
        let key_header = self.backbone.reference_key_header().to_string();

        let mut indices: BTreeSet<usize> = BTreeSet::new();
        for group in self.backbone.groups_from_header(&key_header, Side::Reference) {
            let Some(pool) = group.pool() else { continue };
            for probe in &probes {
                let Some(bucket) = pool.get(probe) else {
                    continue;
                };
                indices.extend(bucket.entries().iter().map(|p| p.row));
            }
        }

        indices
            .into_iter()
            .filter_map(|idx| self.reference.get(idx))
            .filter(|row| row.value(&key_header) == key)
            .map(|row| ScoredRow {
                row: row.clone(),
                index: row.index().unwrap_or_default(),
                weight: f64::INFINITY,
            })
            .collect()
    }

    /// Score one query row, returning candidates in descending weight.
    ///
    /// An exact key hit short-circuits the fuzzy pipeline. Query headers
    /// missing from the row simply contribute no tokens.
    pub fn lookup_entry(&self, query: &Row) -> Result<Vec<ScoredRow>> {
        let key = query.value(self.backbone.target_key_header());
        if !key.trim().is_empty() {
            let exact = self.lookup_by_id(key);
            if !exact.is_empty() {
                return Ok(exact);
            }
        }

        let mut analyzer = QueryAnalyzer::new();
        let tokenizer = self.tokenizer();

        for header in self.backbone.input_headers(Side::Target) {
            let tokens = tokenizer.tokenize(query.value(&header));
            analyzer.set_header_tokens(header, tokens);
        }

        for header in self.backbone.input_headers(Side::Target) {
            let group_names = self
                .backbone
                .group_names_from_header(&header, Side::Target)
                .to_vec();
            let tokens = analyzer.header_tokens(&header).to_vec();
            for name in group_names {
                analyzer.route_to_group(name, &tokens);
            }
        }

        for (group_name, tokens) in analyzer.take_group_tokens() {
            for linked in self.backbone.links_from(&group_name, Side::Target) {
                let Some(pool) = linked.pool() else { continue };
                for token in &tokens {
                    let Some(bucket) = pool.get(token) else {
                        continue;
                    };
                    let length_weight = self.profile.length_weight(token.chars().count());
                    if length_weight <= 0.0 {
                        continue;
                    }
                    let filter = self.profile.bucket_filter(bucket.size());
                    for posting in bucket.entries() {
                        let contribution = posting.weight * length_weight * filter;
                        if contribution > 0.0 {
                            analyzer.increase(posting.row, contribution);
                        }
                    }
                }
            }
        }

        let results = analyzer
            .drain_sorted()
            .into_iter()
            .filter_map(|(idx, weight)| {
                self.reference.get(idx).map(|row| ScoredRow {
                    row: row.clone(),
                    index: idx,
                    weight: round3(weight),
                })
            })
            .collect();
        Ok(results)
    }
}

/// Round a fuzzy weight to the three decimal places results are emitted with
fn round3(weight: f64) -> f64 {
    (weight * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackboneConfig, OneOrMany};
    use crate::types::INDEX_COLUMN;
    use std::collections::BTreeMap;

    fn entries(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn backbone_config() -> BackboneConfig {
        let mut reference_groups = BTreeMap::new();
        reference_groups.insert("ID".to_string(), entries(&["Customer_ID(1)"]));
        reference_groups.insert(
            "Name".to_string(),
            entries(&["Customer_Name(6)", "Industrial_Sector(2)"]),
        );

        let mut target_groups = BTreeMap::new();
        target_groups.insert(
            "ID".to_string(),
            entries(&["Customer_ID(5)", "Customer_Name(1)"]),
        );
        target_groups.insert(
            "Name".to_string(),
            entries(&["Customer_Name(4)", "Customer_ID(1)"]),
        );

        let mut ref_to_tgt = BTreeMap::new();
        ref_to_tgt.insert("ID".to_string(), OneOrMany::One("ID".to_string()));
        ref_to_tgt.insert("Name".to_string(), OneOrMany::One("Name".to_string()));

        let mut tgt_to_ref = BTreeMap::new();
        tgt_to_ref.insert("ID".to_string(), OneOrMany::One("ID".to_string()));
        tgt_to_ref.insert(
            "Name".to_string(),
            OneOrMany::Many(vec!["Name".to_string(), "ID".to_string()]),
        );

        BackboneConfig {
            reference_groups,
            target_groups,
            ref_to_tgt,
            tgt_to_ref,
            reference_key_col: "Customer_ID".to_string(),
            target_key_col: "Customer_ID".to_string(),
        }
    }

    fn reference_row(idx: usize, id: &str, name: &str, sector: &str) -> Row {
        let mut row = Row::new();
        row.set(INDEX_COLUMN, idx.to_string());
        row.set("Customer_ID", id);
        row.set("Customer_Name", name);
        row.set("Industrial_Sector", sector);
        row
    }

    fn reference_table() -> Table {
        let mut table = Table::new(vec![
            INDEX_COLUMN.to_string(),
            "Customer_ID".to_string(),
            "Customer_Name".to_string(),
            "Industrial_Sector".to_string(),
        ]);
        table.push(reference_row(0, "88001", "Northwind Traders", "Retail"));
        table.push(reference_row(1, "88002", "Contoso Energy", "Utilities"));
        table.push(reference_row(2, "X-12345", "Shop Outlet", "Retail"));
        table.push(reference_row(3, "88004", "Fabrikam Industries", "Manufacturing"));
        table.push(reference_row(4, "12345", "Foo Bar LLC", "Services"));
        table.push(reference_row(5, "AB1234", "Tailspin Toys", "Retail"));
        table.push(reference_row(6, "88007", "Wingtip Partners", "Finance"));
        table.push(reference_row(7, "", "Flat Ridge 4 Wind", "Utilities"));
        table
    }

    fn engine() -> FuzzyDatabase {
        let backbone = Backbone::from_config(&backbone_config()).unwrap();
        FuzzyDatabase::build(backbone, reference_table(), ScoringProfile::default()).unwrap()
    }

    fn query(pairs: &[(&str, &str)]) -> Row {
        let mut row = Row::new();
        for (k, v) in pairs {
            row.set(*k, *v);
        }
        row
    }

    #[test]
    fn exact_key_hit_short_circuits() {
        let engine = engine();
        let results = engine
            .lookup_entry(&query(&[("Customer_ID", "12345")]))
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].index, 4);
        assert!(results[0].weight.is_infinite());
    }

    #[test]
    fn fast_path_requires_literal_key_equality() {
        // row 2's key "X-12345" tokenizes to the word "12345", so the key
        // pool's "$12345$" bucket holds two rows; only the literally equal
        // key may come back
        let engine = engine();
        let results = engine.lookup_by_id("12345");

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].index, 4);
    }

    #[test]
    fn fast_path_matches_non_numeric_keys() {
        // a 6-character alphanumeric id is never indexed as a bare
        // literal (no cut size is 6 and it is not all digits); the
        // sentinel-wrapped probe must still find it
        let engine = engine();
        let results = engine
            .lookup_entry(&query(&[("Customer_ID", "AB1234")]))
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].index, 5);
        assert!(results[0].weight.is_infinite());
    }

    #[test]
    fn fuzzy_name_match_ranks_expected_row_first() {
        let engine = engine();
        let results = engine
            .lookup_entry(&query(&[
                ("Customer_Name", "Flat Ridge 4 Wind, LLC"),
                ("Industrial_Sector", "Manufacturing"),
            ]))
            .unwrap();

        assert!(!results.is_empty());
        assert_eq!(results[0].index, 7);
        assert!(results[0].weight > 0.0);
    }

    #[test]
    fn every_candidate_has_positive_weight() {
        let engine = engine();
        let results = engine
            .lookup_entry(&query(&[("Customer_Name", "Contoso Energy Group")]))
            .unwrap();

        assert!(!results.is_empty());
        assert!(results.iter().all(|r| r.weight > 0.0));
    }

    #[test]
    fn scoring_is_deterministic() {
        let engine = engine();
        let q = query(&[("Customer_Name", "Fabrikam Industries Inc")]);

        let a = engine.lookup_entry(&q).unwrap();
        let b = engine.lookup_entry(&q).unwrap();

        let pairs_a: Vec<(usize, f64)> = a.iter().map(|r| (r.index, r.weight)).collect();
        let pairs_b: Vec<(usize, f64)> = b.iter().map(|r| (r.index, r.weight)).collect();
        assert_eq!(pairs_a, pairs_b);
    }

    #[test]
    fn results_come_back_in_descending_weight() {
        let engine = engine();
        let results = engine
            .lookup_entry(&query(&[("Customer_Name", "Tailspin Toys Retail")]))
            .unwrap();

        for pair in results.windows(2) {
            assert!(pair[0].weight >= pair[1].weight);
        }
    }

    #[test]
    fn missing_query_headers_degrade_to_no_tokens() {
        let engine = engine();
        // no recognized target header at all: no candidates, no error
        let results = engine.lookup_entry(&query(&[("Unrelated", "zzz")])).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn fuzzy_weights_are_rounded_to_3dp() {
        let engine = engine();
        let results = engine
            .lookup_entry(&query(&[("Customer_Name", "Wingtip")]))
            .unwrap();

        for r in &results {
            let scaled = r.weight * 1000.0;
            assert!((scaled - scaled.round()).abs() < 1e-6);
        }
    }

    #[test]
    fn length_weight_discounts_short_tokens() {
        let profile = ScoringProfile::default();
        assert_eq!(profile.length_weight(1), 0.0);
        assert!(profile.length_weight(12) > profile.length_weight(6));
    }

    #[test]
    fn bucket_filter_damps_popular_tokens() {
        let profile = ScoringProfile::default();
        assert!(profile.bucket_filter(1) > profile.bucket_filter(50));
        // the filter floors at 0.5
        assert!(profile.bucket_filter(10_000) > 0.5);
    }
}
