//! Collision rearrangement
//!
//! After the whole query batch has been scored, several query rows may
//! share the same top-ranked reference row. The rearranger resolves such
//! collisions to a fixed point: the query row closest to the contested
//! reference row (plain Levenshtein over the name-like column) keeps it,
//! and each loser is either promoted to its runner-up — when the runner-up
//! is within `diff_percent` of the winner's distance — or latched as
//! VERIFIED and never touched again.

use crate::similarity::levenshtein;
use crate::types::{MatchStatus, ResultTuple, Table, NO_MATCH};
use std::collections::BTreeMap;

/// Outcome of a rearrangement run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RearrangeReport {
    /// Fixed-point iterations executed
    pub passes: usize,
    /// Tuples promoted to their runner-up
    pub promotions: usize,
    /// Tuples latched as verified
    pub verified: usize,
}

/// Resolves shared top picks across a scored query batch
#[derive(Debug, Clone, Copy)]
pub struct CollisionRearranger {
    diff_percent: f64,
}

impl CollisionRearranger {
    pub fn new(diff_percent: f64) -> Self {
        Self { diff_percent }
    }

    /// Run the fixed-point loop over the batch.
    ///
    /// Every iteration either promotes a loser (shrinking one collision
    /// group) or verifies a tuple (removing it from consideration), so the
    /// loop terminates.
    pub fn rearrange(
        &self,
        query: &Table,
        reference: &Table,
        tuples: &mut [ResultTuple],
    ) -> RearrangeReport {
        let mut report = RearrangeReport::default();

        loop {
            report.passes += 1;
            let mut changed = false;

            let mut collisions: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
            for (pos, tuple) in tuples.iter().enumerate() {
                if tuple.is_verified() || tuple.top_idx < 0 {
                    continue;
                }
                collisions.entry(tuple.top_idx).or_default().push(pos);
            }

            for group in collisions.into_values() {
                if group.len() < 2 {
                    continue;
                }

                let winner = group
                    .iter()
                    .copied()
                    .min_by_key(|&pos| self.top_distance(query, reference, &tuples[pos]))
                    .expect("collision group is non-empty");
                let d_winner = self.top_distance(query, reference, &tuples[winner]);

                for pos in group {
                    if pos == winner || tuples[pos].is_verified() {
                        continue;
                    }
                    if !tuples[pos].has_second() {
                        tuples[pos].status = MatchStatus::Verified;
                        report.verified += 1;
                        continue;
                    }

                    let d_second =
                        self.name_distance(query, reference, &tuples[pos], tuples[pos].second_idx);
                    if d_second as f64 <= d_winner as f64 * (1.0 + self.diff_percent) {
                        tuples[pos].top_idx = tuples[pos].second_idx;
                        tuples[pos].top_weight = tuples[pos].second_weight;
                        tuples[pos].second_idx = NO_MATCH;
                        tuples[pos].second_weight = 0.0;
                        report.promotions += 1;
                        changed = true;
                    } else {
                        tuples[pos].status = MatchStatus::Verified;
                        report.verified += 1;
                    }
                }
            }

            if !changed {
                break;
            }
        }

        tracing::debug!(
            passes = report.passes,
            promotions = report.promotions,
            verified = report.verified,
            "collision rearrangement finished"
        );
        report
    }

    fn top_distance(&self, query: &Table, reference: &Table, tuple: &ResultTuple) -> usize {
        self.name_distance(query, reference, tuple, tuple.top_idx)
    }

    /// Levenshtein between the query row's name-like value and a reference
    /// row's name-like value
    fn name_distance(
        &self,
        query: &Table,
        reference: &Table,
        tuple: &ResultTuple,
        ref_idx: i64,
    ) -> usize {
        let query_name = query
            .get(tuple.query_idx)
            .map(|r| r.name_value())
            .unwrap_or("");
        let ref_name = usize::try_from(ref_idx)
            .ok()
            .and_then(|idx| reference.get(idx))
            .map(|r| r.name_value())
            .unwrap_or("");
        levenshtein(query_name, ref_name)
    }
}
