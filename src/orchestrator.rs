//! Batch linkage driver
//!
//! Drives a full run from a loaded configuration: ingest both tables,
//! apply regex pre-cleaning, build the engine, score every query row,
//! rearrange collisions across the batch, and emit the result CSV into the
//! operating directory. The built engine is saved alongside the results so
//! later runs against the same reference dataset can skip the build.

use crate::backbone::Backbone;
use crate::config::LinkConfig;
use crate::engine::FuzzyDatabase;
use crate::error::Result;
use crate::ingest;
use crate::persist;
use crate::rearrange::{CollisionRearranger, RearrangeReport};
use crate::similarity::SimilarityComparator;
use crate::types::{ResultTuple, Row, ScoredRow, NO_MATCH};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Result CSV written into the operating directory
pub const RESULT_FILE: &str = "linkage_results.csv";
/// Persisted engine written next to the results
pub const ENGINE_FILE: &str = "engine.fzlk";

/// Progress is reported every this many query rows
const PROGRESS_EVERY: usize = 500;

/// Summary of one batch run
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Query rows processed
    pub queries: usize,
    /// Tuples with a top candidate
    pub matched: usize,
    /// Queries resolved through the exact-key fast path
    pub exact_key_hits: usize,
    /// Cells rewritten per header by the pre-cleaning pass
    pub preclean_counts: BTreeMap<String, usize>,
    /// Collision rearrangement outcome
    pub rearrange: RearrangeReport,
    /// Where the result CSV was written
    pub results_path: PathBuf,
    /// Wall-clock duration of the run
    pub elapsed: Duration,
}

/// Drives per-row querying and result emission for one configuration
#[derive(Debug, Clone)]
pub struct Orchestrator {
    config: LinkConfig,
}

impl Orchestrator {
    pub fn new(config: LinkConfig) -> Self {
        Self { config }
    }

    /// Build the engine from the configured reference table (pre-cleaned)
    pub fn build_engine(&self) -> Result<FuzzyDatabase> {
        let mut reference = ingest::load_csv(&self.config.data.reference_table)?;
        ingest::preclean(&mut reference, &self.config.regex_preprocessing)?;

        let backbone = Backbone::from_config(&self.config.backbone)?;
        let profile = self.config.scoring.clone().unwrap_or_default();
        FuzzyDatabase::build(backbone, reference, profile)
    }

    /// Build the engine and save it into the operating directory
    pub fn build_and_save(&self) -> Result<PathBuf> {
        let engine = self.build_engine()?;
        std::fs::create_dir_all(&self.config.operating_dir)?;
        let path = self.config.operating_dir.join(ENGINE_FILE);
        persist::save(&engine, &path)?;
        Ok(path)
    }

    /// Run the full batch and write the result CSV
    pub fn run(&self) -> Result<RunSummary> {
        let started = Instant::now();

        let engine = self.build_engine()?;

        let mut messy = ingest::load_csv(&self.config.data.messy_table)?;
        let preclean_counts = ingest::preclean(&mut messy, &self.config.regex_preprocessing)?;

        let comparator = SimilarityComparator::from_backbone(engine.backbone());
        let key_header = engine.backbone().target_key_header().to_string();
        let ref_key_header = engine.backbone().reference_key_header().to_string();

        let mut tuples = Vec::with_capacity(messy.len());
        let mut exact_key_hits = 0;
        for (query_idx, query) in messy.rows().iter().enumerate() {
            let mut candidates = engine.lookup_entry(query)?;
            let exact = candidates.first().is_some_and(|c| c.weight.is_infinite());
            if exact {
                exact_key_hits += 1;
            }
            if self.config.rank_by_similarity && !exact {
                comparator.rank_by_similarity(query, &mut candidates);
            }
            if candidates.is_empty() {
                tracing::warn!(query = query_idx, "no candidates; emitting sentinel row");
            }
            tuples.push(self.make_tuple(
                query_idx,
                query,
                &candidates,
                &comparator,
                &key_header,
                &ref_key_header,
            ));

            if (query_idx + 1) % PROGRESS_EVERY == 0 {
                tracing::info!(processed = query_idx + 1, total = messy.len(), "scoring");
            }
        }

        let rearrange = CollisionRearranger::new(self.config.diff_percent).rearrange(
            &messy,
            engine.reference(),
            &mut tuples,
        );

        std::fs::create_dir_all(&self.config.operating_dir)?;
        let results_path = self.config.operating_dir.join(RESULT_FILE);
        write_results(&results_path, &tuples)?;
        persist::save(&engine, &self.config.operating_dir.join(ENGINE_FILE))?;

        let summary = RunSummary {
            queries: tuples.len(),
            matched: tuples.iter().filter(|t| t.top_idx >= 0).count(),
            exact_key_hits,
            preclean_counts,
            rearrange,
            results_path,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            queries = summary.queries,
            matched = summary.matched,
            exact = summary.exact_key_hits,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "batch finished"
        );
        Ok(summary)
    }

    fn make_tuple(
        &self,
        query_idx: usize,
        query: &Row,
        candidates: &[ScoredRow],
        comparator: &SimilarityComparator,
        key_header: &str,
        ref_key_header: &str,
    ) -> ResultTuple {
        let Some(top) = candidates.first() else {
            return ResultTuple::unmatched(query_idx);
        };

        let query_key = query.value(key_header);
        let same_id = !query_key.is_empty() && top.row.value(ref_key_header) == query_key;

        let (second_idx, second_weight) = candidates
            .get(1)
            .map(|c| (c.index as i64, c.weight))
            .unwrap_or((NO_MATCH, 0.0));

        ResultTuple {
            top_idx: top.index as i64,
            top_weight: top.weight,
            second_idx,
            second_weight,
            damerau_sim: comparator.damerau(query, &top.row),
            jaccard_sim: comparator.jaccard(query, &top.row),
            same_id,
            ..ResultTuple::unmatched(query_idx)
        }
    }
}

/// Emit the result CSV: one line per query row
fn write_results(path: &std::path::Path, tuples: &[ResultTuple]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "query",
        "match",
        "secondMatch",
        "coefficientDamerau",
        "coefficientJaccard",
        "idMatch",
    ])?;
    for t in tuples {
        writer.write_record([
            t.query_idx.to_string(),
            t.top_idx.to_string(),
            t.second_idx.to_string(),
            format!("{:.3}", t.damerau_sim),
            format!("{:.3}", t.jaccard_sim),
            u8::from(t.same_id).to_string(),
        ])?;
    }
    writer.flush()?;
    tracing::info!(path = %path.display(), rows = tuples.len(), "results written");
    Ok(())
}
