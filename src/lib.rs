//! # Fuzzylink - Weighted fuzzy record linkage
//!
//! Links the rows of a messy query table to the rows of a clean reference
//! table. The reference table is shredded into per-group token pools
//! according to a configured backbone (header groups with softmax weights
//! and cross-side links); each query row is tokenized the same way, routed
//! through the backbone, and scored against the pools. A post-processing
//! pass rearranges rank collisions so distinct query rows tend to map to
//! distinct reference rows.

pub mod analyzer;
pub mod backbone;
pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod ingest;
pub mod orchestrator;
pub mod persist;
pub mod rearrange;
pub mod similarity;
pub mod tokenizer;
pub mod types;

pub use analyzer::QueryAnalyzer;
pub use backbone::{Backbone, GroupBlock, Side};
pub use config::{BackboneConfig, DataConfig, LinkConfig, OneOrMany};
pub use engine::{FuzzyDatabase, ScoringProfile};
pub use error::{LinkError, Result};
pub use index::{Bucket, Pool, Posting};
pub use ingest::{load_csv, preclean};
pub use orchestrator::{Orchestrator, RunSummary, ENGINE_FILE, RESULT_FILE};
pub use rearrange::{CollisionRearranger, RearrangeReport};
pub use similarity::{damerau_levenshtein, levenshtein, SimilarityComparator};
pub use tokenizer::{Tokenizer, TokenizerProfile, DEFAULT_STOP_WORDS};
pub use types::{
    MatchStatus, ResultTuple, Row, ScoredRow, Table, INDEX_COLUMN, NO_MATCH,
};
