//! Configuration file model
//!
//! The configuration is a single JSON document loaded once at startup. The
//! outer section names (`BackboneConfiguration`, `DataToConsume`,
//! `OperatingDir`, `RegexPreprocessing`) are part of the external interface
//! and are kept verbatim; the optional `Scoring` and `DiffPercent` sections
//! override the engine's frozen defaults.

use crate::engine::ScoringProfile;
use crate::error::{LinkError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A link value: either a single group name or a list of them
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    /// Normalize to a list
    pub fn as_vec(&self) -> Vec<String> {
        match self {
            OneOrMany::One(name) => vec![name.clone()],
            OneOrMany::Many(names) => names.clone(),
        }
    }
}

/// The bipartite routing configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackboneConfig {
    /// Reference-side groups: name -> `["Header(weight)", ...]`
    pub reference_groups: BTreeMap<String, Vec<String>>,
    /// Target-side groups: name -> `["Header(weight)", ...]`
    pub target_groups: BTreeMap<String, Vec<String>>,
    /// Reference group -> linked target group(s)
    #[serde(default)]
    pub ref_to_tgt: BTreeMap<String, OneOrMany>,
    /// Target group -> linked reference group(s)
    #[serde(default)]
    pub tgt_to_ref: BTreeMap<String, OneOrMany>,
    /// Designated key column on the reference side
    pub reference_key_col: String,
    /// Designated key column on the target side
    pub target_key_col: String,
}

/// Input table locations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataConfig {
    #[serde(rename = "ReferenceTable")]
    pub reference_table: PathBuf,
    #[serde(rename = "MessyTable")]
    pub messy_table: PathBuf,
}

fn default_diff_percent() -> f64 {
    0.05
}

/// Top-level configuration document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkConfig {
    #[serde(rename = "BackboneConfiguration")]
    pub backbone: BackboneConfig,

    #[serde(rename = "DataToConsume")]
    pub data: DataConfig,

    #[serde(rename = "OperatingDir")]
    pub operating_dir: PathBuf,

    /// Per-header cell pre-cleaning patterns (first capture group wins)
    #[serde(rename = "RegexPreprocessing", default)]
    pub regex_preprocessing: BTreeMap<String, String>,

    /// Optional overrides for the engine's scoring constants
    #[serde(rename = "Scoring", default)]
    pub scoring: Option<ScoringProfile>,

    /// Promotion threshold for the collision rearranger
    #[serde(rename = "DiffPercent", default = "default_diff_percent")]
    pub diff_percent: f64,

    /// Re-sort fuzzy candidates by blended similarity before ranking
    #[serde(rename = "RankBySimilarity", default)]
    pub rank_by_similarity: bool,
}

impl LinkConfig {
    /// Load and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            LinkError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: LinkConfig = serde_json::from_str(&raw).map_err(|e| {
            LinkError::Configuration(format!("cannot parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Structural checks that do not require the data files
    pub fn validate(&self) -> Result<()> {
        if self.backbone.reference_groups.is_empty() {
            return Err(LinkError::Configuration(
                "reference_groups must not be empty".into(),
            ));
        }
        if self.backbone.target_groups.is_empty() {
            return Err(LinkError::Configuration(
                "target_groups must not be empty".into(),
            ));
        }
        if self.backbone.reference_key_col.is_empty() || self.backbone.target_key_col.is_empty() {
            return Err(LinkError::Configuration(
                "both key columns must be configured".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.diff_percent) {
            return Err(LinkError::Configuration(format!(
                "DiffPercent must be within [0, 1], got {}",
                self.diff_percent
            )));
        }
        Ok(())
    }
}
