//! The bipartite routing backbone
//!
//! Parses the group configuration into reference-side and target-side
//! [`GroupBlock`]s, inverts header membership for routing, and holds the
//! cross-side group-to-group links. Links are stored as name lists and
//! resolved at lookup time, so the structure carries no pointer cycles and
//! stays read-only during queries.

use crate::config::BackboneConfig;
use crate::error::{LinkError, Result};
use crate::index::Pool;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

static GROUP_ENTRY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\S+)\((\d+(\.\d+)?)\)$").expect("valid regex"));

/// Which side of the backbone a group lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Reference,
    Target,
}

/// A named bundle of headers with softmax-normalized per-header weights.
///
/// Reference-side blocks own the group's token [`Pool`] once the reference
/// table has been ingested; target-side blocks never carry a pool (per-query
/// token lists live in the query scratch, not here).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupBlock {
    name: String,
    headers: Vec<String>,
    weights: Vec<f64>,
    pool: Option<Pool>,
}

impl GroupBlock {
    /// Build a block from parallel header/raw-weight arrays.
    ///
    /// Weights are stored softmax-normalized: `exp(w_i) / sum(exp(w_j))`.
    pub fn new(name: impl Into<String>, headers: Vec<String>, raw_weights: Vec<f64>) -> Result<Self> {
        let name = name.into();
        if headers.is_empty() {
            return Err(LinkError::InvalidGroup(format!("group '{name}' has no headers")));
        }
        if headers.len() != raw_weights.len() {
            return Err(LinkError::InvalidGroup(format!(
                "group '{name}': {} headers but {} weights",
                headers.len(),
                raw_weights.len()
            )));
        }
        let raw_sum: f64 = raw_weights.iter().sum();
        if raw_sum <= 0.0 {
            return Err(LinkError::InvalidGroup(format!(
                "group '{name}': total raw weight must be strictly positive"
            )));
        }

        let exp_sum: f64 = raw_weights.iter().map(|w| w.exp()).sum();
        let weights = raw_weights.iter().map(|w| w.exp() / exp_sum).collect();

        Ok(Self {
            name,
            headers,
            weights,
            pool: None,
        })
    }

    /// Parse a block from configuration entries like `"Customer_ID(1)"`
    pub fn from_entries(name: &str, entries: &[String]) -> Result<Self> {
        let mut headers = Vec::with_capacity(entries.len());
        let mut raw_weights = Vec::with_capacity(entries.len());
        for entry in entries {
            let (header, weight) = parse_entry(entry)?;
            headers.push(header);
            raw_weights.push(weight);
        }
        Self::new(name, headers, raw_weights)
    }

    /// Group name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Headers in configuration order
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Number of headers
    pub fn size(&self) -> usize {
        self.headers.len()
    }

    /// Softmax-normalized weight of a header, if it belongs to this group
    pub fn weight_of(&self, header: &str) -> Option<f64> {
        self.headers
            .iter()
            .position(|h| h == header)
            .map(|i| self.weights[i])
    }

    /// The group's token index, once built
    pub fn pool(&self) -> Option<&Pool> {
        self.pool.as_ref()
    }

    /// The group's token index, created on first use
    pub fn pool_mut(&mut self) -> &mut Pool {
        self.pool.get_or_insert_with(Pool::new)
    }
}

/// Parse one `Header(weight)` configuration entry
fn parse_entry(entry: &str) -> Result<(String, f64)> {
    let caps = GROUP_ENTRY.captures(entry.trim()).ok_or_else(|| {
        LinkError::Configuration(format!("malformed group entry '{entry}'"))
    })?;
    let header = caps[1].to_string();
    let weight: f64 = caps[2]
        .parse()
        .map_err(|_| LinkError::Configuration(format!("malformed weight in '{entry}'")))?;
    Ok((header, weight))
}

/// The configuration-defined routing structure between both sides
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Backbone {
    ref_groups: BTreeMap<String, GroupBlock>,
    tgt_groups: BTreeMap<String, GroupBlock>,
    ref_by_header: BTreeMap<String, Vec<String>>,
    tgt_by_header: BTreeMap<String, Vec<String>>,
    ref_to_tgt: BTreeMap<String, Vec<String>>,
    tgt_to_ref: BTreeMap<String, Vec<String>>,
    reference_key_header: String,
    target_key_header: String,
}

impl Backbone {
    /// Build the backbone from a parsed configuration section.
    ///
    /// Link keys must name a group on their own side. Link values that do
    /// not resolve on the opposite side are dropped with a warning, which
    /// permits asymmetric configurations.
    pub fn from_config(config: &BackboneConfig) -> Result<Self> {
        let ref_groups = build_groups(&config.reference_groups)?;
        let tgt_groups = build_groups(&config.target_groups)?;

        let ref_by_header = invert_headers(&ref_groups);
        let tgt_by_header = invert_headers(&tgt_groups);

        let ref_to_tgt = resolve_links(&config.ref_to_tgt, &ref_groups, &tgt_groups, "ref_to_tgt")?;
        let tgt_to_ref = resolve_links(&config.tgt_to_ref, &tgt_groups, &ref_groups, "tgt_to_ref")?;

        Ok(Self {
            ref_groups,
            tgt_groups,
            ref_by_header,
            tgt_by_header,
            ref_to_tgt,
            tgt_to_ref,
            reference_key_header: config.reference_key_col.clone(),
            target_key_header: config.target_key_col.clone(),
        })
    }

    /// Every header appearing in any group on the given side, sorted
    pub fn input_headers(&self, side: Side) -> Vec<String> {
        let by_header = match side {
            Side::Reference => &self.ref_by_header,
            Side::Target => &self.tgt_by_header,
        };
        by_header.keys().cloned().collect()
    }

    /// Group blocks containing a header on the given side
    pub fn groups_from_header(&self, header: &str, side: Side) -> Vec<&GroupBlock> {
        self.group_names_from_header(header, side)
            .iter()
            .filter_map(|name| self.groups(side).get(name))
            .collect()
    }

    /// Names of the groups containing a header on the given side
    pub fn group_names_from_header(&self, header: &str, side: Side) -> &[String] {
        let by_header = match side {
            Side::Reference => &self.ref_by_header,
            Side::Target => &self.tgt_by_header,
        };
        by_header.get(header).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Full group map for one side
    pub fn groups(&self, side: Side) -> &BTreeMap<String, GroupBlock> {
        match side {
            Side::Reference => &self.ref_groups,
            Side::Target => &self.tgt_groups,
        }
    }

    /// Mutable access to one group (index build only)
    pub fn group_mut(&mut self, side: Side, name: &str) -> Option<&mut GroupBlock> {
        match side {
            Side::Reference => self.ref_groups.get_mut(name),
            Side::Target => self.tgt_groups.get_mut(name),
        }
    }

    /// Blocks on the opposite side linked from a group, in link order
    pub fn links_from(&self, group: &str, side: Side) -> Vec<&GroupBlock> {
        let (links, other) = match side {
            Side::Reference => (&self.ref_to_tgt, &self.tgt_groups),
            Side::Target => (&self.tgt_to_ref, &self.ref_groups),
        };
        links
            .get(group)
            .map(|names| names.iter().filter_map(|n| other.get(n)).collect())
            .unwrap_or_default()
    }

    /// Key column on the reference side
    pub fn reference_key_header(&self) -> &str {
        &self.reference_key_header
    }

    /// Key column on the target side
    pub fn target_key_header(&self) -> &str {
        &self.target_key_header
    }
}

fn build_groups(raw: &BTreeMap<String, Vec<String>>) -> Result<BTreeMap<String, GroupBlock>> {
    let mut groups = BTreeMap::new();
    for (name, entries) in raw {
        groups.insert(name.clone(), GroupBlock::from_entries(name, entries)?);
    }
    Ok(groups)
}

fn invert_headers(groups: &BTreeMap<String, GroupBlock>) -> BTreeMap<String, Vec<String>> {
    let mut by_header: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, group) in groups {
        for header in group.headers() {
            by_header.entry(header.clone()).or_default().push(name.clone());
        }
    }
    by_header
}

fn resolve_links(
    raw: &BTreeMap<String, crate::config::OneOrMany>,
    own_side: &BTreeMap<String, GroupBlock>,
    other_side: &BTreeMap<String, GroupBlock>,
    section: &str,
) -> Result<BTreeMap<String, Vec<String>>> {
    let mut links = BTreeMap::new();
    for (source, targets) in raw {
        if !own_side.contains_key(source) {
            return Err(LinkError::Configuration(format!(
                "{section}: unknown group '{source}'"
            )));
        }
        let mut resolved = Vec::new();
        for linked in targets.as_vec() {
            if other_side.contains_key(&linked) {
                resolved.push(linked);
            } else {
                tracing::warn!(%section, %source, %linked, "dropping link to unknown group");
            }
        }
        links.insert(source.clone(), resolved);
    }
    Ok(links)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OneOrMany;

    fn entries(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn sample_config() -> BackboneConfig {
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

    #[test]
    fn softmax_weights_sum_to_one() {
        let group = GroupBlock::from_entries(
            "Name",
            &entries(&["Customer_Name(6)", "Industrial_Sector(2)"]),
        )
        .unwrap();

        let total: f64 = group
            .headers()
            .iter()
            .map(|h| group.weight_of(h).unwrap())
            .sum();
        assert!((total - 1.0).abs() < 1e-9);

        // the heavier raw weight dominates after softmax
        let name_w = group.weight_of("Customer_Name").unwrap();
        let sector_w = group.weight_of("Industrial_Sector").unwrap();
        assert!(name_w > sector_w);
    }

    #[test]
    fn softmax_on_single_header_is_one() {
        let group = GroupBlock::from_entries("ID", &entries(&["Customer_ID(1)"])).unwrap();
        assert!((group.weight_of("Customer_ID").unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn empty_group_is_invalid() {
        assert!(matches!(
            GroupBlock::from_entries("X", &[]),
            Err(LinkError::InvalidGroup(_))
        ));
    }

    #[test]
    fn zero_total_weight_is_invalid() {
        assert!(matches!(
            GroupBlock::from_entries("X", &entries(&["A(0)", "B(0)"])),
            Err(LinkError::InvalidGroup(_))
        ));
    }

    #[test]
    fn malformed_entry_is_a_config_error() {
        assert!(matches!(
            GroupBlock::from_entries("X", &entries(&["Customer_ID"])),
            Err(LinkError::Configuration(_))
        ));
        assert!(matches!(
            GroupBlock::from_entries("X", &entries(&["Customer_ID(abc)"])),
            Err(LinkError::Configuration(_))
        ));
    }

    #[test]
    fn decimal_weights_parse() {
        let group = GroupBlock::from_entries("X", &entries(&["A(2.5)", "B(1.0)"])).unwrap();
        assert!(group.weight_of("A").unwrap() > group.weight_of("B").unwrap());
    }

    #[test]
    fn backbone_routes_headers_to_groups() {
        let backbone = Backbone::from_config(&sample_config()).unwrap();

        let ref_name_groups: Vec<&str> = backbone
            .groups_from_header("Customer_Name", Side::Reference)
            .iter()
            .map(|g| g.name())
            .collect();
        assert_eq!(ref_name_groups, vec!["Name"]);

        let tgt_id_groups: Vec<&str> = backbone
            .groups_from_header("Customer_ID", Side::Target)
            .iter()
            .map(|g| g.name())
            .collect();
        assert_eq!(tgt_id_groups, vec!["ID", "Name"]);
    }

    #[test]
    fn links_resolve_in_configured_order() {
        let backbone = Backbone::from_config(&sample_config()).unwrap();
        let linked: Vec<&str> = backbone
            .links_from("Name", Side::Target)
            .iter()
            .map(|g| g.name())
            .collect();
        assert_eq!(linked, vec!["Name", "ID"]);
    }

    #[test]
    fn input_headers_cover_both_sides() {
        let backbone = Backbone::from_config(&sample_config()).unwrap();
        assert_eq!(
            backbone.input_headers(Side::Reference),
            vec!["Customer_ID", "Customer_Name", "Industrial_Sector"]
        );
        assert_eq!(
            backbone.input_headers(Side::Target),
            vec!["Customer_ID", "Customer_Name"]
        );
    }

    #[test]
    fn unresolvable_link_target_is_dropped() {
        let mut config = sample_config();
        config
            .tgt_to_ref
            .insert("ID".to_string(), OneOrMany::Many(vec![
                "ID".to_string(),
                "Ghost".to_string(),
            ]));

        let backbone = Backbone::from_config(&config).unwrap();
        let linked: Vec<&str> = backbone
            .links_from("ID", Side::Target)
            .iter()
            .map(|g| g.name())
            .collect();
        assert_eq!(linked, vec!["ID"]);
    }

    #[test]
    fn unknown_link_source_is_an_error() {
        let mut config = sample_config();
        config
            .ref_to_tgt
            .insert("Ghost".to_string(), OneOrMany::One("ID".to_string()));
        assert!(matches!(
            Backbone::from_config(&config),
            Err(LinkError::Configuration(_))
        ));
    }
}
