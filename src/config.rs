//! TOML configuration layer for the `segment` CLI, providing flag defaults overridable on the
//! command line. Grounded structurally on the serde-derived config pattern used across the wider
//! example pack (e.g. butterfly-plan's TOML-backed settings struct); the teacher itself has no
//! config file, since it never shipped a CLI front-end of its own.

use serde::Deserialize;

use crate::graph::GraphKind;

/// On-disk defaults for the `segment` CLI, merged with command-line flags (flags win).
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct SegmentationConfig {
    #[serde(default)]
    pub graph_kind: Option<ConfigGraphKind>,
    #[serde(default)]
    pub weight_fn: Option<ConfigWeightFn>,
    #[serde(default)]
    pub sigma_smooth: Option<f64>,
    #[serde(default)]
    pub random_colours: Option<bool>,
    #[serde(default)]
    pub gbs: Option<GbsConfig>,
    #[serde(default)]
    pub hmsf: Option<HmsfConfig>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct GbsConfig {
    pub k: Option<f64>,
    pub min_size: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct HmsfConfig {
    pub min_weight: Option<f64>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigGraphKind {
    Grid,
    King,
}

impl From<ConfigGraphKind> for GraphKind {
    fn from(value: ConfigGraphKind) -> Self {
        match value {
            ConfigGraphKind::Grid => GraphKind::Grid,
            ConfigGraphKind::King => GraphKind::King,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigWeightFn {
    Nn,
    Intensity,
}

impl SegmentationConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, crate::error::SegmentError> {
        Ok(toml::from_str(s)?)
    }
}
