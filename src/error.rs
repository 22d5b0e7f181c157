//! Error taxonomy for the segmentation core and its CLI front-end (see SPEC_FULL.md §7).

use thiserror::Error;

/// Failures that can occur while configuring or running a segmentation.
///
/// Out-of-range vertex ids passed internally between union-find, graph, and segmenter are
/// programmer errors and are never converted into this type; they panic via slice indexing,
/// since the crate never constructs one outside its own bounds.
#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("image dimensions must be positive (got {width}x{height})")]
    NonPositiveDimensions { width: usize, height: usize },

    #[error("sigma_smooth must be >= 0 (got {0})")]
    NegativeSigma(f64),

    #[error("k must be > 0 (got {0})")]
    NonPositiveK(f64),

    #[error("min_size must be > 0")]
    NonPositiveMinSize,

    #[error("min_weight must be > 0 (got {0})")]
    NonPositiveMinWeight(f64),

    #[error("no segmentation has been run yet")]
    NoResult,

    #[cfg(feature = "image-io")]
    #[error("image I/O failed: {0}")]
    Io(#[from] image::ImageError),

    #[cfg(feature = "cli")]
    #[error("config file could not be parsed: {0}")]
    Config(#[from] toml::de::Error),

    #[cfg(feature = "cli")]
    #[error("could not read config file: {0}")]
    ReadConfig(#[from] std::io::Error),
}
