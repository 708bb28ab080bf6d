use serde::{Deserialize, Serialize};

use crate::layout::FilterMode;

/// Which colour channels get the full block transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceMode {
    /// Transform and threshold Y, Cb and Cr.
    #[default]
    Accurate,
    /// Transform and threshold Y only; Cb/Cr get scalar quantization.
    Fast,
}

impl std::fmt::Display for PerformanceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PerformanceMode::Accurate => write!(f, "accurate"),
            PerformanceMode::Fast => write!(f, "fast"),
        }
    }
}

impl std::str::FromStr for PerformanceMode {
    type Err = crate::CrunchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "accurate" => Ok(PerformanceMode::Accurate),
            "fast" => Ok(PerformanceMode::Fast),
            other => Err(crate::CrunchError::InvalidArgument(format!(
                "unknown performance mode '{}' (expected accurate or fast)",
                other
            ))),
        }
    }
}

/// Immutable snapshot of everything one kernel dispatch needs.
///
/// Values are assumed to be in range; `CompressionSettings::params` clamps
/// them before a snapshot is taken.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressionParams {
    pub use_spatial: bool,
    /// 0.0 keeps every coefficient, 2.0 destroys most detail.
    pub compression_threshold: f32,
    pub performance_mode: PerformanceMode,
    pub use_temporal: bool,
    /// When false, B-frames run forever after the first I-frame.
    pub use_i_frames: bool,
    /// B-frames between two I-frames. Negative values count as zero.
    pub num_b_frames: i32,
    /// Weight of the fresh frame in a B-frame: 1.0 means no lag,
    /// 0.0 means the block is carried entirely from history.
    pub bitrate: f32,
    /// Fraction of raw (not re-compressed) history bled into B-frames.
    pub bitrate_artifacts: f32,
    pub filter: FilterMode,
}

impl CompressionParams {
    /// Whether the spatial stage changes anything at all.
    pub fn spatial_active(&self) -> bool {
        self.use_spatial && self.compression_threshold > 0.0
    }
}

impl Default for CompressionParams {
    fn default() -> Self {
        Self {
            use_spatial: true,
            compression_threshold: 0.0,
            performance_mode: PerformanceMode::Accurate,
            use_temporal: false,
            use_i_frames: true,
            num_b_frames: 8,
            bitrate: 1.0,
            bitrate_artifacts: 0.0,
            filter: FilterMode::Bilinear,
        }
    }
}
