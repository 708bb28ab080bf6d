use serde::{Deserialize, Serialize};

use crate::error::CrunchResult;
use crate::layout::FilterMode;
use crate::params::{CompressionParams, PerformanceMode};

/// User-facing effect settings, as stored in `crunch.toml`.
///
/// This is the configuration layer in front of the kernel: values may be out
/// of range here and are clamped by [`CompressionSettings::sanitized`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CompressionSettings {
    /// Output resolution is divided by this + 1 before compression.
    pub screen_downsampling: i32,
    pub use_point_filtering: bool,
    pub use_spatial: bool,
    /// 0.0 is no compression, 2.0 is extreme compression.
    pub compression_threshold: f32,
    pub performance_mode: PerformanceMode,
    pub use_temporal: bool,
    pub use_i_frames: bool,
    pub num_b_frames: i32,
    /// 1.0 is no lag, 0.0 is a lot of lag.
    pub bitrate: f32,
    pub bitrate_artifacts: f32,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            screen_downsampling: 0,
            use_point_filtering: false,
            use_spatial: true,
            compression_threshold: 0.0,
            performance_mode: PerformanceMode::Accurate,
            use_temporal: false,
            use_i_frames: true,
            num_b_frames: 8,
            bitrate: 1.0,
            bitrate_artifacts: 0.0,
        }
    }
}

impl CompressionSettings {
    pub const MAX_THRESHOLD: f32 = 2.0;
    pub const MAX_ARTIFACTS: f32 = 0.95;

    /// Clamp every field into its documented range. NaN becomes the
    /// field's lower bound.
    pub fn sanitized(&self) -> Self {
        Self {
            screen_downsampling: self.screen_downsampling.max(0),
            compression_threshold: clamp_or_min(self.compression_threshold, 0.0, Self::MAX_THRESHOLD),
            num_b_frames: self.num_b_frames.max(0),
            bitrate: clamp_or_min(self.bitrate, 0.0, 1.0),
            bitrate_artifacts: clamp_or_min(self.bitrate_artifacts, 0.0, Self::MAX_ARTIFACTS),
            ..self.clone()
        }
    }

    pub fn filter_mode(&self) -> FilterMode {
        FilterMode::from_point_filtering(self.use_point_filtering)
    }

    /// Snapshot for one dispatch, clamped.
    pub fn params(&self) -> CompressionParams {
        let s = self.sanitized();
        CompressionParams {
            use_spatial: s.use_spatial,
            compression_threshold: s.compression_threshold,
            performance_mode: s.performance_mode,
            use_temporal: s.use_temporal,
            use_i_frames: s.use_i_frames,
            num_b_frames: s.num_b_frames,
            bitrate: s.bitrate,
            bitrate_artifacts: s.bitrate_artifacts,
            filter: s.filter_mode(),
        }
    }
}

fn clamp_or_min(v: f32, min: f32, max: f32) -> f32 {
    if v.is_nan() {
        min
    } else {
        v.clamp(min, max)
    }
}

/// Contents of a `crunch.toml` file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct CrunchConfig {
    #[serde(default)]
    pub effect: CompressionSettings,
}

impl CrunchConfig {
    pub fn from_toml_str(contents: &str) -> CrunchResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn load_from_file(path: &std::path::Path) -> CrunchResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        tracing::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save_to_file(&self, path: &std::path::Path) -> CrunchResult<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}
