//! Sizing rules shared by every Frame Buffer Set implementation.

use serde::{Deserialize, Serialize};

/// Edge length of a pixel block. One block maps to one compute workgroup.
pub const BLOCK_SIZE: u32 = 8;

/// Sampling mode applied when resampling into the working buffers and when
/// fetching motion-compensated history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Point sampling; keeps blocks hard-edged.
    Nearest,
    #[default]
    Bilinear,
}

impl FilterMode {
    /// Map the `use_point_filtering` setting onto a mode.
    pub fn from_point_filtering(point: bool) -> Self {
        if point {
            FilterMode::Nearest
        } else {
            FilterMode::Bilinear
        }
    }
}

/// Per-buffer storage format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferFormat {
    /// 8-bit unsigned normalized RGBA.
    Rgba8Unorm,
    /// Two signed 32-bit float channels; motion vectors in [-1, 1].
    Rg32Float,
}

/// The four buffers of a Frame Buffer Set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferRole {
    /// This frame, untouched.
    Source,
    /// Previous output; the prediction reference.
    Last,
    /// Per-pixel motion vectors.
    Motion,
    /// Compressed output, written by the kernel.
    Result,
}

impl BufferRole {
    pub const ALL: [BufferRole; 4] = [
        BufferRole::Source,
        BufferRole::Last,
        BufferRole::Motion,
        BufferRole::Result,
    ];

    pub fn format(&self) -> BufferFormat {
        match self {
            BufferRole::Motion => BufferFormat::Rg32Float,
            _ => BufferFormat::Rgba8Unorm,
        }
    }

    /// Only Result is a random-access compute target.
    pub fn is_storage_target(&self) -> bool {
        matches!(self, BufferRole::Result)
    }

    pub fn label(&self) -> &'static str {
        match self {
            BufferRole::Source => "crunch_source",
            BufferRole::Last => "crunch_last",
            BufferRole::Motion => "crunch_motion",
            BufferRole::Result => "crunch_result",
        }
    }
}

impl std::fmt::Display for BufferRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BufferRole::Source => write!(f, "Source"),
            BufferRole::Last => write!(f, "Last"),
            BufferRole::Motion => write!(f, "Motion"),
            BufferRole::Result => write!(f, "Result"),
        }
    }
}

/// The shared size and filtering of one active buffer configuration.
///
/// Two layouts that compare unequal require the whole set to be rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferLayout {
    pub width: u32,
    pub height: u32,
    pub filter: FilterMode,
}

impl BufferLayout {
    pub fn new(width: u32, height: u32, filter: FilterMode) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            filter,
        }
    }

    /// Working size for an output resolution. The divisor is
    /// `max(1, downsampling + 1)`; each axis keeps at least one pixel.
    pub fn for_output(resolution: (u32, u32), downsampling: i32, filter: FilterMode) -> Self {
        let divisor = downsampling_divisor(downsampling);
        Self::new(resolution.0 / divisor, resolution.1 / divisor, filter)
    }

    /// Workgroup counts for one full-frame dispatch.
    pub fn dispatch_groups(&self) -> (u32, u32) {
        (
            self.width.div_ceil(BLOCK_SIZE),
            self.height.div_ceil(BLOCK_SIZE),
        )
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// `max(1, downsampling + 1)` without overflowing on extreme inputs.
pub fn downsampling_divisor(downsampling: i32) -> u32 {
    (downsampling.saturating_add(1)).max(1) as u32
}
