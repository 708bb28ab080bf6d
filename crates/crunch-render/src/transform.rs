//! 8×8 block transform and coefficient thresholding.
//!
//! The transform is an orthonormal 2-D DCT-II computed separably. The
//! threshold for coefficient `(u, v)` scales with the standard JPEG
//! quantization tables, so high frequencies go first as the compression
//! threshold rises. The DC term is never zeroed: a block always keeps its
//! mean colour.

use crunch_core::{CompressionParams, PerformanceMode, BLOCK_SIZE};

pub const N: usize = BLOCK_SIZE as usize;
pub const BLOCK_LEN: usize = N * N;

/// One block of YCbCr samples, row-major.
pub type Block = [[f32; 3]; BLOCK_LEN];

/// Threshold at coefficient weight 1.0 per unit of compression threshold.
pub const THRESHOLD_SCALE: f32 = 0.05;

/// Fast-mode chroma quantization step per unit of compression threshold.
pub const CHROMA_STEP: f32 = 0.0625;

/// JPEG Annex K luminance table, row-major `[v][u]`.
pub const LUMA_QUANT: [f32; BLOCK_LEN] = [
    16.0, 11.0, 10.0, 16.0, 24.0, 40.0, 51.0, 61.0, //
    12.0, 12.0, 14.0, 19.0, 26.0, 58.0, 60.0, 55.0, //
    14.0, 13.0, 16.0, 24.0, 40.0, 57.0, 69.0, 56.0, //
    14.0, 17.0, 22.0, 29.0, 51.0, 87.0, 80.0, 62.0, //
    18.0, 22.0, 37.0, 56.0, 68.0, 109.0, 103.0, 77.0, //
    24.0, 35.0, 55.0, 64.0, 81.0, 104.0, 113.0, 92.0, //
    49.0, 64.0, 78.0, 87.0, 103.0, 121.0, 120.0, 101.0, //
    72.0, 92.0, 95.0, 98.0, 112.0, 100.0, 103.0, 99.0,
];

/// JPEG Annex K chrominance table, row-major `[v][u]`.
pub const CHROMA_QUANT: [f32; BLOCK_LEN] = [
    17.0, 18.0, 24.0, 47.0, 99.0, 99.0, 99.0, 99.0, //
    18.0, 21.0, 26.0, 66.0, 99.0, 99.0, 99.0, 99.0, //
    24.0, 26.0, 56.0, 99.0, 99.0, 99.0, 99.0, 99.0, //
    47.0, 66.0, 99.0, 99.0, 99.0, 99.0, 99.0, 99.0, //
    99.0, 99.0, 99.0, 99.0, 99.0, 99.0, 99.0, 99.0, //
    99.0, 99.0, 99.0, 99.0, 99.0, 99.0, 99.0, 99.0, //
    99.0, 99.0, 99.0, 99.0, 99.0, 99.0, 99.0, 99.0, //
    99.0, 99.0, 99.0, 99.0, 99.0, 99.0, 99.0, 99.0,
];

/// Precomputed DCT basis: `basis[k][n] = a(k) * cos((2n + 1) k π / 16)`.
#[derive(Debug, Clone)]
pub struct Dct8 {
    basis: [[f32; N]; N],
}

impl Default for Dct8 {
    fn default() -> Self {
        Self::new()
    }
}

impl Dct8 {
    pub fn new() -> Self {
        let mut basis = [[0.0f32; N]; N];
        for (k, row) in basis.iter_mut().enumerate() {
            let a = if k == 0 {
                (1.0f64 / N as f64).sqrt()
            } else {
                (2.0f64 / N as f64).sqrt()
            };
            for (n, v) in row.iter_mut().enumerate() {
                let angle = ((2 * n + 1) * k) as f64 * std::f64::consts::PI / (2 * N) as f64;
                *v = (a * angle.cos()) as f32;
            }
        }
        Self { basis }
    }

    /// Forward transform of one channel, in place.
    pub fn forward(&self, plane: &mut [f32; BLOCK_LEN]) {
        let mut tmp = [0.0f32; BLOCK_LEN];
        for y in 0..N {
            for u in 0..N {
                let mut acc = 0.0;
                for x in 0..N {
                    acc += self.basis[u][x] * plane[y * N + x];
                }
                tmp[y * N + u] = acc;
            }
        }
        for v in 0..N {
            for u in 0..N {
                let mut acc = 0.0;
                for y in 0..N {
                    acc += self.basis[v][y] * tmp[y * N + u];
                }
                plane[v * N + u] = acc;
            }
        }
    }

    /// Inverse transform of one channel, in place.
    pub fn inverse(&self, plane: &mut [f32; BLOCK_LEN]) {
        let mut tmp = [0.0f32; BLOCK_LEN];
        for v in 0..N {
            for x in 0..N {
                let mut acc = 0.0;
                for u in 0..N {
                    acc += self.basis[u][x] * plane[v * N + u];
                }
                tmp[v * N + x] = acc;
            }
        }
        for y in 0..N {
            for x in 0..N {
                let mut acc = 0.0;
                for v in 0..N {
                    acc += self.basis[v][y] * tmp[v * N + x];
                }
                plane[y * N + x] = acc;
            }
        }
    }
}

/// Zero every AC coefficient whose magnitude is below the weighted cutoff.
/// Returns how many coefficients were dropped.
pub fn threshold_coefficients(
    coeffs: &mut [f32; BLOCK_LEN],
    table: &[f32; BLOCK_LEN],
    threshold: f32,
) -> usize {
    let mut dropped = 0;
    for (i, c) in coeffs.iter_mut().enumerate().skip(1) {
        let cutoff = threshold * (table[i] / 16.0) * THRESHOLD_SCALE;
        if c.abs() < cutoff && *c != 0.0 {
            *c = 0.0;
            dropped += 1;
        }
    }
    dropped
}

/// Scalar quantization used for Fast-mode chroma.
#[inline]
pub fn quantize_scalar(v: f32, threshold: f32) -> f32 {
    let step = threshold * CHROMA_STEP;
    if step <= 0.0 {
        return v;
    }
    (v / step).round_ties_even() * step
}

/// The spatial stage for one dispatch: transform, threshold, inverse.
pub struct SpatialStage {
    dct: Dct8,
    threshold: f32,
    mode: PerformanceMode,
    active: bool,
}

impl SpatialStage {
    pub fn new(params: &CompressionParams) -> Self {
        Self {
            dct: Dct8::new(),
            threshold: params.compression_threshold,
            mode: params.performance_mode,
            active: params.spatial_active(),
        }
    }

    /// Compress a YCbCr block in place. A threshold of zero leaves it as is.
    pub fn apply(&self, block: &mut Block) {
        if !self.active {
            return;
        }
        match self.mode {
            PerformanceMode::Accurate => {
                self.transform_channel(block, 0, &LUMA_QUANT);
                self.transform_channel(block, 1, &CHROMA_QUANT);
                self.transform_channel(block, 2, &CHROMA_QUANT);
            }
            PerformanceMode::Fast => {
                self.transform_channel(block, 0, &LUMA_QUANT);
                for px in block.iter_mut() {
                    px[1] = quantize_scalar(px[1], self.threshold);
                    px[2] = quantize_scalar(px[2], self.threshold);
                }
            }
        }
    }

    fn transform_channel(&self, block: &mut Block, channel: usize, table: &[f32; BLOCK_LEN]) {
        let mut plane = [0.0f32; BLOCK_LEN];
        for (p, px) in plane.iter_mut().zip(block.iter()) {
            *p = px[channel];
        }
        self.dct.forward(&mut plane);
        threshold_coefficients(&mut plane, table, self.threshold);
        self.dct.inverse(&mut plane);
        for (px, p) in block.iter_mut().zip(plane.iter()) {
            px[channel] = *p;
        }
    }
}
