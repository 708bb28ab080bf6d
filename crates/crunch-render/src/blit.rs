//! Host-side blits into the working buffers.
//!
//! The renderer copies the full-resolution frame into the (possibly
//! downsampled) Source buffer with the configured filter, and brings the
//! motion field to the same size. Motion vectors are in normalized units, so
//! resampling moves them around without rescaling them.

use rayon::prelude::*;

use crunch_core::frame::BYTES_PER_PIXEL;
use crunch_core::{FilterMode, FrameBuffer, MotionField};

/// Map a destination pixel centre to continuous source coordinates.
#[inline]
fn source_coord(dst: u32, dst_len: u32, src_len: u32) -> f32 {
    (dst as f32 + 0.5) * (src_len as f32 / dst_len as f32)
}

/// Resample an RGBA frame to `width × height`.
pub fn resample(src: &FrameBuffer, width: u32, height: u32, filter: FilterMode) -> FrameBuffer {
    if src.width == width && src.height == height {
        return src.clone();
    }
    let mut dst = FrameBuffer::new(width, height);
    if width == 0 || height == 0 || src.width == 0 || src.height == 0 {
        return dst;
    }
    let stride = dst.stride();
    dst.data
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, row)| {
            let sy = source_coord(y as u32, height, src.height);
            for (x, px) in row.chunks_exact_mut(BYTES_PER_PIXEL).enumerate() {
                let sx = source_coord(x as u32, width, src.width);
                let value = match filter {
                    FilterMode::Nearest => src.pixel_clamped(sx.floor() as i64, sy.floor() as i64),
                    FilterMode::Bilinear => bilinear_rgba(src, sx - 0.5, sy - 0.5),
                };
                px.copy_from_slice(&value);
            }
        });
    dst
}

fn bilinear_rgba(src: &FrameBuffer, fx: f32, fy: f32) -> [u8; 4] {
    let x0 = fx.floor();
    let y0 = fy.floor();
    let tx = fx - x0;
    let ty = fy - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);
    let c00 = src.pixel_clamped(x0, y0);
    let c10 = src.pixel_clamped(x0 + 1, y0);
    let c01 = src.pixel_clamped(x0, y0 + 1);
    let c11 = src.pixel_clamped(x0 + 1, y0 + 1);
    let mut out = [0u8; 4];
    for c in 0..4 {
        let top = c00[c] as f32 * (1.0 - tx) + c10[c] as f32 * tx;
        let bottom = c01[c] as f32 * (1.0 - tx) + c11[c] as f32 * tx;
        out[c] = (top * (1.0 - ty) + bottom * ty).round().clamp(0.0, 255.0) as u8;
    }
    out
}

/// Resample a motion field to `width × height` using point sampling.
pub fn resample_motion(src: &MotionField, width: u32, height: u32) -> MotionField {
    if src.width == width && src.height == height {
        return src.clone();
    }
    let mut dst = MotionField::zeros(width, height);
    if width == 0 || height == 0 || src.width == 0 || src.height == 0 {
        return dst;
    }
    dst.data
        .par_chunks_mut(width as usize)
        .enumerate()
        .for_each(|(y, row)| {
            let sy = source_coord(y as u32, height, src.height).floor() as i64;
            for (x, v) in row.iter_mut().enumerate() {
                let sx = source_coord(x as u32, width, src.width).floor() as i64;
                *v = src.get_clamped(sx, sy);
            }
        });
    dst
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker(width: u32, height: u32) -> FrameBuffer {
        let mut fb = FrameBuffer::new(width, height);
        for y in 0..height {
            for x in 0..width {
                let v = if (x + y) % 2 == 0 { 255 } else { 0 };
                fb.set_pixel(x, y, [v, v, v, 255]);
            }
        }
        fb
    }

    #[test]
    fn test_same_size_is_copy() {
        let src = checker(5, 3);
        assert_eq!(resample(&src, 5, 3, FilterMode::Bilinear), src);
    }

    #[test]
    fn test_nearest_halving_picks_pixels() {
        let src = checker(4, 4);
        let dst = resample(&src, 2, 2, FilterMode::Nearest);
        // Centre of dst (0,0) maps to src (1,1), which is white.
        assert_eq!(dst.get_pixel(0, 0), Some([255, 255, 255, 255]));
        assert_eq!((dst.width, dst.height), (2, 2));
    }

    #[test]
    fn test_bilinear_halving_averages() {
        let src = checker(4, 4);
        let dst = resample(&src, 2, 2, FilterMode::Bilinear);
        let px = dst.get_pixel(1, 1).unwrap();
        assert!((120..=135).contains(&px[0]), "{:?}", px);
        assert_eq!(px[3], 255);
    }

    #[test]
    fn test_motion_resample_keeps_normalized_values() {
        let mut src = MotionField::zeros(4, 4);
        for y in 0..4 {
            for x in 2..4 {
                src.set(x, y, 0.5, -0.25);
            }
        }
        let dst = resample_motion(&src, 2, 2);
        assert_eq!(dst.get(0, 0), Some([0.0, 0.0]));
        assert_eq!(dst.get(1, 1), Some([0.5, -0.25]));
    }
}
