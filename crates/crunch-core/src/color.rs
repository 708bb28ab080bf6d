//! Colour conversions used by the block transform.
//!
//! The kernel works in full-range JFIF YCbCr with the chroma channels centred
//! on zero, so that a flat grey block has no chroma energy at all.

/// Convert an RGB triple in [0, 1] to `[Y, Cb, Cr]` (Cb/Cr centred on 0).
#[inline]
pub fn rgb_to_ycbcr(rgb: [f32; 3]) -> [f32; 3] {
    let [r, g, b] = rgb;
    [
        0.299 * r + 0.587 * g + 0.114 * b,
        -0.168_736 * r - 0.331_264 * g + 0.5 * b,
        0.5 * r - 0.418_688 * g - 0.081_312 * b,
    ]
}

/// Inverse of [`rgb_to_ycbcr`]. The result is not clamped.
#[inline]
pub fn ycbcr_to_rgb(ycc: [f32; 3]) -> [f32; 3] {
    let [y, cb, cr] = ycc;
    [
        y + 1.402 * cr,
        y - 0.344_136 * cb - 0.714_136 * cr,
        y + 1.772 * cb,
    ]
}

/// Decode an 8-bit UNORM channel.
#[inline]
pub fn unorm8_to_f32(v: u8) -> f32 {
    v as f32 / 255.0
}

/// Encode a float into an 8-bit UNORM channel, rounding to nearest and
/// clamping like a GPU `rgba8unorm` store.
#[inline]
pub fn f32_to_unorm8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Decode the RGB part of an RGBA8 pixel.
#[inline]
pub fn rgba8_to_rgb(px: [u8; 4]) -> [f32; 3] {
    [unorm8_to_f32(px[0]), unorm8_to_f32(px[1]), unorm8_to_f32(px[2])]
}

/// Linear interpolation of three channels in the WGSL `mix` form, so both
/// endpoints are exact: `t = 0` gives `a`, `t = 1` gives `b`.
#[inline]
pub fn mix3(a: [f32; 3], b: [f32; 3], t: f32) -> [f32; 3] {
    let s = 1.0 - t;
    [a[0] * s + b[0] * t, a[1] * s + b[1] * t, a[2] * s + b[2] * t]
}
