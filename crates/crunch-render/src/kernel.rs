//! CPU reference implementation of the Block Compression Kernel.
//!
//! Mirrors `compress.wgsl` block for block: each 8×8 block is loaded with
//! clamp-to-edge addressing, compressed independently, and only its
//! in-bounds pixels are written. Bands of eight rows are processed in
//! parallel with rayon; blocks share no state.

use rayon::prelude::*;

use crunch_core::color::{f32_to_unorm8, mix3, rgb_to_ycbcr, rgba8_to_rgb, ycbcr_to_rgb};
use crunch_core::frame::BYTES_PER_PIXEL;
use crunch_core::{
    CadenceDecision, CompressionParams, CrunchError, CrunchResult, FilterMode, FrameBuffer,
    MotionField,
};

use crate::transform::{Block, SpatialStage, BLOCK_LEN, N};

/// Buffer bindings for one dispatch.
#[derive(Clone, Copy)]
pub struct KernelInputs<'a> {
    pub source: &'a FrameBuffer,
    /// Only read for B-frames.
    pub last: Option<&'a FrameBuffer>,
    /// Only read for B-frames.
    pub motion: Option<&'a MotionField>,
}

/// Whether this dispatch blends with motion-compensated history.
pub fn predicts_from_history(params: &CompressionParams, decision: CadenceDecision) -> bool {
    params.use_temporal && !decision.is_i_frame()
}

/// Run the kernel over the whole frame, writing every pixel of `result`.
///
/// Mismatched or missing bindings are a programming error and come back as
/// [`CrunchError::Dispatch`].
pub fn compress_into(
    inputs: KernelInputs<'_>,
    params: &CompressionParams,
    decision: CadenceDecision,
    result: &mut FrameBuffer,
) -> CrunchResult<()> {
    let source = inputs.source;
    if !source.same_size(result) {
        return Err(CrunchError::Dispatch(format!(
            "Result is {}x{} but Source is {}x{}",
            result.width, result.height, source.width, source.height
        )));
    }
    if source.width == 0 || source.height == 0 {
        return Ok(());
    }

    let history = if predicts_from_history(params, decision) {
        let last = inputs
            .last
            .ok_or_else(|| CrunchError::Dispatch("B-frame dispatched without Last".into()))?;
        let motion = inputs
            .motion
            .ok_or_else(|| CrunchError::Dispatch("B-frame dispatched without Motion".into()))?;
        if !source.same_size(last) || motion.width != source.width || motion.height != source.height
        {
            return Err(CrunchError::Dispatch(format!(
                "buffer size mismatch: Source {}x{}, Last {}x{}, Motion {}x{}",
                source.width, source.height, last.width, last.height, motion.width, motion.height
            )));
        }
        Some(History {
            last,
            motion,
            filter: params.filter,
        })
    } else {
        None
    };

    let stage = SpatialStage::new(params);
    let groups_x = source.width.div_ceil(N as u32);
    let band_len = result.stride() * N;

    result
        .data
        .par_chunks_mut(band_len)
        .enumerate()
        .for_each(|(by, band)| {
            for bx in 0..groups_x {
                compress_block(
                    bx,
                    by as u32,
                    source,
                    history.as_ref(),
                    &stage,
                    params,
                    band,
                );
            }
        });

    Ok(())
}

/// Convenience wrapper that allocates the Result buffer.
pub fn compress(
    inputs: KernelInputs<'_>,
    params: &CompressionParams,
    decision: CadenceDecision,
) -> CrunchResult<FrameBuffer> {
    let mut result = FrameBuffer::new(inputs.source.width, inputs.source.height);
    compress_into(inputs, params, decision, &mut result)?;
    Ok(result)
}

struct History<'a> {
    last: &'a FrameBuffer,
    motion: &'a MotionField,
    filter: FilterMode,
}

impl History<'_> {
    /// Sample Last where this pixel's content was one frame ago, as YCbCr.
    fn sample(&self, x: i64, y: i64) -> [f32; 3] {
        let mv = self.motion.get_clamped(x, y);
        let w = self.last.width as f32;
        let h = self.last.height as f32;
        // Pixel-centre coordinates in Last.
        let sx = x as f32 + 0.5 - mv[0] * w;
        let sy = y as f32 + 0.5 - mv[1] * h;
        let rgb = match self.filter {
            FilterMode::Nearest => {
                rgba8_to_rgb(self.last.pixel_clamped(sx.floor() as i64, sy.floor() as i64))
            }
            FilterMode::Bilinear => {
                let fx = sx - 0.5;
                let fy = sy - 0.5;
                let x0 = fx.floor();
                let y0 = fy.floor();
                let tx = fx - x0;
                let ty = fy - y0;
                let (x0, y0) = (x0 as i64, y0 as i64);
                let c00 = rgba8_to_rgb(self.last.pixel_clamped(x0, y0));
                let c10 = rgba8_to_rgb(self.last.pixel_clamped(x0 + 1, y0));
                let c01 = rgba8_to_rgb(self.last.pixel_clamped(x0, y0 + 1));
                let c11 = rgba8_to_rgb(self.last.pixel_clamped(x0 + 1, y0 + 1));
                mix3(mix3(c00, c10, tx), mix3(c01, c11, tx), ty)
            }
        };
        rgb_to_ycbcr(rgb)
    }
}

fn compress_block(
    bx: u32,
    by: u32,
    source: &FrameBuffer,
    history: Option<&History<'_>>,
    stage: &SpatialStage,
    params: &CompressionParams,
    band: &mut [u8],
) {
    let x0 = (bx as usize * N) as i64;
    let y0 = (by as usize * N) as i64;
    let max_x = source.width as i64 - 1;
    let max_y = source.height as i64 - 1;

    let mut fresh: Block = [[0.0; 3]; BLOCK_LEN];
    let mut alpha = [0u8; BLOCK_LEN];
    for i in 0..BLOCK_LEN {
        let x = (x0 + (i % N) as i64).min(max_x);
        let y = (y0 + (i / N) as i64).min(max_y);
        let px = source.pixel_clamped(x, y);
        fresh[i] = rgb_to_ycbcr(rgba8_to_rgb(px));
        alpha[i] = px[3];
    }
    stage.apply(&mut fresh);

    let out = match history {
        Some(history) => {
            let mut raw: Block = [[0.0; 3]; BLOCK_LEN];
            for (i, h) in raw.iter_mut().enumerate() {
                let x = (x0 + (i % N) as i64).min(max_x);
                let y = (y0 + (i / N) as i64).min(max_y);
                *h = history.sample(x, y);
            }
            let mut recompressed = raw;
            stage.apply(&mut recompressed);

            let mut blended: Block = [[0.0; 3]; BLOCK_LEN];
            for i in 0..BLOCK_LEN {
                let history_term = mix3(recompressed[i], raw[i], params.bitrate_artifacts);
                blended[i] = mix3(history_term, fresh[i], params.bitrate);
            }
            blended
        }
        None => fresh,
    };

    let stride = source.width as usize * BYTES_PER_PIXEL;
    for (i, ycc) in out.iter().enumerate() {
        let x = x0 + (i % N) as i64;
        let y = (i / N) as i64;
        if x > max_x || y0 + y > max_y {
            continue;
        }
        let rgb = ycbcr_to_rgb(*ycc);
        let offset = y as usize * stride + x as usize * BYTES_PER_PIXEL;
        band[offset] = f32_to_unorm8(rgb[0]);
        band[offset + 1] = f32_to_unorm8(rgb[1]);
        band[offset + 2] = f32_to_unorm8(rgb[2]);
        band[offset + 3] = alpha[i];
    }
}
