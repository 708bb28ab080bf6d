use crate::error::{CrunchError, CrunchResult};

/// Bytes per RGBA8 pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/// A single RGBA8 image: the Source, Last and Result buffers on the CPU side.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBuffer {
    /// Raw pixel data, row-major, 4 bytes per pixel.
    pub data: Vec<u8>,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl FrameBuffer {
    /// Create a new frame buffer filled with zeros (transparent black).
    pub fn new(width: u32, height: u32) -> Self {
        let size = (width as usize) * (height as usize) * BYTES_PER_PIXEL;
        Self {
            data: vec![0u8; size],
            width,
            height,
        }
    }

    /// Like [`FrameBuffer::new`], but a size that cannot be allocated comes
    /// back as [`CrunchError::Allocation`] naming `label` instead of aborting.
    pub fn try_new(width: u32, height: u32, label: &str) -> CrunchResult<Self> {
        Ok(Self {
            data: try_filled(label, width, height, BYTES_PER_PIXEL, 0u8)?,
            width,
            height,
        })
    }

    /// Create a frame buffer filled with a single RGBA value.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixel_count = (width as usize) * (height as usize);
        let mut data = Vec::with_capacity(pixel_count * BYTES_PER_PIXEL);
        for _ in 0..pixel_count {
            data.extend_from_slice(&rgba);
        }
        Self {
            data,
            width,
            height,
        }
    }

    /// Wrap existing RGBA8 bytes. Fails if the length does not match the size.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> CrunchResult<Self> {
        let expected = (width as usize) * (height as usize) * BYTES_PER_PIXEL;
        if data.len() != expected {
            return Err(CrunchError::InvalidArgument(format!(
                "frame data is {} bytes, expected {} for {}x{}",
                data.len(),
                expected,
                width,
                height
            )));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Total number of pixels.
    pub fn pixel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// Bytes per row.
    pub fn stride(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    /// Get the RGBA value at a pixel coordinate. Returns None if out of bounds.
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize) * self.stride() + (x as usize) * BYTES_PER_PIXEL;
        Some([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
            self.data[offset + 3],
        ])
    }

    /// Get the RGBA value with clamp-to-edge addressing.
    ///
    /// Panics on an empty buffer.
    pub fn pixel_clamped(&self, x: i64, y: i64) -> [u8; 4] {
        let cx = x.clamp(0, self.width as i64 - 1) as usize;
        let cy = y.clamp(0, self.height as i64 - 1) as usize;
        let offset = cy * self.stride() + cx * BYTES_PER_PIXEL;
        [
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
            self.data[offset + 3],
        ]
    }

    /// Set the RGBA value at a pixel coordinate. No-op if out of bounds.
    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let offset = (y as usize) * self.stride() + (x as usize) * BYTES_PER_PIXEL;
        self.data[offset..offset + BYTES_PER_PIXEL].copy_from_slice(&rgba);
    }

    /// Whether two buffers have the same dimensions.
    pub fn same_size(&self, other: &FrameBuffer) -> bool {
        self.width == other.width && self.height == other.height
    }
}

/// Per-pixel motion vectors: where each pixel's content was in the previous
/// frame, as a signed offset in normalized image units.
///
/// Each axis is an independent signed channel in [-1, 1]. A vector of
/// `[0.5, 0.0]` means the content moved half the image width to the right,
/// so the previous frame is sampled half a width to the left.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionField {
    pub width: u32,
    pub height: u32,
    /// Row-major `[dx, dy]` pairs.
    pub data: Vec<[f32; 2]>,
}

impl MotionField {
    /// A field with no motion anywhere.
    pub fn zeros(width: u32, height: u32) -> Self {
        Self::uniform(width, height, 0.0, 0.0)
    }

    /// Fallible [`MotionField::zeros`].
    pub fn try_zeros(width: u32, height: u32, label: &str) -> CrunchResult<Self> {
        Ok(Self {
            width,
            height,
            data: try_filled(label, width, height, 1, [0.0; 2])?,
        })
    }

    /// A field where every pixel carries the same vector (a camera pan).
    pub fn uniform(width: u32, height: u32, dx: f32, dy: f32) -> Self {
        let v = [dx.clamp(-1.0, 1.0), dy.clamp(-1.0, 1.0)];
        Self {
            width,
            height,
            data: vec![v; (width as usize) * (height as usize)],
        }
    }

    pub fn get(&self, x: u32, y: u32) -> Option<[f32; 2]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data
            .get((y as usize) * (self.width as usize) + (x as usize))
            .copied()
    }

    /// Vector at a pixel with clamp-to-edge addressing.
    pub fn get_clamped(&self, x: i64, y: i64) -> [f32; 2] {
        let cx = x.clamp(0, self.width as i64 - 1) as usize;
        let cy = y.clamp(0, self.height as i64 - 1) as usize;
        self.data[cy * self.width as usize + cx]
    }

    /// Store a vector, clamping each axis into [-1, 1].
    pub fn set(&mut self, x: u32, y: u32, dx: f32, dy: f32) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = (y as usize) * (self.width as usize) + (x as usize);
        self.data[idx] = [dx.clamp(-1.0, 1.0), dy.clamp(-1.0, 1.0)];
    }

    /// True when no pixel moves.
    pub fn is_static(&self) -> bool {
        self.data.iter().all(|v| v[0] == 0.0 && v[1] == 0.0)
    }
}

fn try_filled<T: Clone>(
    label: &str,
    width: u32,
    height: u32,
    per_pixel: usize,
    value: T,
) -> CrunchResult<Vec<T>> {
    let len = (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(per_pixel))
        .ok_or_else(|| CrunchError::allocation(label, width, height, "size overflows usize"))?;
    let mut data = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|e| CrunchError::allocation(label, width, height, e.to_string()))?;
    data.resize(len, value);
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_new_matches_new() {
        assert_eq!(FrameBuffer::try_new(7, 3, "frame").unwrap(), FrameBuffer::new(7, 3));
        assert_eq!(MotionField::try_zeros(7, 3, "motion").unwrap(), MotionField::zeros(7, 3));
    }

    #[test]
    fn test_oversized_buffers_fail_to_allocate() {
        let err = FrameBuffer::try_new(u32::MAX, u32::MAX, "Source").unwrap_err();
        match err {
            CrunchError::Allocation { buffer, width, height, .. } => {
                assert_eq!(buffer, "Source");
                assert_eq!((width, height), (u32::MAX, u32::MAX));
            }
            other => panic!("expected an allocation error, got {other:?}"),
        }
        let err = MotionField::try_zeros(u32::MAX, u32::MAX, "Motion").unwrap_err();
        assert!(matches!(err, CrunchError::Allocation { .. }));
    }

    #[test]
    fn test_frame_buffer_new() {
        let fb = FrameBuffer::new(1920, 1080);
        assert_eq!(fb.width, 1920);
        assert_eq!(fb.height, 1080);
        assert_eq!(fb.data.len(), 1920 * 1080 * 4);
        assert_eq!(fb.pixel_count(), 1920 * 1080);
    }

    #[test]
    fn test_frame_buffer_solid() {
        let fb = FrameBuffer::solid(2, 2, [255, 0, 0, 255]);
        assert_eq!(fb.get_pixel(0, 0), Some([255, 0, 0, 255]));
        assert_eq!(fb.get_pixel(1, 1), Some([255, 0, 0, 255]));
    }

    #[test]
    fn test_frame_buffer_get_set_pixel() {
        let mut fb = FrameBuffer::new(10, 10);
        fb.set_pixel(5, 5, [128, 64, 32, 255]);
        assert_eq!(fb.get_pixel(5, 5), Some([128, 64, 32, 255]));
        assert_eq!(fb.get_pixel(10, 0), None);
        assert_eq!(fb.get_pixel(0, 10), None);
    }

    #[test]
    fn test_pixel_clamped_edges() {
        let mut fb = FrameBuffer::new(3, 3);
        fb.set_pixel(2, 2, [9, 9, 9, 9]);
        assert_eq!(fb.pixel_clamped(7, 12), [9, 9, 9, 9]);
        assert_eq!(fb.pixel_clamped(-4, -1), [0, 0, 0, 0]);
    }

    #[test]
    fn test_from_raw_rejects_bad_length() {
        assert!(FrameBuffer::from_raw(2, 2, vec![0; 15]).is_err());
        assert!(FrameBuffer::from_raw(2, 2, vec![0; 16]).is_ok());
    }

    #[test]
    fn test_motion_field_clamps_to_signed_unit_range() {
        let mut field = MotionField::zeros(4, 4);
        assert!(field.is_static());
        field.set(1, 1, 3.0, -7.5);
        assert_eq!(field.get(1, 1), Some([1.0, -1.0]));
        assert!(!field.is_static());

        let pan = MotionField::uniform(2, 2, -0.25, 0.5);
        assert_eq!(pan.get_clamped(-3, 9), [-0.25, 0.5]);
    }
}
