//! Image file I/O.
//! Decodes PNG, JPEG, WebP, and other formats into FrameBuffers and writes
//! results back out.

use std::path::Path;

use crunch_core::{CrunchError, CrunchResult, FrameBuffer};

/// Load an image file and convert it to an RGBA8 FrameBuffer.
pub fn load_image(path: &Path) -> CrunchResult<FrameBuffer> {
    let img = image::open(path).map_err(|e| {
        CrunchError::image(
            format!("failed to load image '{}': {}", path.display(), e),
            path,
        )
    })?;

    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    FrameBuffer::from_raw(width, height, rgba.into_raw())
}

/// Write a FrameBuffer to disk; the format follows the file extension.
pub fn save_image(frame: &FrameBuffer, path: &Path) -> CrunchResult<()> {
    let img = image::RgbaImage::from_raw(frame.width, frame.height, frame.data.clone())
        .ok_or_else(|| CrunchError::image("frame data does not match its size", path))?;
    img.save(path).map_err(|e| {
        CrunchError::image(
            format!("failed to save image '{}': {}", path.display(), e),
            path,
        )
    })
}

/// Whether a path looks like an image this loader can decode.
pub fn is_supported_image(path: &Path) -> bool {
    image::ImageFormat::from_path(path)
        .map(|f| f.can_read())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_png_save_and_reload() {
        let mut fb = FrameBuffer::solid(3, 2, [10, 20, 30, 255]);
        fb.set_pixel(2, 1, [200, 100, 50, 128]);
        let path = std::env::temp_dir().join("crunch_image_loader_test.png");
        save_image(&fb, &path).unwrap();
        let loaded = load_image(&path).unwrap();
        assert_eq!(loaded, fb);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_missing_file_is_image_error() {
        let err = load_image(Path::new("/definitely/not/here.png")).unwrap_err();
        assert!(matches!(err, CrunchError::Image { .. }));
    }

    #[test]
    fn test_supported_extensions() {
        assert!(is_supported_image(Path::new("frame_0001.png")));
        assert!(is_supported_image(Path::new("frame.JPG")));
        assert!(!is_supported_image(Path::new("notes.txt")));
    }
}
