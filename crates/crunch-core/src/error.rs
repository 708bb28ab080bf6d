/// Core error types for the crunch effect.
use std::path::PathBuf;

/// A specialized Result type for crunch operations.
pub type CrunchResult<T> = Result<T, CrunchError>;

/// Top-level error type encompassing every crunch subsystem.
#[derive(Debug, thiserror::Error)]
pub enum CrunchError {
    /// A GPU or CPU buffer could not be created. Fatal: retrying without
    /// changing anything fails the same way.
    #[error("allocation failed for {buffer} ({width}x{height}): {message}")]
    Allocation {
        buffer: String,
        width: u32,
        height: u32,
        message: String,
    },

    /// Kernel bindings were malformed (missing buffer, size mismatch).
    #[error("dispatch error: {0}")]
    Dispatch(String),

    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("config encode error: {0}")]
    ConfigEncode(#[from] toml::ser::Error),

    #[error("image error: {message} ({path:?})")]
    Image { message: String, path: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl CrunchError {
    /// Create an allocation error for a named buffer.
    pub fn allocation(
        buffer: impl Into<String>,
        width: u32,
        height: u32,
        message: impl Into<String>,
    ) -> Self {
        CrunchError::Allocation {
            buffer: buffer.into(),
            width,
            height,
            message: message.into(),
        }
    }

    /// Create an image load/save error.
    pub fn image(message: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        CrunchError::Image {
            message: message.into(),
            path: path.into(),
        }
    }
}
