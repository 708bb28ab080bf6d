//! # crunch-render
//!
//! The crunch compression engine. Takes host frames and produces frames
//! degraded with JPEG-style block artifacts and MPEG-style I/B-frame lag.
//! The kernel runs either on the CPU with rayon (the reference path) or as
//! a wgpu compute shader; both are driven by [`CompressionRenderer`].

pub mod backend;
pub mod blit;
pub mod gpu;
pub mod gpu_backend;
pub mod image_loader;
pub mod kernel;
pub mod renderer;
pub mod transform;

pub use backend::{CompressionBackend, CpuBackend, CpuFrameSet};
pub use gpu::GpuContext;
pub use gpu_backend::{GpuBackend, GpuFrameSet};
pub use renderer::{CompressionRenderer, FrameReport, HostFrame};
