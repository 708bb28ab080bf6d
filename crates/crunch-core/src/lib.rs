//! # crunch-core
//!
//! Core types for the crunch compression-artifact effect.
//! This crate holds everything that does not touch a GPU: frames and motion
//! fields, colour conversion, compression parameters and their TOML
//! configuration, buffer sizing rules, and the I/B-frame cadence controller.

pub mod cadence;
pub mod color;
pub mod config;
pub mod error;
pub mod frame;
pub mod layout;
pub mod params;

pub use cadence::{CadenceDecision, FrameCadence};
pub use config::{CompressionSettings, CrunchConfig};
pub use error::{CrunchError, CrunchResult};
pub use frame::{FrameBuffer, MotionField};
pub use layout::{BufferFormat, BufferLayout, BufferRole, FilterMode, BLOCK_SIZE};
pub use params::{CompressionParams, PerformanceMode};
