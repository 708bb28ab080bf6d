//! Compute backends: who owns the Frame Buffer Set and runs the kernel.
//!
//! The renderer drives a backend through a fixed per-frame call order:
//! `write_source` and `write_motion`, then `dispatch`, then
//! `copy_result_to_last`. [`CpuBackend`] runs the rayon reference kernel;
//! `GpuBackend` records the same steps into a wgpu command stream.

use crunch_core::{
    BufferLayout, BufferRole, CadenceDecision, CompressionParams, CrunchError, CrunchResult,
    FrameBuffer, MotionField,
};

use crate::blit;
use crate::kernel::{self, KernelInputs};

/// Parallel block-compute dispatch plus the buffer lifecycle around it.
pub trait CompressionBackend {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Layout of the current set, if one was allocated.
    fn layout(&self) -> Option<BufferLayout>;

    /// Create all four buffers for `layout`, dropping any previous set.
    fn allocate(&mut self, layout: BufferLayout) -> CrunchResult<()>;

    /// Free all four buffers.
    fn release(&mut self);

    /// False when any buffer of the set is absent.
    fn is_complete(&self) -> bool;

    /// Blit a full-resolution frame into Source.
    fn write_source(&mut self, frame: &FrameBuffer) -> CrunchResult<()>;

    /// Populate Motion. Only called when the frame predicts from history.
    fn write_motion(&mut self, motion: &MotionField) -> CrunchResult<()>;

    /// One compression pass writing Result.
    fn dispatch(&mut self, params: &CompressionParams, decision: CadenceDecision)
        -> CrunchResult<()>;

    /// Make Result the prediction reference for the next frame.
    fn copy_result_to_last(&mut self) -> CrunchResult<()>;

    /// Read Result back into host memory.
    fn read_result(&mut self) -> CrunchResult<FrameBuffer>;
}

/// CPU-resident Frame Buffer Set.
///
/// Every slot is an `Option` so that a buffer destroyed behind the
/// renderer's back is visible as a hole rather than a dangling handle.
#[derive(Debug, Clone)]
pub struct CpuFrameSet {
    pub layout: BufferLayout,
    pub source: Option<FrameBuffer>,
    pub last: Option<FrameBuffer>,
    pub motion: Option<MotionField>,
    pub result: Option<FrameBuffer>,
}

impl CpuFrameSet {
    /// Allocate all four buffers. Fails with [`CrunchError::Allocation`]
    /// naming the first buffer that could not be created.
    pub fn allocate(layout: BufferLayout) -> CrunchResult<Self> {
        let (w, h) = (layout.width, layout.height);
        let frame = |role: BufferRole| FrameBuffer::try_new(w, h, &role.to_string());
        Ok(Self {
            layout,
            source: Some(frame(BufferRole::Source)?),
            last: Some(frame(BufferRole::Last)?),
            motion: Some(MotionField::try_zeros(w, h, &BufferRole::Motion.to_string())?),
            result: Some(frame(BufferRole::Result)?),
        })
    }

    pub fn is_complete(&self) -> bool {
        self.source.is_some() && self.last.is_some() && self.motion.is_some() && self.result.is_some()
    }

    /// Drop one buffer, as a host would when destroying a texture.
    pub fn destroy(&mut self, role: BufferRole) {
        match role {
            BufferRole::Source => self.source = None,
            BufferRole::Last => self.last = None,
            BufferRole::Motion => self.motion = None,
            BufferRole::Result => self.result = None,
        }
    }

    /// `(width, height)` of each present buffer.
    pub fn sizes(&self) -> Vec<(BufferRole, u32, u32)> {
        let mut sizes = Vec::new();
        if let Some(b) = &self.source {
            sizes.push((BufferRole::Source, b.width, b.height));
        }
        if let Some(b) = &self.last {
            sizes.push((BufferRole::Last, b.width, b.height));
        }
        if let Some(m) = &self.motion {
            sizes.push((BufferRole::Motion, m.width, m.height));
        }
        if let Some(b) = &self.result {
            sizes.push((BufferRole::Result, b.width, b.height));
        }
        sizes
    }
}

fn missing(role: BufferRole) -> CrunchError {
    CrunchError::Dispatch(format!("{} buffer is not bound", role))
}

/// Reference backend running the kernel on the CPU with rayon.
#[derive(Debug, Default)]
pub struct CpuBackend {
    set: Option<CpuFrameSet>,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self { set: None }
    }

    pub fn frame_set(&self) -> Option<&CpuFrameSet> {
        self.set.as_ref()
    }

    pub fn frame_set_mut(&mut self) -> Option<&mut CpuFrameSet> {
        self.set.as_mut()
    }

    fn set_mut(&mut self) -> CrunchResult<&mut CpuFrameSet> {
        self.set
            .as_mut()
            .ok_or_else(|| CrunchError::Dispatch("no frame buffer set allocated".into()))
    }
}

impl CompressionBackend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn layout(&self) -> Option<BufferLayout> {
        self.set.as_ref().map(|s| s.layout)
    }

    fn allocate(&mut self, layout: BufferLayout) -> CrunchResult<()> {
        self.set = None;
        self.set = Some(CpuFrameSet::allocate(layout)?);
        Ok(())
    }

    fn release(&mut self) {
        self.set = None;
    }

    fn is_complete(&self) -> bool {
        self.set.as_ref().is_some_and(CpuFrameSet::is_complete)
    }

    fn write_source(&mut self, frame: &FrameBuffer) -> CrunchResult<()> {
        let set = self.set_mut()?;
        let layout = set.layout;
        let source = set.source.as_mut().ok_or_else(|| missing(BufferRole::Source))?;
        *source = blit::resample(frame, layout.width, layout.height, layout.filter);
        Ok(())
    }

    fn write_motion(&mut self, motion: &MotionField) -> CrunchResult<()> {
        let set = self.set_mut()?;
        let layout = set.layout;
        let slot = set.motion.as_mut().ok_or_else(|| missing(BufferRole::Motion))?;
        *slot = blit::resample_motion(motion, layout.width, layout.height);
        Ok(())
    }

    fn dispatch(
        &mut self,
        params: &CompressionParams,
        decision: CadenceDecision,
    ) -> CrunchResult<()> {
        let set = self.set_mut()?;
        let source = set.source.as_ref().ok_or_else(|| missing(BufferRole::Source))?;
        let result = set.result.as_mut().ok_or_else(|| missing(BufferRole::Result))?;
        let inputs = KernelInputs {
            source,
            last: set.last.as_ref(),
            motion: set.motion.as_ref(),
        };
        kernel::compress_into(inputs, params, decision, result)
    }

    fn copy_result_to_last(&mut self) -> CrunchResult<()> {
        let set = self.set_mut()?;
        let result = set.result.as_ref().ok_or_else(|| missing(BufferRole::Result))?;
        let last = set.last.as_mut().ok_or_else(|| missing(BufferRole::Last))?;
        last.data.copy_from_slice(&result.data);
        Ok(())
    }

    fn read_result(&mut self) -> CrunchResult<FrameBuffer> {
        let set = self.set_mut()?;
        set.result.clone().ok_or_else(|| missing(BufferRole::Result))
    }
}
