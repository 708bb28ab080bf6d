use crunch_core::{
    BufferLayout, CadenceDecision, CompressionSettings, CrunchResult, FrameBuffer, FrameCadence,
    MotionField,
};

use crate::backend::CompressionBackend;

/// Context handed over by the host for one frame.
#[derive(Debug, Clone, Copy)]
pub struct HostFrame<'a> {
    /// The rendered image, at output resolution.
    pub source: &'a FrameBuffer,
    /// Motion vectors for this frame, if the host produced any.
    pub motion: Option<&'a MotionField>,
    /// True during continuous playback; false when paused or scrubbing.
    pub active_playback: bool,
    /// Output resolution `(width, height)`.
    pub resolution: (u32, u32),
}

impl<'a> HostFrame<'a> {
    /// A still frame: no motion, not playing.
    pub fn still(source: &'a FrameBuffer) -> Self {
        Self {
            source,
            motion: None,
            active_playback: false,
            resolution: (source.width, source.height),
        }
    }

    /// A playback frame at the source's own resolution.
    pub fn playing(source: &'a FrameBuffer, motion: &'a MotionField) -> Self {
        Self {
            source,
            motion: Some(motion),
            active_playback: true,
            resolution: (source.width, source.height),
        }
    }
}

/// What happened during one `render_frame`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct FrameReport {
    /// Zero-based count of frames rendered since construction.
    pub index: u64,
    pub decision: CadenceDecision,
    pub width: u32,
    pub height: u32,
    /// Whether the buffer set was rebuilt before this frame.
    pub reallocated: bool,
}

/// Per-frame orchestration: buffer lifetime, host blit, cadence and
/// dispatch, in that order.
pub struct CompressionRenderer<B: CompressionBackend> {
    backend: B,
    cadence: FrameCadence,
    settings: CompressionSettings,
    frames_rendered: u64,
}

impl<B: CompressionBackend> CompressionRenderer<B> {
    pub fn new(backend: B, settings: CompressionSettings) -> Self {
        Self {
            backend,
            cadence: FrameCadence::new(),
            settings,
            frames_rendered: 0,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn cadence(&self) -> &FrameCadence {
        &self.cadence
    }

    pub fn settings(&self) -> &CompressionSettings {
        &self.settings
    }

    /// Replace the settings. Layout-affecting changes take effect on the
    /// next frame.
    pub fn set_settings(&mut self, settings: CompressionSettings) {
        self.settings = settings;
    }

    /// Drop all buffers and return the cadence to its initial state.
    pub fn reset(&mut self) {
        self.backend.release();
        self.cadence.reset();
    }

    /// Run the effect for one frame.
    pub fn render_frame(&mut self, host: &HostFrame<'_>) -> CrunchResult<FrameReport> {
        let settings = self.settings.sanitized();
        let params = settings.params();
        let layout = BufferLayout::for_output(
            host.resolution,
            settings.screen_downsampling,
            settings.filter_mode(),
        );

        let reallocated = self.ensure_buffers(layout)?;

        self.backend.write_source(host.source)?;

        if host.active_playback && host.motion.is_none() {
            tracing::warn!("active playback without a motion field, encoding an I-frame");
        }
        let active = host.active_playback && host.motion.is_some();
        let decision = self.cadence.advance(&params, active);

        if params.use_temporal && !decision.is_i_frame() {
            if let Some(motion) = host.motion {
                self.backend.write_motion(motion)?;
            }
        }

        self.backend.dispatch(&params, decision)?;
        self.backend.copy_result_to_last()?;

        let report = FrameReport {
            index: self.frames_rendered,
            decision,
            width: layout.width,
            height: layout.height,
            reallocated,
        };
        self.frames_rendered += 1;
        tracing::debug!(
            index = report.index,
            decision = %decision,
            backend = self.backend.name(),
            "frame compressed"
        );
        Ok(report)
    }

    /// The most recent Result, in host memory.
    pub fn output(&mut self) -> CrunchResult<FrameBuffer> {
        self.backend.read_result()
    }

    /// Rebuild the set if the layout changed or a buffer went missing.
    fn ensure_buffers(&mut self, layout: BufferLayout) -> CrunchResult<bool> {
        let current = self.backend.layout();
        if current == Some(layout) && self.backend.is_complete() {
            return Ok(false);
        }
        match current {
            Some(old) if old == layout => {
                tracing::debug!("frame buffer set has a stale handle, recreating");
            }
            Some(old) => tracing::debug!(
                "resizing frame buffers {}x{} -> {}x{}",
                old.width,
                old.height,
                layout.width,
                layout.height
            ),
            None => tracing::debug!(
                "allocating frame buffers {}x{} on {}",
                layout.width,
                layout.height,
                self.backend.name()
            ),
        }
        self.backend.release();
        self.backend.allocate(layout)?;
        // Last no longer holds a valid prediction reference.
        self.cadence.reset();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CpuBackend;
    use crunch_core::{BufferRole, FilterMode};

    fn temporal_settings(num_b_frames: i32) -> CompressionSettings {
        CompressionSettings {
            use_temporal: true,
            num_b_frames,
            bitrate: 0.5,
            ..CompressionSettings::default()
        }
    }

    fn decisions(renderer: &mut CompressionRenderer<CpuBackend>, frames: usize) -> String {
        let source = FrameBuffer::solid(32, 32, [120, 80, 40, 255]);
        let motion = MotionField::zeros(32, 32);
        (0..frames)
            .map(|_| {
                renderer
                    .render_frame(&HostFrame::playing(&source, &motion))
                    .unwrap()
                    .decision
                    .to_string()
            })
            .collect()
    }

    #[test]
    fn test_downsampled_buffers() {
        let settings = CompressionSettings {
            screen_downsampling: 1,
            ..CompressionSettings::default()
        };
        let mut renderer = CompressionRenderer::new(CpuBackend::new(), settings);
        let source = FrameBuffer::solid(1920, 1080, [0, 0, 0, 255]);
        let report = renderer.render_frame(&HostFrame::still(&source)).unwrap();
        assert_eq!((report.width, report.height), (960, 540));
        assert!(report.reallocated);
        for (_, w, h) in renderer.backend().frame_set().unwrap().sizes() {
            assert_eq!((w, h), (960, 540));
        }
        let out = renderer.output().unwrap();
        assert_eq!((out.width, out.height), (960, 540));
    }

    #[test]
    fn test_cadence_through_renderer() {
        let mut renderer = CompressionRenderer::new(CpuBackend::new(), temporal_settings(8));
        assert_eq!(decisions(&mut renderer, 19), "IBBBBBBBBIBBBBBBBBI");
    }

    #[test]
    fn test_paused_frames_are_all_i_frames() {
        let mut renderer = CompressionRenderer::new(CpuBackend::new(), temporal_settings(8));
        let source = FrameBuffer::solid(16, 16, [1, 2, 3, 255]);
        let motion = MotionField::zeros(16, 16);
        for _ in 0..5 {
            let host = HostFrame {
                active_playback: false,
                ..HostFrame::playing(&source, &motion)
            };
            let report = renderer.render_frame(&host).unwrap();
            assert_eq!(report.decision, CadenceDecision::IFrame);
        }
    }

    #[test]
    fn test_missing_motion_forces_i_frames() {
        let mut renderer = CompressionRenderer::new(CpuBackend::new(), temporal_settings(4));
        let source = FrameBuffer::solid(16, 16, [1, 2, 3, 255]);
        for _ in 0..3 {
            let host = HostFrame {
                motion: None,
                active_playback: true,
                ..HostFrame::still(&source)
            };
            assert!(renderer.render_frame(&host).unwrap().decision.is_i_frame());
        }
    }

    #[test]
    fn test_resize_rebuilds_and_restarts_cadence() {
        let mut renderer = CompressionRenderer::new(CpuBackend::new(), temporal_settings(8));
        assert_eq!(decisions(&mut renderer, 3), "IBB");

        let big = FrameBuffer::solid(64, 48, [9, 9, 9, 255]);
        let motion = MotionField::zeros(64, 48);
        let report = renderer
            .render_frame(&HostFrame::playing(&big, &motion))
            .unwrap();
        assert!(report.reallocated);
        assert_eq!(report.decision, CadenceDecision::IFrame);
        assert_eq!((report.width, report.height), (64, 48));
    }

    #[test]
    fn test_filter_change_rebuilds() {
        let mut renderer = CompressionRenderer::new(CpuBackend::new(), CompressionSettings::default());
        let source = FrameBuffer::solid(16, 16, [1, 2, 3, 255]);
        renderer.render_frame(&HostFrame::still(&source)).unwrap();
        assert!(!renderer.render_frame(&HostFrame::still(&source)).unwrap().reallocated);

        renderer.set_settings(CompressionSettings {
            use_point_filtering: true,
            ..CompressionSettings::default()
        });
        assert!(renderer.render_frame(&HostFrame::still(&source)).unwrap().reallocated);
        assert_eq!(
            renderer.backend().layout().map(|l| l.filter),
            Some(FilterMode::Nearest)
        );
    }

    #[test]
    fn test_stale_buffer_is_recreated() {
        let mut renderer = CompressionRenderer::new(CpuBackend::new(), CompressionSettings::default());
        let source = FrameBuffer::solid(16, 16, [10, 20, 30, 255]);
        renderer.render_frame(&HostFrame::still(&source)).unwrap();

        renderer
            .backend_mut()
            .frame_set_mut()
            .unwrap()
            .destroy(BufferRole::Result);
        assert!(!renderer.backend().is_complete());

        let report = renderer.render_frame(&HostFrame::still(&source)).unwrap();
        assert!(report.reallocated);
        assert!(renderer.backend().is_complete());
        assert_eq!(renderer.output().unwrap(), source);
    }

    #[test]
    fn test_last_follows_result() {
        let mut renderer = CompressionRenderer::new(CpuBackend::new(), temporal_settings(8));
        decisions(&mut renderer, 2);
        let set = renderer.backend().frame_set().unwrap();
        assert_eq!(set.last, set.result);
    }

    #[test]
    fn test_reset() {
        let mut renderer = CompressionRenderer::new(CpuBackend::new(), temporal_settings(8));
        decisions(&mut renderer, 2);
        renderer.reset();
        assert_eq!(renderer.cadence().remaining(), 0);
        assert!(renderer.backend().layout().is_none());
        assert_eq!(decisions(&mut renderer, 2), "IB");
    }

    #[test]
    fn test_frame_indices_count_up() {
        let mut renderer = CompressionRenderer::new(CpuBackend::new(), CompressionSettings::default());
        let source = FrameBuffer::solid(8, 8, [0, 0, 0, 255]);
        let indices: Vec<u64> = (0..3)
            .map(|_| renderer.render_frame(&HostFrame::still(&source)).unwrap().index)
            .collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }
}
