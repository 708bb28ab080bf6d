use crunch_core::{
    CadenceDecision, CompressionSettings, FrameBuffer, MotionField, PerformanceMode,
};
use crunch_render::{
    CompressionBackend, CompressionRenderer, CpuBackend, GpuBackend, HostFrame,
};

/// Deterministic test card: gradients plus a hard-edged checker, so both
/// smooth and high-frequency blocks are exercised.
fn test_card(width: u32, height: u32) -> FrameBuffer {
    let mut fb = FrameBuffer::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let checker = ((x / 4) + (y / 4)) % 2 == 0;
            let r = (x * 255 / width.max(1)) as u8;
            let g = (y * 255 / height.max(1)) as u8;
            let b = if checker { 230 } else { 20 };
            fb.set_pixel(x, y, [r, g, b, 255]);
        }
    }
    fb
}

fn run_sequence<B: CompressionBackend>(
    backend: B,
    settings: CompressionSettings,
    frames: &[FrameBuffer],
    motion: &MotionField,
) -> Vec<(CadenceDecision, FrameBuffer)> {
    let mut renderer = CompressionRenderer::new(backend, settings);
    frames
        .iter()
        .map(|frame| {
            let report = renderer
                .render_frame(&HostFrame::playing(frame, motion))
                .expect("render should succeed");
            let out = renderer.output().expect("readback should succeed");
            (report.decision, out)
        })
        .collect()
}

fn max_channel_diff(a: &FrameBuffer, b: &FrameBuffer) -> u8 {
    assert_eq!((a.width, a.height), (b.width, b.height));
    a.data
        .iter()
        .zip(&b.data)
        .map(|(x, y)| x.abs_diff(*y))
        .max()
        .unwrap_or(0)
}

fn mean_channel_diff(a: &FrameBuffer, b: &FrameBuffer) -> f64 {
    let total: u64 = a
        .data
        .iter()
        .zip(&b.data)
        .map(|(x, y)| x.abs_diff(*y) as u64)
        .sum();
    total as f64 / a.data.len() as f64
}

#[test]
fn test_passthrough_is_bit_identical() {
    let card = test_card(37, 21);
    let frames = vec![card.clone(), card.clone(), card.clone()];
    let motion = MotionField::uniform(37, 21, 0.1, -0.2);
    for mode in [PerformanceMode::Accurate, PerformanceMode::Fast] {
        let settings = CompressionSettings {
            performance_mode: mode,
            ..CompressionSettings::default()
        };
        for (_, out) in run_sequence(CpuBackend::new(), settings, &frames, &motion) {
            assert_eq!(out, card, "{mode} passthrough changed pixels");
        }
    }
}

#[test]
fn test_output_is_deterministic() {
    let frames: Vec<_> = (0..4u8)
        .map(|i| {
            let mut card = test_card(48, 40);
            card.set_pixel(i as u32 * 9, 7, [255, 0, i * 60, 255]);
            card
        })
        .collect();
    let motion = MotionField::uniform(48, 40, 0.05, 0.0);
    let settings = CompressionSettings {
        compression_threshold: 1.5,
        use_temporal: true,
        num_b_frames: 2,
        bitrate: 0.3,
        bitrate_artifacts: 0.5,
        ..CompressionSettings::default()
    };
    let a = run_sequence(CpuBackend::new(), settings.clone(), &frames, &motion);
    let b = run_sequence(CpuBackend::new(), settings, &frames, &motion);
    assert_eq!(a, b);
}

#[test]
fn test_stronger_threshold_loses_more_detail() {
    let card = test_card(64, 64);
    let motion = MotionField::zeros(64, 64);
    let error_at = |threshold: f32| {
        let settings = CompressionSettings {
            compression_threshold: threshold,
            ..CompressionSettings::default()
        };
        let out = run_sequence(CpuBackend::new(), settings, &[card.clone()], &motion);
        mean_channel_diff(&out[0].1, &card)
    };
    let light = error_at(0.25);
    let heavy = error_at(2.0);
    assert!(heavy > light, "heavy {heavy} should exceed light {light}");
}

#[test]
fn test_b_frames_lag_behind_a_cut() {
    let dark = FrameBuffer::solid(32, 32, [10, 10, 10, 255]);
    let bright = FrameBuffer::solid(32, 32, [240, 240, 240, 255]);
    let motion = MotionField::zeros(32, 32);
    let settings = CompressionSettings {
        use_temporal: true,
        num_b_frames: 3,
        bitrate: 0.25,
        ..CompressionSettings::default()
    };
    let frames = vec![dark.clone(), bright.clone(), bright.clone(), bright.clone(), bright.clone()];
    let out = run_sequence(CpuBackend::new(), settings, &frames, &motion);

    let decisions: String = out.iter().map(|(d, _)| d.to_string()).collect();
    assert_eq!(decisions, "IBBBI");

    // The cut fades in across the B-frames, then the I-frame snaps to it.
    let luma: Vec<u8> = out.iter().map(|(_, f)| f.get_pixel(16, 16).unwrap()[0]).collect();
    assert_eq!(luma[0], 10);
    assert!(luma[1] < luma[2] && luma[2] < luma[3] && luma[3] < 240);
    assert_eq!(luma[4], 240);
}

#[test]
fn test_gpu_matches_cpu_reference() {
    let gpu = match GpuBackend::init() {
        Ok(gpu) => gpu,
        Err(e) => {
            eprintln!("skipping GPU parity test: {e}");
            return;
        }
    };

    let frames: Vec<_> = (0..3).map(|_| test_card(45, 29)).collect();
    let motion = MotionField::uniform(45, 29, 0.08, 0.03);

    let passthrough = CompressionSettings::default();
    let cpu = run_sequence(CpuBackend::new(), passthrough.clone(), &frames, &motion);
    let gpu_out = run_sequence(gpu, passthrough, &frames, &motion);
    for ((_, c), (_, g)) in cpu.iter().zip(&gpu_out) {
        assert!(max_channel_diff(c, g) <= 1);
    }

    for mode in [PerformanceMode::Accurate, PerformanceMode::Fast] {
        let settings = CompressionSettings {
            compression_threshold: 1.0,
            performance_mode: mode,
            use_temporal: true,
            num_b_frames: 2,
            bitrate: 0.5,
            bitrate_artifacts: 0.3,
            ..CompressionSettings::default()
        };
        let gpu = GpuBackend::init().expect("adapter was available a moment ago");
        let cpu = run_sequence(CpuBackend::new(), settings.clone(), &frames, &motion);
        let gpu_out = run_sequence(gpu, settings, &frames, &motion);
        for ((cd, c), (gd, g)) in cpu.iter().zip(&gpu_out) {
            assert_eq!(cd, gd);
            let mean = mean_channel_diff(c, g);
            assert!(mean < 1.0, "{mode}: mean channel difference {mean}");
        }
    }
}

#[test]
fn test_gpu_resize_does_not_grow_texture_pool() {
    let gpu = match GpuBackend::init() {
        Ok(gpu) => gpu,
        Err(e) => {
            eprintln!("skipping GPU pool test: {e}");
            return;
        }
    };
    let mut renderer = CompressionRenderer::new(gpu, CompressionSettings::default());

    for width in (16..=56).step_by(8) {
        let frame = test_card(width, 16);
        let report = renderer
            .render_frame(&HostFrame::still(&frame))
            .expect("render should succeed");
        assert!(report.reallocated);
        let idle = renderer.backend().context().texture_pool.idle_count();
        assert_eq!(idle, 0, "pool holds {idle} stale textures at width {width}");
    }

    // Same-size rebuilds reuse pooled textures rather than stacking them up.
    let frame = test_card(56, 16);
    for _ in 0..3 {
        renderer
            .backend_mut()
            .frame_set_mut()
            .expect("set is allocated")
            .destroy(crunch_core::BufferRole::Motion);
        let report = renderer
            .render_frame(&HostFrame::still(&frame))
            .expect("render should succeed");
        assert!(report.reallocated);
        assert_eq!(renderer.backend().context().texture_pool.idle_count(), 0);
    }
}
