use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use crunch_core::{CompressionSettings, CrunchConfig, FrameBuffer, MotionField, PerformanceMode};
use crunch_render::image_loader::{is_supported_image, load_image, save_image};
use crunch_render::{
    blit, CompressionBackend, CompressionRenderer, CpuBackend, GpuBackend, GpuContext, HostFrame,
};

#[derive(Parser)]
#[command(
    name = "crunch",
    version,
    about = "crunch: JPEG/MPEG-style compression artifacts for images and frame sequences"
)]
struct Cli {
    /// Path to a crunch.toml (default: ./crunch.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Where the compression kernel runs
    #[arg(long, global = true, value_enum, default_value_t = BackendKind::Cpu)]
    backend: BackendKind,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    Cpu,
    Gpu,
}

/// Command-line overrides layered on top of the config file.
#[derive(clap::Args, Debug, Default)]
struct Overrides {
    /// Spatial compression threshold (0.0 - 2.0)
    #[arg(long, global = true)]
    threshold: Option<f32>,

    /// Performance mode: accurate or fast
    #[arg(long, global = true)]
    mode: Option<PerformanceMode>,

    /// Enable temporal (I/B-frame) compression
    #[arg(long, global = true)]
    temporal: bool,

    /// B-frames between I-frames
    #[arg(long, global = true)]
    b_frames: Option<i32>,

    /// Weight of the fresh frame in B-frames (1.0 = no lag)
    #[arg(long, global = true)]
    bitrate: Option<f32>,

    /// Bleed of raw history into B-frames (0.0 - 0.95)
    #[arg(long, global = true)]
    artifacts: Option<f32>,

    /// Screen downsampling; buffers are divided by downsample + 1
    #[arg(long, global = true)]
    downsample: Option<i32>,

    /// Use point filtering instead of bilinear
    #[arg(long, global = true)]
    point_filtering: bool,
}

impl Overrides {
    fn apply(&self, settings: &mut CompressionSettings) {
        if let Some(threshold) = self.threshold {
            settings.compression_threshold = threshold;
        }
        if let Some(mode) = self.mode {
            settings.performance_mode = mode;
        }
        if self.temporal {
            settings.use_temporal = true;
        }
        if let Some(n) = self.b_frames {
            settings.num_b_frames = n;
        }
        if let Some(bitrate) = self.bitrate {
            settings.bitrate = bitrate;
        }
        if let Some(artifacts) = self.artifacts {
            settings.bitrate_artifacts = artifacts;
        }
        if let Some(down) = self.downsample {
            settings.screen_downsampling = down;
        }
        if self.point_filtering {
            settings.use_point_filtering = true;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a single image (spatial only)
    Still {
        /// Input image
        #[arg()]
        input: PathBuf,

        /// Output image path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Compress a directory of numbered frames as one playback stream
    Sequence {
        /// Directory of input frames, processed in file-name order
        #[arg()]
        dir: PathBuf,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        /// Uniform motion per frame in image units, e.g. "0.01,0"
        #[arg(long, value_parser = parse_pan, allow_hyphen_values = true)]
        pan: Option<(f32, f32)>,

        /// Print one JSON line per frame
        #[arg(long)]
        report: bool,
    },

    /// Write a default crunch.toml
    Init {
        /// Destination path
        #[arg(default_value = "crunch.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Display version and GPU adapter info
    Info,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        // stdout carries the --report JSON lines.
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Still { input, output } => {
            let settings = load_settings(&cli)?;
            match cli.backend {
                BackendKind::Cpu => cmd_still(CpuBackend::new(), settings, input, output),
                BackendKind::Gpu => cmd_still(init_gpu()?, settings, input, output),
            }
        }
        Commands::Sequence {
            dir,
            output,
            pan,
            report,
        } => {
            let settings = load_settings(&cli)?;
            let pan = pan.unwrap_or((0.0, 0.0));
            match cli.backend {
                BackendKind::Cpu => {
                    cmd_sequence(CpuBackend::new(), settings, dir, output, pan, *report)
                }
                BackendKind::Gpu => cmd_sequence(init_gpu()?, settings, dir, output, pan, *report),
            }
        }
        Commands::Init { path, force } => cmd_init(path, *force),
        Commands::Info => cmd_info(),
    }
}

fn load_settings(cli: &Cli) -> Result<CompressionSettings> {
    let config = match &cli.config {
        Some(path) => CrunchConfig::load_from_file(path)
            .with_context(|| format!("failed to load config: {}", path.display()))?,
        None => {
            let default = Path::new("crunch.toml");
            if default.exists() {
                CrunchConfig::load_from_file(default).context("failed to load ./crunch.toml")?
            } else {
                CrunchConfig::default()
            }
        }
    };
    let mut settings = config.effect;
    cli.overrides.apply(&mut settings);
    Ok(settings.sanitized())
}

fn init_gpu() -> Result<GpuBackend> {
    GpuBackend::init().context("failed to initialize GPU backend (try --backend cpu)")
}

fn parse_pan(s: &str) -> Result<(f32, f32), String> {
    let (dx, dy) = s
        .split_once(',')
        .ok_or_else(|| format!("expected \"dx,dy\", got \"{}\"", s))?;
    let dx = dx.trim().parse::<f32>().map_err(|e| e.to_string())?;
    let dy = dy.trim().parse::<f32>().map_err(|e| e.to_string())?;
    Ok((dx, dy))
}

/// Blit the working-resolution Result back up to the frame's own size.
fn present(
    renderer: &mut CompressionRenderer<impl CompressionBackend>,
    frame: &FrameBuffer,
) -> Result<FrameBuffer> {
    let result = renderer.output().context("failed to read back Result")?;
    let filter = renderer.settings().filter_mode();
    Ok(blit::resample(&result, frame.width, frame.height, filter))
}

fn cmd_still(
    backend: impl CompressionBackend,
    settings: CompressionSettings,
    input: &Path,
    output: &Path,
) -> Result<()> {
    let start = Instant::now();
    let frame = load_image(input).with_context(|| format!("failed to load {}", input.display()))?;
    tracing::info!(
        "compressing {} ({}x{}) on {}",
        input.display(),
        frame.width,
        frame.height,
        backend.name()
    );

    let mut renderer = CompressionRenderer::new(backend, settings);
    renderer.render_frame(&HostFrame::still(&frame))?;
    let out = present(&mut renderer, &frame)?;
    save_image(&out, output).with_context(|| format!("failed to save {}", output.display()))?;

    tracing::info!("wrote {} in {:.2?}", output.display(), start.elapsed());
    Ok(())
}

fn list_frames(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut frames: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_supported_image(path))
        .collect();
    frames.sort();
    Ok(frames)
}

fn cmd_sequence(
    backend: impl CompressionBackend,
    settings: CompressionSettings,
    dir: &Path,
    output: &Path,
    pan: (f32, f32),
    report: bool,
) -> Result<()> {
    let frames = list_frames(dir)?;
    if frames.is_empty() {
        anyhow::bail!("no image frames found in {}", dir.display());
    }
    std::fs::create_dir_all(output)
        .with_context(|| format!("failed to create output directory: {}", output.display()))?;

    tracing::info!(
        "compressing {} frames from {} on {}",
        frames.len(),
        dir.display(),
        backend.name()
    );
    let start = Instant::now();
    let mut renderer = CompressionRenderer::new(backend, settings);
    let mut motion: Option<MotionField> = None;
    let mut i_frames = 0usize;

    for path in &frames {
        let frame = load_image(path).with_context(|| format!("failed to load {}", path.display()))?;
        let field = match motion.take() {
            Some(m) if m.width == frame.width && m.height == frame.height => m,
            _ => MotionField::uniform(frame.width, frame.height, pan.0, pan.1),
        };

        let frame_report = renderer.render_frame(&HostFrame::playing(&frame, &field))?;
        if frame_report.decision.is_i_frame() {
            i_frames += 1;
        }
        if report {
            println!("{}", serde_json::to_string(&frame_report)?);
        }

        let out = present(&mut renderer, &frame)?;
        let name = path
            .file_name()
            .with_context(|| format!("frame path has no file name: {}", path.display()))?;
        let out_path = output.join(name);
        save_image(&out, &out_path)
            .with_context(|| format!("failed to save {}", out_path.display()))?;
        motion = Some(field);
    }

    tracing::info!(
        "wrote {} frames ({} I, {} B) to {} in {:.2?}",
        frames.len(),
        i_frames,
        frames.len() - i_frames,
        output.display(),
        start.elapsed()
    );
    Ok(())
}

fn cmd_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    CrunchConfig::default()
        .save_to_file(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

fn cmd_info() -> Result<()> {
    println!("crunch {}", env!("CARGO_PKG_VERSION"));
    println!("   CPU kernel:  available");
    match GpuContext::init() {
        Ok(gpu) => println!("   GPU adapter: {}", gpu.adapter_summary()),
        Err(e) => println!("   GPU adapter: none ({})", e),
    }
    Ok(())
}
