//! wgpu implementation of the Frame Buffer Set and Block Compression Kernel.
//!
//! Source and Motion are uploaded with `Queue::write_texture`, which wgpu
//! orders before any later submission. The kernel dispatch and the
//! Result → Last copy are recorded into one encoder and submitted without
//! waiting; only `read_result` blocks on a buffer map.

use std::sync::Arc;

use wgpu::util::DeviceExt;

use crunch_core::{
    BufferLayout, BufferRole, CadenceDecision, CompressionParams, CrunchError, CrunchResult,
    FilterMode, FrameBuffer, MotionField, PerformanceMode,
};

use crate::backend::CompressionBackend;
use crate::blit;
use crate::gpu::GpuContext;
use crate::kernel::predicts_from_history;

const FLAG_SPATIAL: u32 = 1;
const FLAG_PREDICT: u32 = 2;
const FLAG_BILINEAR: u32 = 4;

/// Uniform block matching `KernelUniforms` in compress.wgsl.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
struct KernelUniforms {
    threshold: f32,
    bitrate: f32,
    bitrate_artifacts: f32,
    flags: u32,
    width: u32,
    height: u32,
    pad: [u32; 2],
}

impl KernelUniforms {
    fn new(layout: BufferLayout, params: &CompressionParams, decision: CadenceDecision) -> Self {
        let mut flags = 0;
        if params.spatial_active() {
            flags |= FLAG_SPATIAL;
        }
        if predicts_from_history(params, decision) {
            flags |= FLAG_PREDICT;
        }
        if params.filter == FilterMode::Bilinear {
            flags |= FLAG_BILINEAR;
        }
        Self {
            threshold: params.compression_threshold,
            bitrate: params.bitrate,
            bitrate_artifacts: params.bitrate_artifacts,
            flags,
            width: layout.width,
            height: layout.height,
            pad: [0; 2],
        }
    }
}

/// GPU-resident Frame Buffer Set. Textures come from the context's pool.
pub struct GpuFrameSet {
    pub layout: BufferLayout,
    pub source: Option<wgpu::Texture>,
    pub last: Option<wgpu::Texture>,
    pub motion: Option<wgpu::Texture>,
    pub result: Option<wgpu::Texture>,
}

impl GpuFrameSet {
    pub fn allocate(gpu: &GpuContext, layout: BufferLayout) -> CrunchResult<Self> {
        let acquire = |role| {
            gpu.texture_pool
                .acquire(&gpu.device, role, layout.width, layout.height)
        };
        Ok(Self {
            layout,
            source: Some(acquire(BufferRole::Source)?),
            last: Some(acquire(BufferRole::Last)?),
            motion: Some(acquire(BufferRole::Motion)?),
            result: Some(acquire(BufferRole::Result)?),
        })
    }

    pub fn release(mut self, gpu: &GpuContext) {
        for role in BufferRole::ALL {
            if let Some(texture) = self.slot(role).take() {
                gpu.texture_pool.release(role, texture);
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        self.source.is_some() && self.last.is_some() && self.motion.is_some() && self.result.is_some()
    }

    /// Destroy one texture outright, as a host tearing down resources would.
    pub fn destroy(&mut self, role: BufferRole) {
        if let Some(texture) = self.slot(role).take() {
            texture.destroy();
        }
    }

    fn slot(&mut self, role: BufferRole) -> &mut Option<wgpu::Texture> {
        match role {
            BufferRole::Source => &mut self.source,
            BufferRole::Last => &mut self.last,
            BufferRole::Motion => &mut self.motion,
            BufferRole::Result => &mut self.result,
        }
    }

    fn get(&self, role: BufferRole) -> CrunchResult<&wgpu::Texture> {
        let slot = match role {
            BufferRole::Source => &self.source,
            BufferRole::Last => &self.last,
            BufferRole::Motion => &self.motion,
            BufferRole::Result => &self.result,
        };
        slot.as_ref()
            .ok_or_else(|| CrunchError::Dispatch(format!("{} texture is not bound", role)))
    }
}

/// Compute pipelines for both performance modes.
pub struct GpuCompressor {
    accurate: wgpu::ComputePipeline,
    fast: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

impl GpuCompressor {
    pub fn new(gpu: &GpuContext) -> Self {
        let shader = gpu
            .device
            .create_shader_module(wgpu::include_wgsl!("compress.wgsl"));

        let sampled = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };

        let bind_group_layout =
            gpu.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("compress_bind_group_layout"),
                    entries: &[
                        sampled(0),
                        sampled(1),
                        sampled(2),
                        wgpu::BindGroupLayoutEntry {
                            binding: 3,
                            visibility: wgpu::ShaderStages::COMPUTE,
                            ty: wgpu::BindingType::StorageTexture {
                                access: wgpu::StorageTextureAccess::WriteOnly,
                                format: wgpu::TextureFormat::Rgba8Unorm,
                                view_dimension: wgpu::TextureViewDimension::D2,
                            },
                            count: None,
                        },
                        wgpu::BindGroupLayoutEntry {
                            binding: 4,
                            visibility: wgpu::ShaderStages::COMPUTE,
                            ty: wgpu::BindingType::Buffer {
                                ty: wgpu::BufferBindingType::Uniform,
                                has_dynamic_offset: false,
                                min_binding_size: None,
                            },
                            count: None,
                        },
                    ],
                });

        let pipeline_layout = gpu
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("compress_pipeline_layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

        let pipeline = |entry_point, label| {
            gpu.device
                .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(label),
                    layout: Some(&pipeline_layout),
                    module: &shader,
                    entry_point,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                })
        };

        Self {
            accurate: pipeline("compress_accurate", "compress_accurate_pipeline"),
            fast: pipeline("compress_fast", "compress_fast_pipeline"),
            bind_group_layout,
        }
    }

    fn pipeline(&self, mode: PerformanceMode) -> &wgpu::ComputePipeline {
        match mode {
            PerformanceMode::Accurate => &self.accurate,
            PerformanceMode::Fast => &self.fast,
        }
    }

    /// Record one dispatch over the whole set into `encoder`.
    pub fn record(
        &self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        set: &GpuFrameSet,
        params: &CompressionParams,
        decision: CadenceDecision,
    ) -> CrunchResult<()> {
        let view = |role| -> CrunchResult<wgpu::TextureView> {
            let texture = set.get(role)?;
            if texture.width() != set.layout.width || texture.height() != set.layout.height {
                return Err(CrunchError::Dispatch(format!(
                    "{} texture is {}x{}, layout is {}x{}",
                    role,
                    texture.width(),
                    texture.height(),
                    set.layout.width,
                    set.layout.height
                )));
            }
            Ok(texture.create_view(&wgpu::TextureViewDescriptor::default()))
        };
        let source = view(BufferRole::Source)?;
        let last = view(BufferRole::Last)?;
        let motion = view(BufferRole::Motion)?;
        let result = view(BufferRole::Result)?;

        let uniforms = KernelUniforms::new(set.layout, params, decision);
        let params_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("compress_params_buffer"),
                contents: bytemuck::cast_slice(&[uniforms]),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("compress_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&source),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&last),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&motion),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&result),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: params_buffer.as_entire_binding(),
                },
            ],
        });

        let (groups_x, groups_y) = set.layout.dispatch_groups();
        let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("compress_pass"),
            timestamp_writes: None,
        });
        cpass.set_pipeline(self.pipeline(params.performance_mode));
        cpass.set_bind_group(0, &bind_group, &[]);
        cpass.dispatch_workgroups(groups_x, groups_y, 1);
        Ok(())
    }
}

/// Backend running the kernel as a wgpu compute shader.
pub struct GpuBackend {
    gpu: Arc<GpuContext>,
    compressor: GpuCompressor,
    set: Option<GpuFrameSet>,
    pending: Option<wgpu::CommandEncoder>,
}

impl GpuBackend {
    pub fn new(gpu: Arc<GpuContext>) -> Self {
        let compressor = GpuCompressor::new(&gpu);
        Self {
            gpu,
            compressor,
            set: None,
            pending: None,
        }
    }

    /// Initialise a device and build the pipelines.
    pub fn init() -> CrunchResult<Self> {
        let gpu = GpuContext::init().map_err(|e| {
            CrunchError::Gpu(format!("Failed to initialize WGPU context: {}", e))
        })?;
        Ok(Self::new(Arc::new(gpu)))
    }

    pub fn context(&self) -> &Arc<GpuContext> {
        &self.gpu
    }

    pub fn frame_set_mut(&mut self) -> Option<&mut GpuFrameSet> {
        self.set.as_mut()
    }

    fn set(&self) -> CrunchResult<&GpuFrameSet> {
        self.set
            .as_ref()
            .ok_or_else(|| CrunchError::Dispatch("no frame buffer set allocated".into()))
    }

    fn new_encoder(&self) -> wgpu::CommandEncoder {
        self.gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("crunch_frame_encoder"),
            })
    }

    fn submit_pending(&mut self) {
        if let Some(encoder) = self.pending.take() {
            self.gpu.queue.submit(Some(encoder.finish()));
        }
    }

    fn write_texture(&self, texture: &wgpu::Texture, bytes: &[u8], bytes_per_pixel: u32) {
        let (width, height) = (texture.width(), texture.height());
        self.gpu.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytes,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(width * bytes_per_pixel),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }
}

impl CompressionBackend for GpuBackend {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn layout(&self) -> Option<BufferLayout> {
        self.set.as_ref().map(|s| s.layout)
    }

    fn allocate(&mut self, layout: BufferLayout) -> CrunchResult<()> {
        self.release();
        self.gpu.texture_pool.retain_size(layout.width, layout.height);
        self.set = Some(GpuFrameSet::allocate(&self.gpu, layout)?);
        Ok(())
    }

    fn release(&mut self) {
        self.submit_pending();
        if let Some(set) = self.set.take() {
            set.release(&self.gpu);
        }
    }

    fn is_complete(&self) -> bool {
        self.set.as_ref().is_some_and(GpuFrameSet::is_complete)
    }

    fn write_source(&mut self, frame: &FrameBuffer) -> CrunchResult<()> {
        let set = self.set()?;
        let layout = set.layout;
        let resized = blit::resample(frame, layout.width, layout.height, layout.filter);
        self.write_texture(set.get(BufferRole::Source)?, &resized.data, 4);
        Ok(())
    }

    fn write_motion(&mut self, motion: &MotionField) -> CrunchResult<()> {
        let set = self.set()?;
        let layout = set.layout;
        let resized = blit::resample_motion(motion, layout.width, layout.height);
        self.write_texture(
            set.get(BufferRole::Motion)?,
            bytemuck::cast_slice(&resized.data),
            8,
        );
        Ok(())
    }

    fn dispatch(
        &mut self,
        params: &CompressionParams,
        decision: CadenceDecision,
    ) -> CrunchResult<()> {
        // Uploads issued since the last submit must land before this pass.
        self.submit_pending();
        let mut encoder = self.new_encoder();
        self.compressor
            .record(&self.gpu, &mut encoder, self.set()?, params, decision)?;
        self.pending = Some(encoder);
        Ok(())
    }

    fn copy_result_to_last(&mut self) -> CrunchResult<()> {
        let mut encoder = self.pending.take().unwrap_or_else(|| self.new_encoder());
        let set = self.set()?;
        let extent = wgpu::Extent3d {
            width: set.layout.width,
            height: set.layout.height,
            depth_or_array_layers: 1,
        };
        encoder.copy_texture_to_texture(
            set.get(BufferRole::Result)?.as_image_copy(),
            set.get(BufferRole::Last)?.as_image_copy(),
            extent,
        );
        self.gpu.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn read_result(&mut self) -> CrunchResult<FrameBuffer> {
        self.submit_pending();
        let set = self.set()?;
        let texture = set.get(BufferRole::Result)?;
        let (width, height) = (set.layout.width, set.layout.height);

        let unpadded = width * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;

        let readback = self.gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("crunch_result_readback"),
            size: (padded * height) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor::default());
        encoder.copy_texture_to_buffer(
            texture.as_image_copy(),
            wgpu::ImageCopyBuffer {
                buffer: &readback,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.gpu.queue.submit(Some(encoder.finish()));

        let slice = readback.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |v| {
            let _ = tx.send(v);
        });
        self.gpu.device.poll(wgpu::Maintain::Wait);

        let mapped = rx
            .recv()
            .map_err(|e| CrunchError::Gpu(format!("readback channel closed: {}", e)))?;
        mapped.map_err(|e| CrunchError::Gpu(format!("failed to map Result: {}", e)))?;

        let mut data = Vec::with_capacity((unpadded * height) as usize);
        {
            let view = slice.get_mapped_range();
            for row in view.chunks_exact(padded as usize) {
                data.extend_from_slice(&row[..unpadded as usize]);
            }
        }
        readback.unmap();

        FrameBuffer::from_raw(width, height, data)
    }
}

impl Drop for GpuBackend {
    fn drop(&mut self) {
        self.release();
    }
}
