use anyhow::Result;
use std::collections::HashMap;
use std::sync::Mutex;
use wgpu::{
    Adapter, Device, Extent3d, Instance, Queue, Texture, TextureDescriptor, TextureFormat,
    TextureUsages,
};

use crunch_core::{BufferFormat, BufferRole, CrunchError, CrunchResult};

#[derive(Hash, Eq, PartialEq, Clone)]
struct TextureDescKey {
    width: u32,
    height: u32,
    format: TextureFormat,
    usage: TextureUsages,
}

/// wgpu format backing a Frame Buffer Set role.
pub fn texture_format(role: BufferRole) -> TextureFormat {
    match role.format() {
        BufferFormat::Rgba8Unorm => TextureFormat::Rgba8Unorm,
        BufferFormat::Rg32Float => TextureFormat::Rg32Float,
    }
}

/// Usage flags for a role: Result is the storage target and copy source,
/// Last is a copy destination for it, Source and Motion are uploaded.
pub fn texture_usage(role: BufferRole) -> TextureUsages {
    match role {
        BufferRole::Result => TextureUsages::STORAGE_BINDING | TextureUsages::COPY_SRC,
        BufferRole::Source | BufferRole::Last | BufferRole::Motion => {
            TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST
        }
    }
}

pub struct TexturePool {
    free_textures: Mutex<HashMap<TextureDescKey, Vec<Texture>>>,
}

impl Default for TexturePool {
    fn default() -> Self {
        Self::new()
    }
}

impl TexturePool {
    pub fn new() -> Self {
        Self {
            free_textures: Mutex::new(HashMap::new()),
        }
    }

    /// Take a texture for `role` from the pool, or create one.
    ///
    /// Creation runs inside out-of-memory and validation error scopes so a
    /// failed allocation comes back as [`CrunchError::Allocation`].
    pub fn acquire(
        &self,
        device: &Device,
        role: BufferRole,
        width: u32,
        height: u32,
    ) -> CrunchResult<Texture> {
        let key = TextureDescKey {
            width,
            height,
            format: texture_format(role),
            usage: texture_usage(role),
        };

        if let Ok(mut pool) = self.free_textures.lock() {
            if let Some(texture) = pool.get_mut(&key).and_then(Vec::pop) {
                return Ok(texture);
            }
        }

        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let texture = device.create_texture(&TextureDescriptor {
            label: Some(role.label()),
            size: Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: key.format,
            usage: key.usage,
            view_formats: &[],
        });
        let validation = pollster::block_on(device.pop_error_scope());
        let oom = pollster::block_on(device.pop_error_scope());
        if let Some(err) = oom.or(validation) {
            return Err(CrunchError::allocation(
                role.to_string(),
                width,
                height,
                err.to_string(),
            ));
        }
        Ok(texture)
    }

    pub fn release(&self, role: BufferRole, texture: Texture) {
        let key = TextureDescKey {
            width: texture.width(),
            height: texture.height(),
            format: texture_format(role),
            usage: texture_usage(role),
        };
        if let Ok(mut pool) = self.free_textures.lock() {
            pool.entry(key).or_default().push(texture);
        }
    }

    /// Number of pooled textures waiting for reuse.
    pub fn idle_count(&self) -> usize {
        self.free_textures
            .lock()
            .map(|pool| pool.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// Destroy every pooled texture whose size differs from `width × height`.
    ///
    /// Run before each allocation so the pool only holds textures of the
    /// active working size.
    pub fn retain_size(&self, width: u32, height: u32) {
        if let Ok(mut pool) = self.free_textures.lock() {
            pool.retain(|key, textures| {
                let keep = key.width == width && key.height == height;
                if !keep {
                    for texture in textures.drain(..) {
                        texture.destroy();
                    }
                }
                keep
            });
        }
    }
}

/// A shared context for all GPU-accelerated operations.
pub struct GpuContext {
    pub instance: Instance,
    pub adapter: Adapter,
    pub device: Device,
    pub queue: Queue,
    pub texture_pool: TexturePool,
}

impl GpuContext {
    /// Initializes WGPU, selecting the best available backend (Metal, Vulkan, DX12, etc.)
    pub fn init() -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        // Find the best adapter
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None, // Headless compute
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| anyhow::anyhow!("Failed to find suitable wgpu adapter"))?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Crunch Compute Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults(),
            },
            None,
        ))?;

        let info = adapter.get_info();
        tracing::info!(
            "GPU adapter: {} ({:?}, {:?})",
            info.name,
            info.device_type,
            info.backend
        );

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            texture_pool: TexturePool::new(),
        })
    }

    /// One-line adapter description.
    pub fn adapter_summary(&self) -> String {
        let info = self.adapter.get_info();
        format!("{} ({:?}, {:?})", info.name, info.device_type, info.backend)
    }
}
