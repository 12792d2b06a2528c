use wgpu::TextureFormatFeatureFlags;

use crate::error::RenderError;
use crate::types::{FrameFormat, FrameSampling, GpuPowerPreference, PipelineConfig};

/// Color formats accepted for the offscreen drawable, in order of preference.
const OFFSCREEN_FORMATS: [wgpu::TextureFormat; 2] = [
    wgpu::TextureFormat::Bgra8Unorm,
    wgpu::TextureFormat::Rgba8Unorm,
];

/// Instance, adapter, device and queue plus the chosen pixel configuration.
///
/// Created without a window so it can outlive every window surface.
pub(crate) struct GpuContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    /// Format of the offscreen drawable.
    pub color_format: wgpu::TextureFormat,
    pub frame_format: FrameFormat,
    pub sampling: FrameSampling,
}

impl GpuContext {
    pub(crate) fn new(config: &PipelineConfig) -> Result<Self, RenderError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        });

        let power_preference = match config.gpu_power {
            GpuPowerPreference::Low => wgpu::PowerPreference::LowPower,
            GpuPowerPreference::High => wgpu::PowerPreference::HighPerformance,
        };
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|err| RenderError::ContextCreation(format!("no suitable GPU adapter: {err}")))?;

        let info = adapter.get_info();
        tracing::debug!(
            name = %info.name,
            backend = ?info.backend,
            device_type = ?info.device_type,
            "selected GPU adapter"
        );

        let color_format = OFFSCREEN_FORMATS
            .into_iter()
            .find(|format| {
                adapter
                    .get_texture_format_features(*format)
                    .allowed_usages
                    .contains(wgpu::TextureUsages::RENDER_ATTACHMENT)
            })
            .ok_or_else(|| {
                RenderError::ContextCreation("no renderable 8-bit RGBA color format".into())
            })?;

        let (sampling, required_features) = frame_sampling(&adapter, config.frame_format);
        tracing::debug!(
            ?color_format,
            frame_format = %config.frame_format,
            ?sampling,
            "pixel configuration chosen"
        );

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("blurview device"),
            required_features,
            required_limits: adapter.limits(),
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            trace: wgpu::Trace::default(),
        }))
        .map_err(|err| RenderError::ContextCreation(format!("failed to create GPU device: {err}")))?;

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            color_format,
            frame_format: config.frame_format,
            sampling,
        })
    }
}

/// Whether the blur pass can filter `format`, and the features that requires.
fn frame_sampling(
    adapter: &wgpu::Adapter,
    format: FrameFormat,
) -> (FrameSampling, wgpu::Features) {
    match format {
        FrameFormat::Rgba8 => {
            let filterable = adapter
                .get_texture_format_features(format.texture_format())
                .flags
                .contains(TextureFormatFeatureFlags::FILTERABLE);
            if filterable {
                (FrameSampling::Filtered, wgpu::Features::empty())
            } else {
                (FrameSampling::Nearest, wgpu::Features::empty())
            }
        }
        FrameFormat::Rgba32Float => {
            if adapter
                .features()
                .contains(wgpu::Features::FLOAT32_FILTERABLE)
            {
                (FrameSampling::Filtered, wgpu::Features::FLOAT32_FILTERABLE)
            } else {
                tracing::debug!("adapter cannot filter rgba32f; using nearest texel fetch");
                (FrameSampling::Nearest, wgpu::Features::empty())
            }
        }
    }
}
