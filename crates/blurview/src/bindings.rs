use renderer::{BlurRadius, FrameFormat, GpuPowerPreference, PipelineConfig};
use viewconfig::{FrameFormatSetting, PowerSetting, ViewConfig};
use winit::dpi::PhysicalSize;

use crate::cli::Args;

pub fn pipeline_config(config: &ViewConfig) -> PipelineConfig {
    let [x, y] = config.blur.radius;
    let [ref_width, ref_height] = config.blur.reference;
    PipelineConfig {
        initial_size: PhysicalSize::new(config.surface.width, config.surface.height),
        blur_radius: BlurRadius::from_reference_pixels((x, y), (ref_width, ref_height)),
        flip_vertical: config.blur.flip_vertical,
        frame_format: map_frame_format(config.gpu.frame_format),
        gpu_power: map_power(config.gpu.power),
    }
}

pub fn map_frame_format(setting: FrameFormatSetting) -> FrameFormat {
    match setting {
        FrameFormatSetting::Rgba8 => FrameFormat::Rgba8,
        FrameFormatSetting::Rgba32f => FrameFormat::Rgba32Float,
    }
}

pub fn map_power(setting: PowerSetting) -> GpuPowerPreference {
    match setting {
        PowerSetting::Low => GpuPowerPreference::Low,
        PowerSetting::High => GpuPowerPreference::High,
    }
}

/// Layers command-line flags over a loaded configuration.
pub fn apply_overrides(config: &mut ViewConfig, args: &Args) {
    if let Some(radius) = args.radius {
        config.blur.radius = radius;
    }
    if let Some(flip) = args.flip {
        config.blur.flip_vertical = flip;
    }
    if let Some((width, height)) = args.size {
        config.surface.width = width;
        config.surface.height = height;
    }
    if let Some(fps) = args.fps {
        config.source.fps = fps;
    }
    if let Some(pattern) = args.pattern {
        config.source.pattern = pattern;
    }
    if let Some(image) = &args.image {
        config.source.image = Some(image.clone());
    }
    if let Some(format) = args.frame_format {
        config.gpu.frame_format = format;
    }
    if let Some(power) = args.gpu_power {
        config.gpu.power = power;
    }
    if let Some(run_for) = args.run_for {
        config.source.run_for = Some(run_for);
    }
}
