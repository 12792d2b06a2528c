use winit::dpi::PhysicalSize;

/// Edge length of the fallback drawable bound while no window exists.
pub const OFFSCREEN_SIZE: u32 = 32;

/// Angular directions sampled around each pixel by the blur pass.
pub const BLUR_DIRECTIONS: u32 = 32;

/// Radial samples taken along each direction by the blur pass.
pub const BLUR_SAMPLES: u32 = 40;

/// Column-major 4×4 matrix as laid out in the shader uniform block.
pub type Mat4 = [f32; 16];

/// Identity transform used for both vertex and texture matrices by default.
pub const IDENTITY: Mat4 = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// Blur extent in normalized texture coordinates (`1.0` spans the whole frame).
///
/// The radius does not follow the output resolution. A radius tuned as "N pixels"
/// only looks like N pixels on a surface matching the reference resolution it was
/// derived from; callers that render at other sizes must rescale it themselves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlurRadius {
    pub x: f32,
    pub y: f32,
}

impl BlurRadius {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Converts a pixel extent measured against `reference` into texture space.
    pub fn from_reference_pixels(pixels: (f32, f32), reference: (u32, u32)) -> Self {
        Self {
            x: pixels.0 / reference.0.max(1) as f32,
            y: pixels.1 / reference.1.max(1) as f32,
        }
    }

    pub fn as_array(&self) -> [f32; 2] {
        [self.x, self.y]
    }
}

impl Default for BlurRadius {
    /// 30 px on a 2160×3840 portrait frame.
    fn default() -> Self {
        Self::from_reference_pixels((30.0, 30.0), (2160, 3840))
    }
}

/// Pixel layout of frames written by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrameFormat {
    /// 8-bit RGBA, always filterable.
    #[default]
    Rgba8,
    /// 32-bit float RGBA; filterable only where the adapter allows it.
    Rgba32Float,
}

impl FrameFormat {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            FrameFormat::Rgba8 => 4,
            FrameFormat::Rgba32Float => 16,
        }
    }

    pub(crate) fn texture_format(self) -> wgpu::TextureFormat {
        match self {
            FrameFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
            FrameFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
        }
    }
}

impl std::fmt::Display for FrameFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameFormat::Rgba8 => f.write_str("rgba8"),
            FrameFormat::Rgba32Float => f.write_str("rgba32f"),
        }
    }
}

/// How the blur pass reads the frame texture. Picked once per context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameSampling {
    /// Linear-filtered sampling through a filtering sampler.
    Filtered,
    /// Nearest texel fetch for formats the adapter cannot filter.
    Nearest,
}

/// GPU adapter selection preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuPowerPreference {
    #[default]
    Low,
    High,
}

/// Immutable configuration handed to the render thread at start-up.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Drawable size assumed until the host reports one.
    pub initial_size: PhysicalSize<u32>,
    /// Blur extent passed to every draw.
    pub blur_radius: BlurRadius,
    /// Flip frames vertically for sources that deliver bottom-up rows.
    pub flip_vertical: bool,
    /// Layout of frames written into the delivery target.
    pub frame_format: FrameFormat,
    /// Adapter selection preference.
    pub gpu_power: GpuPowerPreference,
}

impl Default for PipelineConfig {
    /// Portrait 720×1280 with the default blur radius.
    fn default() -> Self {
        Self {
            initial_size: PhysicalSize::new(720, 1280),
            blur_radius: BlurRadius::default(),
            flip_vertical: false,
            frame_format: FrameFormat::default(),
            gpu_power: GpuPowerPreference::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radius_is_divided_by_reference_resolution() {
        let radius = BlurRadius::from_reference_pixels((30.0, 60.0), (1000, 2000));
        assert!((radius.x - 0.03).abs() < f32::EPSILON);
        assert!((radius.y - 0.03).abs() < f32::EPSILON);
    }

    #[test]
    fn zero_reference_does_not_divide_by_zero() {
        let radius = BlurRadius::from_reference_pixels((4.0, 4.0), (0, 0));
        assert_eq!(radius.as_array(), [4.0, 4.0]);
    }

    #[test]
    fn float_frames_are_sixteen_bytes_per_pixel() {
        assert_eq!(FrameFormat::Rgba8.bytes_per_pixel(), 4);
        assert_eq!(FrameFormat::Rgba32Float.bytes_per_pixel(), 16);
    }
}
