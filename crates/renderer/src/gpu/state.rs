use std::collections::HashMap;

use tracing::{debug, warn};
use winit::dpi::PhysicalSize;

use crate::driver::{BlurDraw, Drawable, Driver, SurfaceId};
use crate::error::RenderError;
use crate::frames::VideoFrame;
use crate::types::PipelineConfig;

use super::context::GpuContext;
use super::offscreen::OffscreenSurface;
use super::pipeline::BlurProgram;
use super::texture::FrameTexture;
use super::SurfaceWindow;

struct WindowTarget {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    configured: bool,
}

/// A frame recorded between `clear_viewport` and `present`.
struct InFlightFrame {
    encoder: wgpu::CommandEncoder,
    surface_texture: Option<wgpu::SurfaceTexture>,
    view: wgpu::TextureView,
    format: wgpu::TextureFormat,
    size: PhysicalSize<u32>,
}

struct DriverState {
    // Field order is drop order: in-flight frames before surfaces before the device.
    frame: Option<InFlightFrame>,
    windows: HashMap<SurfaceId, WindowTarget>,
    program: BlurProgram,
    frame_texture: FrameTexture,
    offscreen: OffscreenSurface,
    context: GpuContext,
    current: Drawable,
    next_surface: u64,
}

/// Production [`Driver`] on top of wgpu.
pub struct WgpuDriver {
    state: Option<DriverState>,
}

impl WgpuDriver {
    /// Creates the context, the offscreen drawable, the frame texture and the
    /// blur program. The offscreen drawable starts out current.
    pub fn new(config: &PipelineConfig) -> Result<Self, RenderError> {
        let context = GpuContext::new(config)?;
        let offscreen = OffscreenSurface::new(&context.device, context.color_format);
        let frame_texture = FrameTexture::new(
            &context.device,
            &context.queue,
            context.frame_format,
            context.sampling,
        );
        let program = BlurProgram::compile(
            &context.device,
            &frame_texture,
            context.sampling,
            context.color_format,
        )?;
        debug!(
            color_format = ?context.color_format,
            sampling = ?context.sampling,
            "GPU context ready"
        );

        Ok(Self {
            state: Some(DriverState {
                frame: None,
                windows: HashMap::new(),
                program,
                frame_texture,
                offscreen,
                context,
                current: Drawable::Offscreen,
                next_surface: 0,
            }),
        })
    }

    fn state(&mut self) -> Result<&mut DriverState, RenderError> {
        self.state.as_mut().ok_or(RenderError::ContextReleased)
    }
}

impl Driver for WgpuDriver {
    type Window = SurfaceWindow;

    fn create_window_surface(&mut self, window: SurfaceWindow) -> Result<SurfaceId, RenderError> {
        let state = self.state()?;
        let surface = state
            .context
            .instance
            .create_surface(window)
            .map_err(|err| RenderError::SurfaceBind(err.to_string()))?;

        let caps = surface.get_capabilities(&state.context.adapter);
        let Some(&fallback) = caps.formats.first() else {
            return Err(RenderError::SurfaceBind(
                "surface is not supported by the selected adapter".into(),
            ));
        };
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|format| !format.is_srgb())
            .unwrap_or(fallback);
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: 1,
            height: 1,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        state.next_surface += 1;
        let id = SurfaceId::new(state.next_surface);
        state.windows.insert(
            id,
            WindowTarget {
                surface,
                config,
                configured: false,
            },
        );
        debug!(surface = id.raw(), ?format, "window surface created");
        Ok(id)
    }

    fn release_window_surface(&mut self, surface: SurfaceId) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        if state.current == Drawable::Window(surface) {
            state.frame = None;
            state.current = Drawable::Offscreen;
        }
        if state.windows.remove(&surface).is_some() {
            debug!(surface = surface.raw(), "window surface destroyed");
        }
    }

    fn make_current(&mut self, drawable: Drawable) -> Result<(), RenderError> {
        let state = self.state()?;
        if let Drawable::Window(id) = drawable {
            if !state.windows.contains_key(&id) {
                return Err(RenderError::SurfaceBind(format!(
                    "surface {} does not exist",
                    id.raw()
                )));
            }
        }
        if state.current != drawable {
            state.frame = None;
            state.current = drawable;
        }
        Ok(())
    }

    fn current(&self) -> Drawable {
        self.state
            .as_ref()
            .map_or(Drawable::Offscreen, |state| state.current)
    }

    fn upload_frame(&mut self, frame: &VideoFrame) -> Result<(), RenderError> {
        let state = self.state()?;
        state
            .frame_texture
            .upload(&state.context.device, &state.context.queue, frame)
    }

    fn clear_viewport(&mut self, size: PhysicalSize<u32>) -> Result<(), RenderError> {
        let state = self.state()?;
        state.frame = None;

        let (surface_texture, view, format, size) = match state.current {
            Drawable::Offscreen => {
                let bounds = state.offscreen.size();
                let size = PhysicalSize::new(
                    size.width.clamp(1, bounds.width),
                    size.height.clamp(1, bounds.height),
                );
                (
                    None,
                    state.offscreen.view.clone(),
                    state.offscreen.format,
                    size,
                )
            }
            Drawable::Window(id) => {
                let target = state
                    .windows
                    .get_mut(&id)
                    .ok_or_else(|| RenderError::SurfaceBind(format!("surface {} does not exist", id.raw())))?;
                let max = state.context.device.limits().max_texture_dimension_2d;
                let size = PhysicalSize::new(size.width.clamp(1, max), size.height.clamp(1, max));
                if !target.configured
                    || target.config.width != size.width
                    || target.config.height != size.height
                {
                    target.config.width = size.width;
                    target.config.height = size.height;
                    target.surface.configure(&state.context.device, &target.config);
                    target.configured = true;
                    debug!(
                        surface = id.raw(),
                        width = size.width,
                        height = size.height,
                        "configured window surface"
                    );
                }

                let texture = match target.surface.get_current_texture() {
                    Ok(texture) => texture,
                    Err(err) => {
                        if matches!(err, wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) {
                            target.configured = false;
                        }
                        return Err(err.into());
                    }
                };
                if texture.suboptimal {
                    target.configured = false;
                }
                let view = texture
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                (Some(texture), view, target.config.format, size)
            }
        };

        let mut encoder =
            state
                .context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("blurview frame encoder"),
                });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("clear pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }

        state.frame = Some(InFlightFrame {
            encoder,
            surface_texture,
            view,
            format,
            size,
        });
        Ok(())
    }

    fn draw_blur(&mut self, draw: &BlurDraw) -> Result<(), RenderError> {
        let DriverState {
            frame,
            program,
            frame_texture,
            context,
            ..
        } = self.state()?;
        let frame = frame.as_mut().ok_or(RenderError::FrameNotStarted)?;
        program.draw(
            &context.device,
            &context.queue,
            &mut frame.encoder,
            &frame.view,
            frame.format,
            frame.size,
            frame_texture,
            draw,
        )
    }

    fn present(&mut self) -> Result<(), RenderError> {
        let state = self.state()?;
        let frame = state.frame.take().ok_or(RenderError::FrameNotStarted)?;
        state
            .context
            .queue
            .submit(std::iter::once(frame.encoder.finish()));
        if let Some(texture) = frame.surface_texture {
            texture.present();
        }
        Ok(())
    }

    fn release(&mut self) {
        let Some(mut state) = self.state.take() else {
            return;
        };
        state.frame = None;
        let windows = state.windows.len();
        state.windows.clear();
        if let Err(err) = state.context.device.poll(wgpu::PollType::Wait) {
            warn!(error = %err, "failed to drain GPU queue during release");
        }
        drop(state);
        debug!(windows, "GPU context released");
    }
}

impl Drop for WgpuDriver {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
impl WgpuDriver {
    /// Copies the offscreen drawable back to the CPU, tightly packed.
    fn read_offscreen(&mut self) -> Vec<u8> {
        use crate::types::OFFSCREEN_SIZE;

        let state = self.state().expect("driver released");
        let device = &state.context.device;
        let row_bytes = OFFSCREEN_SIZE * 4;
        let padded_row = row_bytes.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("offscreen readback"),
            size: (padded_row * OFFSCREEN_SIZE) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("offscreen readback encoder"),
        });
        encoder.copy_texture_to_buffer(
            state.offscreen.texture.as_image_copy(),
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(OFFSCREEN_SIZE),
                },
            },
            wgpu::Extent3d {
                width: OFFSCREEN_SIZE,
                height: OFFSCREEN_SIZE,
                depth_or_array_layers: 1,
            },
        );
        state.context.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        slice.map_async(wgpu::MapMode::Read, |result| {
            result.expect("failed to map readback buffer");
        });
        device
            .poll(wgpu::PollType::Wait)
            .expect("failed to wait for readback");

        let mapped = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((row_bytes * OFFSCREEN_SIZE) as usize);
        for row in mapped.chunks(padded_row as usize) {
            pixels.extend_from_slice(&row[..row_bytes as usize]);
        }
        drop(mapped);
        buffer.unmap();
        pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BlurRadius, FrameFormat, FrameSampling};

    fn try_driver() -> Option<WgpuDriver> {
        try_driver_with(&PipelineConfig::default())
    }

    fn try_driver_with(config: &PipelineConfig) -> Option<WgpuDriver> {
        match WgpuDriver::new(config) {
            Ok(driver) => Some(driver),
            Err(RenderError::ContextCreation(reason)) => {
                eprintln!("skipping GPU test: {reason}");
                None
            }
            Err(other) => panic!("failed to build driver: {other}"),
        }
    }

    fn checkerboard() -> VideoFrame {
        let mut data = Vec::with_capacity(8 * 8 * 4);
        for y in 0..8u32 {
            for x in 0..8u32 {
                let value = if (x + y) % 2 == 0 { 255 } else { 0 };
                data.extend_from_slice(&[value, 64, 255 - value, 255]);
            }
        }
        VideoFrame::packed(8, 8, FrameFormat::Rgba8, data)
    }

    fn render(driver: &mut WgpuDriver, frame: &VideoFrame) -> Vec<u8> {
        render_with(driver, frame, &BlurDraw::new(BlurRadius::new(0.05, 0.05), false))
    }

    fn render_with(driver: &mut WgpuDriver, frame: &VideoFrame, draw: &BlurDraw) -> Vec<u8> {
        driver.make_current(Drawable::Offscreen).unwrap();
        driver.upload_frame(frame).unwrap();
        driver.clear_viewport(PhysicalSize::new(32, 32)).unwrap();
        driver.draw_blur(draw).unwrap();
        driver.present().unwrap();
        driver.read_offscreen()
    }

    /// RGBA at `(x, y)` of an offscreen readback, whatever the channel order.
    fn rgba_at(driver: &WgpuDriver, pixels: &[u8], x: u32, y: u32) -> [u8; 4] {
        use crate::types::OFFSCREEN_SIZE;

        let offset = ((y * OFFSCREEN_SIZE + x) * 4) as usize;
        let [a, b, c, d]: [u8; 4] = pixels[offset..offset + 4].try_into().unwrap();
        let format = driver.state.as_ref().unwrap().offscreen.format;
        if format == wgpu::TextureFormat::Bgra8Unorm {
            [c, b, a, d]
        } else {
            [a, b, c, d]
        }
    }

    /// 8×8 frame, red on the top half and blue on the bottom half.
    fn split_frame(format: FrameFormat) -> VideoFrame {
        let mut texels = Vec::with_capacity(8 * 8);
        for y in 0..8u32 {
            for _ in 0..8u32 {
                texels.push(if y < 4 { [1.0f32, 0.0, 0.0, 1.0] } else { [0.0, 0.0, 1.0, 1.0] });
            }
        }
        let data: Vec<u8> = match format {
            FrameFormat::Rgba8 => texels
                .iter()
                .flat_map(|texel| texel.map(|channel| (channel * 255.0) as u8))
                .collect(),
            FrameFormat::Rgba32Float => bytemuck::cast_slice::<[f32; 4], u8>(&texels).to_vec(),
        };
        VideoFrame::packed(8, 8, format, data)
    }

    fn is_red(pixel: [u8; 4]) -> bool {
        pixel[0] > 200 && pixel[2] < 55
    }

    fn is_blue(pixel: [u8; 4]) -> bool {
        pixel[2] > 200 && pixel[0] < 55
    }

    #[test]
    fn identical_inputs_render_identical_pixels() {
        let Some(mut first) = try_driver() else {
            return;
        };
        let frame = checkerboard();
        let once = render(&mut first, &frame);
        let twice = render(&mut first, &frame);
        assert_eq!(once, twice);
        assert!(once.iter().any(|&byte| byte != 0));

        let Some(mut second) = try_driver() else {
            return;
        };
        assert_eq!(once, render(&mut second, &frame));
    }

    #[test]
    fn flip_swaps_top_and_bottom_rows() {
        let Some(mut driver) = try_driver() else {
            return;
        };
        let frame = split_frame(FrameFormat::Rgba8);
        let sharp = BlurRadius::new(0.0, 0.0);

        let upright = render_with(&mut driver, &frame, &BlurDraw::new(sharp, false));
        assert!(is_red(rgba_at(&driver, &upright, 16, 4)));
        assert!(is_blue(rgba_at(&driver, &upright, 16, 28)));

        let flipped = render_with(&mut driver, &frame, &BlurDraw::new(sharp, true));
        assert!(is_blue(rgba_at(&driver, &flipped, 16, 4)));
        assert!(is_red(rgba_at(&driver, &flipped, 16, 28)));
    }

    #[test]
    fn blur_averages_neighbouring_texels() {
        let Some(mut driver) = try_driver() else {
            return;
        };
        let pixels = render_with(
            &mut driver,
            &checkerboard(),
            &BlurDraw::new(BlurRadius::new(0.25, 0.25), false),
        );
        let [red, green, blue, _] = rgba_at(&driver, &pixels, 16, 16);
        assert!((20..=235).contains(&red), "red {red} not blended");
        assert!((20..=235).contains(&blue), "blue {blue} not blended");
        assert!(green.abs_diff(64) <= 4);
    }

    #[test]
    fn float_frames_render_through_the_selected_sampling() {
        let config = PipelineConfig {
            frame_format: FrameFormat::Rgba32Float,
            ..PipelineConfig::default()
        };
        let Some(mut driver) = try_driver_with(&config) else {
            return;
        };
        let context = &driver.state.as_ref().unwrap().context;
        let expected = if context.device.features().contains(wgpu::Features::FLOAT32_FILTERABLE) {
            FrameSampling::Filtered
        } else {
            FrameSampling::Nearest
        };
        assert_eq!(context.sampling, expected);

        let frame = split_frame(FrameFormat::Rgba32Float);
        let sharp = BlurRadius::new(0.0, 0.0);
        let upright = render_with(&mut driver, &frame, &BlurDraw::new(sharp, false));
        assert!(is_red(rgba_at(&driver, &upright, 16, 4)));
        assert!(is_blue(rgba_at(&driver, &upright, 16, 28)));

        let flipped = render_with(&mut driver, &frame, &BlurDraw::new(sharp, true));
        assert!(is_red(rgba_at(&driver, &flipped, 16, 28)));
    }

    #[test]
    fn offscreen_size_comes_from_its_texture() {
        use crate::types::OFFSCREEN_SIZE;

        let Some(driver) = try_driver() else {
            return;
        };
        let offscreen = &driver.state.as_ref().unwrap().offscreen;
        assert_eq!(offscreen.size(), PhysicalSize::new(OFFSCREEN_SIZE, OFFSCREEN_SIZE));
    }

    #[test]
    fn draw_without_clear_is_rejected() {
        let Some(mut driver) = try_driver() else {
            return;
        };
        let err = driver
            .draw_blur(&BlurDraw::new(BlurRadius::default(), false))
            .unwrap_err();
        assert!(matches!(err, RenderError::FrameNotStarted));
    }

    #[test]
    fn unknown_surface_cannot_be_made_current() {
        let Some(mut driver) = try_driver() else {
            return;
        };
        let err = driver
            .make_current(Drawable::Window(SurfaceId::new(99)))
            .unwrap_err();
        assert!(matches!(err, RenderError::SurfaceBind(_)));
        assert_eq!(driver.current(), Drawable::Offscreen);
    }

    #[test]
    fn release_is_idempotent() {
        let Some(mut driver) = try_driver() else {
            return;
        };
        driver.release();
        driver.release();
        assert!(matches!(
            driver.make_current(Drawable::Offscreen),
            Err(RenderError::ContextReleased)
        ));
    }

    #[test]
    fn short_frame_is_rejected() {
        let Some(mut driver) = try_driver() else {
            return;
        };
        let short = VideoFrame::packed(16, 16, FrameFormat::Rgba8, vec![0u8; 10]);
        assert!(matches!(
            driver.upload_frame(&short),
            Err(RenderError::FrameSize { .. })
        ));
    }
}
