//! The GPU operations the frame pipeline issues, in the order a draw needs them.
//!
//! [`crate::gpu::WgpuDriver`] is the production implementation. Everything on
//! this trait runs on the render thread only.

use winit::dpi::PhysicalSize;

use crate::error::RenderError;
use crate::frames::VideoFrame;
use crate::types::{BlurRadius, Mat4, IDENTITY};

/// Identifies a window surface created by a [`Driver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(u64);

impl SurfaceId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// What the context is currently bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Drawable {
    #[default]
    Offscreen,
    Window(SurfaceId),
}

/// Per-draw inputs to the blur pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlurDraw {
    pub radius: BlurRadius,
    pub flip_vertical: bool,
    pub vertex_transform: Mat4,
    pub texture_transform: Mat4,
}

impl BlurDraw {
    /// Identity transforms for both vertices and texture coordinates.
    pub fn new(radius: BlurRadius, flip_vertical: bool) -> Self {
        Self {
            radius,
            flip_vertical,
            vertex_transform: IDENTITY,
            texture_transform: IDENTITY,
        }
    }
}

pub trait Driver {
    /// Native window handle accepted by [`Driver::create_window_surface`].
    type Window: Send + 'static;

    /// Wraps `window` in a presentable surface. Does not make it current.
    fn create_window_surface(&mut self, window: Self::Window) -> Result<SurfaceId, RenderError>;

    /// Destroys a surface. Unknown ids are ignored. If the surface was current,
    /// the offscreen drawable becomes current.
    fn release_window_surface(&mut self, surface: SurfaceId);

    /// Binds the context to `drawable`; later clears, draws and presents target it.
    fn make_current(&mut self, drawable: Drawable) -> Result<(), RenderError>;

    /// The drawable subsequent commands target.
    fn current(&self) -> Drawable;

    /// Uploads `frame` into the external frame texture.
    fn upload_frame(&mut self, frame: &VideoFrame) -> Result<(), RenderError>;

    /// Starts a frame on the current drawable cleared to `size`.
    fn clear_viewport(&mut self, size: PhysicalSize<u32>) -> Result<(), RenderError>;

    /// Runs the blur pass over the external frame texture.
    fn draw_blur(&mut self, draw: &BlurDraw) -> Result<(), RenderError>;

    /// Submits the recorded frame and shows it on the current drawable.
    fn present(&mut self) -> Result<(), RenderError>;

    /// Releases every GPU resource. Idempotent.
    fn release(&mut self);
}
