//! wgpu implementation of the frame pipeline's [`Driver`](crate::driver::Driver).
//!
//! - `context` creates the instance, adapter and device without a window and
//!   picks the pixel configuration.
//! - `offscreen` is the 32×32 drawable bound while no window exists.
//! - `texture` is the streaming frame texture the decoder's frames land in.
//! - `pipeline` compiles the blur program and records blur passes.
//! - `state` glues everything together as [`WgpuDriver`].

mod context;
mod offscreen;
mod pipeline;
mod state;
mod texture;
mod uniforms;

use std::sync::Arc;

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

pub use state::WgpuDriver;

/// Anything wgpu can build a presentable surface from.
pub trait NativeWindow: HasWindowHandle + HasDisplayHandle + Send + Sync {}

impl<T> NativeWindow for T where T: HasWindowHandle + HasDisplayHandle + Send + Sync + ?Sized {}

/// Window handle passed to [`crate::RenderThread::surface_created`]. Kept
/// alive by the surface built from it.
pub type SurfaceWindow = Arc<dyn NativeWindow>;
