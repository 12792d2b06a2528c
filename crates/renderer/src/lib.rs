//! Frame pipeline for blurview.
//!
//! Decoded video frames are blurred and presented onto a window surface that
//! the host view creates and destroys as it becomes visible or hidden. All GPU
//! work happens on a single render thread:
//!
//! ```text
//!   decoder ──▶ DeliveryTarget::write ──▶ FrameAvailable ─┐
//!   host view ──▶ surface_created / changed / destroyed ──┤ crossbeam channel
//!                                                         ▼
//!                        RenderThread ──▶ FramePipeline ──▶ Driver (wgpu)
//!                                          │
//!                                          └─▶ make current ▶ upload ▶ clear ▶ blur ▶ present
//! ```
//!
//! `FramePipeline` owns the window surface state machine and the frame
//! mailbox, and talks to the GPU only through the [`Driver`] trait. The
//! production driver is [`WgpuDriver`]; tests use an in-memory recorder.

mod compile;
mod driver;
mod error;
mod frames;
mod gpu;
mod pipeline;
mod runtime;
mod surface;
#[cfg(test)]
mod testing;
mod types;

pub use driver::{BlurDraw, Drawable, Driver, SurfaceId};
pub use error::RenderError;
pub use frames::{DeliveryTarget, FrameMailbox, VideoFrame};
pub use gpu::{NativeWindow, SurfaceWindow, WgpuDriver};
pub use pipeline::{FrameCounts, FramePipeline, FrameStats};
pub use runtime::RenderThread;
pub use surface::{WindowSurfaceManager, WindowSurfaceState};
pub use types::{
    BlurRadius, FrameFormat, FrameSampling, GpuPowerPreference, Mat4, PipelineConfig,
    BLUR_DIRECTIONS, BLUR_SAMPLES, IDENTITY, OFFSCREEN_SIZE,
};
