use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, trace, warn};
use winit::dpi::PhysicalSize;

use crate::driver::{BlurDraw, Driver, SurfaceId};
use crate::error::RenderError;
use crate::frames::FrameMailbox;
use crate::surface::{WindowSurfaceManager, WindowSurfaceState};
use crate::types::PipelineConfig;

/// Frame outcome counters, readable from any thread.
#[derive(Debug, Default)]
pub struct FrameStats {
    presented: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameCounts {
    /// Frames drawn and shown on a window surface.
    pub presented: u64,
    /// Frame tokens that arrived with no window surface bound.
    pub dropped: u64,
    /// Draws abandoned because a GPU step failed.
    pub failed: u64,
}

impl FrameStats {
    pub fn snapshot(&self) -> FrameCounts {
        FrameCounts {
            presented: self.presented.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    fn record_presented(&self) {
        self.presented.fetch_add(1, Ordering::Relaxed);
    }

    fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Everything the render thread owns: the driver, the window surface state
/// and the frame mailbox. Every method must be called from that thread.
pub struct FramePipeline<D: Driver> {
    driver: D,
    surfaces: WindowSurfaceManager,
    mailbox: FrameMailbox,
    draw: BlurDraw,
    stats: Arc<FrameStats>,
    released: bool,
}

impl<D: Driver> FramePipeline<D> {
    pub fn new(
        driver: D,
        mailbox: FrameMailbox,
        config: &PipelineConfig,
        stats: Arc<FrameStats>,
    ) -> Self {
        Self {
            driver,
            surfaces: WindowSurfaceManager::new(config.initial_size),
            mailbox,
            draw: BlurDraw::new(config.blur_radius, config.flip_vertical),
            stats,
            released: false,
        }
    }

    pub fn surface_state(&self) -> WindowSurfaceState {
        self.surfaces.state()
    }

    pub fn stats(&self) -> &Arc<FrameStats> {
        &self.stats
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn surface_created(&mut self, window: D::Window) -> Result<SurfaceId, RenderError> {
        if self.released {
            return Err(RenderError::Disconnected);
        }
        self.surfaces.bind(&mut self.driver, window).map_err(|err| {
            warn!(error = %err, "window surface unavailable; dropping frames until the next one");
            err
        })
    }

    pub fn surface_changed(&mut self, width: u32, height: u32) {
        trace!(width, height, "surface changed");
        self.surfaces.on_resize(width, height);
    }

    pub fn surface_destroyed(&mut self) {
        if self.released {
            return;
        }
        self.surfaces.unbind(&mut self.driver);
    }

    /// Draws the newest frame onto the bound surface, or drops the token when
    /// nothing is bound. Frames written from here on queue a new token.
    pub fn frame_available(&mut self) {
        if self.released {
            return;
        }
        self.mailbox.claim_token();
        let size = match self.surfaces.make_current(&mut self.driver) {
            Ok(Some(size)) => size,
            Ok(None) => {
                self.stats.record_dropped();
                trace!("no window surface bound; frame dropped");
                return;
            }
            Err(err) => {
                self.stats.record_failed();
                warn!(error = %err, "failed to make window surface current");
                return;
            }
        };

        if let Some(frame) = self.mailbox.take_latest() {
            if let Err(err) = self.driver.upload_frame(&frame) {
                warn!(error = %err, "frame upload failed; reusing previous image");
            }
        }

        match self.draw_frame(size) {
            Ok(()) => {
                self.stats.record_presented();
                trace!(width = size.width, height = size.height, "frame presented");
            }
            Err(err) => {
                self.stats.record_failed();
                warn!(error = %err, "frame draw failed");
            }
        }
    }

    fn draw_frame(&mut self, size: PhysicalSize<u32>) -> Result<(), RenderError> {
        self.driver.clear_viewport(size)?;
        self.driver.draw_blur(&self.draw)?;
        self.surfaces.present(&mut self.driver)
    }

    /// Releases the mailbox, the window surface and the driver, in that order.
    /// Idempotent; later calls on the pipeline do nothing.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.mailbox.release();
        self.surfaces.unbind(&mut self.driver);
        self.driver.release();
        let (delivered, superseded) = self.mailbox.delivery_counts();
        debug!(delivered, superseded, "frame pipeline released");
    }
}

impl<D: Driver> Drop for FramePipeline<D> {
    fn drop(&mut self) {
        self.release();
    }
}
