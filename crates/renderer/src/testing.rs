//! In-memory [`Driver`] that records every call for pipeline tests.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use winit::dpi::PhysicalSize;

use crate::driver::{BlurDraw, Drawable, Driver, SurfaceId};
use crate::error::RenderError;
use crate::frames::VideoFrame;
use crate::types::FrameFormat;

/// Stand-in for a native window. Handle `0` is rejected like a dead window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FakeWindow(pub u32);

impl FakeWindow {
    pub fn valid(handle: u32) -> Self {
        assert_ne!(handle, 0, "handle 0 is reserved for invalid windows");
        Self(handle)
    }

    pub fn invalid() -> Self {
        Self(0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateSurface(SurfaceId),
    ReleaseSurface(SurfaceId),
    MakeCurrent(Drawable),
    Upload { width: u32, height: u32 },
    Clear(PhysicalSize<u32>),
    Draw { radius: [f32; 2], flip_vertical: bool },
    Present(SurfaceId),
    Release,
}

#[derive(Debug, Clone, Default)]
pub struct DriverLog {
    calls: Vec<Call>,
    live: BTreeSet<u64>,
    present_failures: u32,
    present_delay: Duration,
}

impl DriverLog {
    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn live_surfaces(&self) -> Vec<SurfaceId> {
        self.live.iter().copied().map(SurfaceId::new).collect()
    }

    pub fn position(&self, call: &Call) -> Option<usize> {
        self.calls.iter().position(|recorded| recorded == call)
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|call| predicate(call)).count()
    }

    pub fn presents(&self) -> usize {
        self.count(|call| matches!(call, Call::Present(_)))
    }

    pub fn clears(&self) -> Vec<PhysicalSize<u32>> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Clear(size) => Some(*size),
                _ => None,
            })
            .collect()
    }
}

/// Shared view of a [`RecordingDriver`]'s log, usable after the driver moved
/// onto another thread.
#[derive(Debug, Clone, Default)]
pub struct LogHandle(Arc<Mutex<DriverLog>>);

impl LogHandle {
    fn lock(&self) -> MutexGuard<'_, DriverLog> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> DriverLog {
        self.lock().clone()
    }

    /// Makes the next `count` presents fail with a lost surface.
    pub fn fail_next_presents(&self, count: u32) {
        self.lock().present_failures = count;
    }

    /// Makes every present block for `delay`, like a vsync-paced swap.
    pub fn delay_presents(&self, delay: Duration) {
        self.lock().present_delay = delay;
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum FrameStage {
    #[default]
    Idle,
    Cleared,
    Drawn,
}

/// Checks call ordering the way a real backend would fail on it: draws need a
/// cleared frame on a window, presents need a drawn frame.
#[derive(Debug, Default)]
pub struct RecordingDriver {
    log: LogHandle,
    current: Drawable,
    next_id: u64,
    stage: FrameStage,
    released: bool,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log(log: LogHandle) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    pub fn handle(&self) -> LogHandle {
        self.log.clone()
    }

    pub fn log(&self) -> DriverLog {
        self.log.snapshot()
    }

    fn record(&self, call: Call) {
        self.log.lock().calls.push(call);
    }

    fn assert_live(&self) {
        assert!(!self.released, "driver used after release");
    }
}

impl Driver for RecordingDriver {
    type Window = FakeWindow;

    fn create_window_surface(&mut self, window: FakeWindow) -> Result<SurfaceId, RenderError> {
        self.assert_live();
        if window.0 == 0 {
            return Err(RenderError::SurfaceBind("invalid native window".into()));
        }
        self.next_id += 1;
        let id = SurfaceId::new(self.next_id);
        self.log.lock().live.insert(id.raw());
        self.record(Call::CreateSurface(id));
        Ok(id)
    }

    fn release_window_surface(&mut self, surface: SurfaceId) {
        if !self.log.lock().live.remove(&surface.raw()) {
            return;
        }
        if self.current == Drawable::Window(surface) {
            self.current = Drawable::Offscreen;
        }
        self.stage = FrameStage::Idle;
        self.record(Call::ReleaseSurface(surface));
    }

    fn make_current(&mut self, drawable: Drawable) -> Result<(), RenderError> {
        self.assert_live();
        if let Drawable::Window(id) = drawable {
            if !self.log.lock().live.contains(&id.raw()) {
                return Err(RenderError::SurfaceBind(format!(
                    "surface {} does not exist",
                    id.raw()
                )));
            }
        }
        self.current = drawable;
        self.stage = FrameStage::Idle;
        self.record(Call::MakeCurrent(drawable));
        Ok(())
    }

    fn current(&self) -> Drawable {
        self.current
    }

    fn upload_frame(&mut self, frame: &VideoFrame) -> Result<(), RenderError> {
        self.assert_live();
        frame.validate(FrameFormat::Rgba8)?;
        self.record(Call::Upload {
            width: frame.width,
            height: frame.height,
        });
        Ok(())
    }

    fn clear_viewport(&mut self, size: PhysicalSize<u32>) -> Result<(), RenderError> {
        self.assert_live();
        assert!(
            matches!(self.current, Drawable::Window(_)),
            "clear issued without a window surface current"
        );
        self.stage = FrameStage::Cleared;
        self.record(Call::Clear(size));
        Ok(())
    }

    fn draw_blur(&mut self, draw: &BlurDraw) -> Result<(), RenderError> {
        self.assert_live();
        assert_eq!(self.stage, FrameStage::Cleared, "draw outside a cleared frame");
        self.stage = FrameStage::Drawn;
        self.record(Call::Draw {
            radius: draw.radius.as_array(),
            flip_vertical: draw.flip_vertical,
        });
        Ok(())
    }

    fn present(&mut self) -> Result<(), RenderError> {
        self.assert_live();
        let Drawable::Window(surface) = self.current else {
            panic!("present issued without a window surface current");
        };
        assert_eq!(self.stage, FrameStage::Drawn, "present without a drawn frame");
        self.stage = FrameStage::Idle;
        let delay = self.log.lock().present_delay;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        {
            let mut log = self.log.lock();
            if log.present_failures > 0 {
                log.present_failures -= 1;
                return Err(RenderError::Surface(wgpu::SurfaceError::Lost));
            }
        }
        self.record(Call::Present(surface));
        Ok(())
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        let live: Vec<u64> = self.log.lock().live.iter().copied().collect();
        for id in live {
            self.release_window_surface(SurfaceId::new(id));
        }
        self.released = true;
        self.current = Drawable::Offscreen;
        self.record(Call::Release);
    }
}
