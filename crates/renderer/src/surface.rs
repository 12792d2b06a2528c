use tracing::{debug, warn};
use winit::dpi::PhysicalSize;

use crate::driver::{Drawable, Driver, SurfaceId};
use crate::error::RenderError;

/// Whether a live window surface is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowSurfaceState {
    Absent,
    Bound {
        surface: SurfaceId,
        size: PhysicalSize<u32>,
    },
}

/// Binds the context to the host view's surface as it comes and goes.
///
/// Transitions are `Absent -> Bound` on creation, `Bound -> Bound` on resize,
/// and `Bound -> Absent` on destruction. A resize while `Absent` never creates
/// a binding; the size is remembered and applied to the next one.
#[derive(Debug)]
pub struct WindowSurfaceManager {
    state: WindowSurfaceState,
    last_size: PhysicalSize<u32>,
}

impl WindowSurfaceManager {
    pub fn new(initial_size: PhysicalSize<u32>) -> Self {
        Self {
            state: WindowSurfaceState::Absent,
            last_size: initial_size,
        }
    }

    pub fn state(&self) -> WindowSurfaceState {
        self.state
    }

    pub fn is_bound(&self) -> bool {
        matches!(self.state, WindowSurfaceState::Bound { .. })
    }

    /// Size the next draw clears to.
    pub fn size(&self) -> PhysicalSize<u32> {
        match self.state {
            WindowSurfaceState::Bound { size, .. } => size,
            WindowSurfaceState::Absent => self.last_size,
        }
    }

    /// Wraps `window` and makes it current, releasing any previous surface first.
    ///
    /// On failure the manager is `Absent` with the offscreen drawable current.
    pub fn bind<D: Driver>(
        &mut self,
        driver: &mut D,
        window: D::Window,
    ) -> Result<SurfaceId, RenderError> {
        self.unbind(driver);

        let surface = driver.create_window_surface(window)?;
        if let Err(err) = driver.make_current(Drawable::Window(surface)) {
            driver.release_window_surface(surface);
            if let Err(fallback) = driver.make_current(Drawable::Offscreen) {
                warn!(error = %fallback, "failed to rebind offscreen drawable");
            }
            return Err(err);
        }

        self.state = WindowSurfaceState::Bound {
            surface,
            size: self.last_size,
        };
        debug!(
            surface = surface.raw(),
            width = self.last_size.width,
            height = self.last_size.height,
            "window surface bound"
        );
        Ok(surface)
    }

    /// Records a new drawable size. Never touches the GPU.
    pub fn on_resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        let new_size = PhysicalSize::new(width, height);
        self.last_size = new_size;
        if let WindowSurfaceState::Bound { size, .. } = &mut self.state {
            *size = new_size;
        }
    }

    /// Releases the bound surface, falling back to the offscreen drawable.
    /// A no-op when nothing is bound.
    pub fn unbind<D: Driver>(&mut self, driver: &mut D) {
        let WindowSurfaceState::Bound { surface, .. } =
            std::mem::replace(&mut self.state, WindowSurfaceState::Absent)
        else {
            return;
        };
        if let Err(err) = driver.make_current(Drawable::Offscreen) {
            warn!(error = %err, "failed to rebind offscreen drawable");
        }
        driver.release_window_surface(surface);
        debug!(surface = surface.raw(), "window surface released");
    }

    /// Makes the bound surface current and returns the size to draw at.
    pub fn make_current<D: Driver>(
        &self,
        driver: &mut D,
    ) -> Result<Option<PhysicalSize<u32>>, RenderError> {
        match self.state {
            WindowSurfaceState::Absent => Ok(None),
            WindowSurfaceState::Bound { surface, size } => {
                driver.make_current(Drawable::Window(surface))?;
                Ok(Some(size))
            }
        }
    }

    /// Presents the current frame. Callers only invoke this while bound.
    pub fn present<D: Driver>(&self, driver: &mut D) -> Result<(), RenderError> {
        debug_assert!(self.is_bound(), "present called without a bound surface");
        if !self.is_bound() {
            return Ok(());
        }
        driver.present()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, FakeWindow, RecordingDriver};

    fn manager() -> WindowSurfaceManager {
        WindowSurfaceManager::new(PhysicalSize::new(720, 1280))
    }

    #[test]
    fn starts_absent() {
        let manager = manager();
        assert_eq!(manager.state(), WindowSurfaceState::Absent);
        assert_eq!(manager.size(), PhysicalSize::new(720, 1280));
    }

    #[test]
    fn bind_makes_surface_current() {
        let mut driver = RecordingDriver::new();
        let mut manager = manager();
        let surface = manager.bind(&mut driver, FakeWindow::valid(1)).unwrap();

        assert_eq!(driver.current(), Drawable::Window(surface));
        assert_eq!(
            manager.state(),
            WindowSurfaceState::Bound {
                surface,
                size: PhysicalSize::new(720, 1280),
            }
        );
    }

    #[test]
    fn rebinding_releases_previous_surface_first() {
        let mut driver = RecordingDriver::new();
        let mut manager = manager();
        let first = manager.bind(&mut driver, FakeWindow::valid(1)).unwrap();
        let second = manager.bind(&mut driver, FakeWindow::valid(2)).unwrap();

        let log = driver.log();
        assert_eq!(log.live_surfaces(), vec![second]);
        let released = log.position(&Call::ReleaseSurface(first)).unwrap();
        let created = log.position(&Call::CreateSurface(second)).unwrap();
        assert!(released < created);
    }

    #[test]
    fn create_destroy_cycles_return_to_baseline() {
        let mut driver = RecordingDriver::new();
        let mut manager = manager();
        let mut last = None;
        for handle in 1..=4 {
            last = Some(manager.bind(&mut driver, FakeWindow::valid(handle)).unwrap());
            manager.unbind(&mut driver);
            assert!(driver.log().live_surfaces().is_empty());
            assert_eq!(driver.current(), Drawable::Offscreen);
        }
        let again = manager.bind(&mut driver, FakeWindow::valid(9)).unwrap();
        assert_ne!(Some(again), last);
        assert_eq!(driver.log().live_surfaces(), vec![again]);
    }

    #[test]
    fn unbind_when_absent_is_noop() {
        let mut driver = RecordingDriver::new();
        let mut manager = manager();
        manager.unbind(&mut driver);
        manager.unbind(&mut driver);
        assert!(driver.log().calls().is_empty());
    }

    #[test]
    fn failed_bind_stays_absent_on_offscreen() {
        let mut driver = RecordingDriver::new();
        let mut manager = manager();
        manager.bind(&mut driver, FakeWindow::valid(1)).unwrap();

        let err = manager.bind(&mut driver, FakeWindow::invalid()).unwrap_err();
        assert!(matches!(err, RenderError::SurfaceBind(_)));
        assert_eq!(manager.state(), WindowSurfaceState::Absent);
        assert_eq!(driver.current(), Drawable::Offscreen);
        assert!(driver.log().live_surfaces().is_empty());
    }

    #[test]
    fn resize_updates_bound_size_without_gpu_calls() {
        let mut driver = RecordingDriver::new();
        let mut manager = manager();
        let surface = manager.bind(&mut driver, FakeWindow::valid(1)).unwrap();
        let calls_before = driver.log().calls().len();

        manager.on_resize(256, 256);

        assert_eq!(driver.log().calls().len(), calls_before);
        assert_eq!(
            manager.state(),
            WindowSurfaceState::Bound {
                surface,
                size: PhysicalSize::new(256, 256),
            }
        );
    }

    #[test]
    fn resize_while_absent_never_binds() {
        let mut driver = RecordingDriver::new();
        let mut manager = manager();
        manager.on_resize(300, 200);
        assert_eq!(manager.state(), WindowSurfaceState::Absent);

        manager.bind(&mut driver, FakeWindow::valid(1)).unwrap();
        assert_eq!(manager.size(), PhysicalSize::new(300, 200));
    }

    #[test]
    fn zero_sized_resize_is_ignored() {
        let mut manager = manager();
        manager.on_resize(0, 480);
        assert_eq!(manager.size(), PhysicalSize::new(720, 1280));
    }
}
