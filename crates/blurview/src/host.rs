use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use renderer::{FrameCounts, PipelineConfig, RenderError, RenderThread, SurfaceWindow};
use tracing::{debug, info, warn};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use crate::source::{FrameSource, SourceContent};

const STATS_INTERVAL: Duration = Duration::from_secs(5);

pub struct HostOptions {
    pub title: String,
    pub frame_interval: Duration,
    pub run_for: Option<Duration>,
}

/// Opens the preview window and runs until it is closed or `run_for` elapses.
///
/// The window surface is handed to the render thread while the window is
/// visible and taken back whenever it is occluded, minimised, suspended or
/// detached with `H`.
pub fn run_host(
    pipeline: PipelineConfig,
    content: SourceContent,
    options: HostOptions,
) -> Result<FrameCounts> {
    let event_loop = EventLoop::new().map_err(|err| anyhow!("failed to create event loop: {err}"))?;
    let window = WindowBuilder::new()
        .with_title(options.title.as_str())
        .with_inner_size(pipeline.initial_size)
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create preview window: {err}"))?;
    let window = Arc::new(window);

    let format = pipeline.frame_format;
    let render = RenderThread::spawn_wgpu(pipeline)?;
    let source = FrameSource::spawn(
        render.delivery_target(),
        content,
        format,
        options.frame_interval,
    )?;

    let now = Instant::now();
    let mut host = ViewHost {
        window,
        title: options.title,
        render,
        attached: false,
        detached_by_user: false,
        occluded: false,
        deadline: options.run_for.map(|duration| now + duration),
        next_report: now + STATS_INTERVAL,
        error: None,
    };

    let run_result = event_loop.run(|event, elwt| host.handle_event(event, elwt));

    let written = source.stop();
    let counts = host.render.stats().snapshot();
    let ViewHost { render, error, .. } = host;
    render.shutdown()?;
    info!(
        written,
        presented = counts.presented,
        dropped = counts.dropped,
        failed = counts.failed,
        "preview closed"
    );

    if let Err(err) = run_result {
        return Err(anyhow!("window event loop error: {err}"));
    }
    match error {
        Some(err) => Err(err.into()),
        None => Ok(counts),
    }
}

struct ViewHost {
    window: Arc<Window>,
    title: String,
    render: RenderThread<SurfaceWindow>,
    attached: bool,
    detached_by_user: bool,
    occluded: bool,
    deadline: Option<Instant>,
    next_report: Instant,
    error: Option<RenderError>,
}

impl ViewHost {
    fn handle_event(&mut self, event: Event<()>, elwt: &EventLoopWindowTarget<()>) {
        match event {
            Event::Resumed => self.sync_surface(self.window.inner_size()),
            Event::Suspended => self.detach(),
            Event::WindowEvent { window_id, event } if window_id == self.window.id() => {
                match event {
                    WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                        self.detach();
                        elwt.exit();
                    }
                    WindowEvent::Resized(size) => self.sync_surface(size),
                    WindowEvent::Occluded(occluded) => {
                        self.occluded = occluded;
                        self.sync_surface(self.window.inner_size());
                    }
                    WindowEvent::KeyboardInput { event, .. } => {
                        if event.state == ElementState::Pressed && !event.repeat {
                            let toggle = matches!(event.logical_key, Key::Character(ref value) if value.eq_ignore_ascii_case("h"));
                            if toggle {
                                self.detached_by_user = !self.detached_by_user;
                                self.sync_surface(self.window.inner_size());
                            } else if matches!(event.logical_key, Key::Named(NamedKey::Escape)) {
                                self.detach();
                                elwt.exit();
                            }
                        }
                    }
                    _ => {}
                }
            }
            Event::AboutToWait => self.schedule(elwt),
            _ => {}
        }

        if self.error.is_some() {
            elwt.exit();
        }
    }

    /// Attaches or detaches the window surface to match the view's state.
    fn sync_surface(&mut self, size: PhysicalSize<u32>) {
        let visible = !self.occluded && !self.detached_by_user && size.width > 0 && size.height > 0;
        if !visible {
            self.detach();
            return;
        }

        if !self.attached {
            let window: SurfaceWindow = self.window.clone();
            match self.render.surface_created(window) {
                Ok(id) => {
                    debug!(surface = id.raw(), "window surface attached");
                    self.attached = true;
                    self.update_title();
                }
                Err(RenderError::Disconnected) => {
                    self.error = Some(RenderError::Disconnected);
                    return;
                }
                Err(err) => {
                    warn!(error = %err, "failed to attach window surface; rendering offscreen");
                    return;
                }
            }
        }

        if let Err(err) = self.render.surface_changed(size.width, size.height) {
            self.error = Some(err);
        }
    }

    fn detach(&mut self) {
        if !self.attached {
            return;
        }
        self.attached = false;
        match self.render.surface_destroyed() {
            Ok(()) => debug!("window surface detached"),
            Err(err) => self.error = Some(err),
        }
        self.update_title();
    }

    fn update_title(&self) {
        if self.attached {
            self.window.set_title(&self.title);
        } else {
            self.window.set_title(&format!("{} (detached)", self.title));
        }
    }

    fn schedule(&mut self, elwt: &EventLoopWindowTarget<()>) {
        let now = Instant::now();
        if self.deadline.is_some_and(|deadline| now >= deadline) {
            info!("run duration elapsed");
            self.detach();
            elwt.exit();
            return;
        }

        if now >= self.next_report {
            let counts = self.render.stats().snapshot();
            debug!(
                presented = counts.presented,
                dropped = counts.dropped,
                failed = counts.failed,
                attached = self.attached,
                "frame statistics"
            );
            self.next_report = now + STATS_INTERVAL;
        }

        let wake = match self.deadline {
            Some(deadline) => deadline.min(self.next_report),
            None => self.next_report,
        };
        elwt.set_control_flow(ControlFlow::WaitUntil(wake));
    }
}
