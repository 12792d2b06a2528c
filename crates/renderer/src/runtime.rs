use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use tracing::{debug, info};

use crate::driver::{Driver, SurfaceId};
use crate::error::RenderError;
use crate::frames::{DeliveryTarget, FrameMailbox};
use crate::gpu::{SurfaceWindow, WgpuDriver};
use crate::pipeline::{FramePipeline, FrameStats};
use crate::types::PipelineConfig;

enum RenderEvent<W> {
    FrameAvailable,
    SurfaceCreated {
        window: W,
        reply: Sender<Result<SurfaceId, RenderError>>,
    },
    SurfaceChanged {
        width: u32,
        height: u32,
    },
    SurfaceDestroyed {
        reply: Sender<()>,
    },
    Shutdown,
}

/// Owns the GPU thread and serializes frame and surface events onto it.
///
/// `surface_created` and `surface_destroyed` wait for the render thread to
/// finish the transition; `surface_changed` and frame tokens do not.
pub struct RenderThread<W: Send + 'static> {
    events: Sender<RenderEvent<W>>,
    target: DeliveryTarget,
    stats: Arc<FrameStats>,
    join_handle: Option<JoinHandle<Result<()>>>,
}

impl<W: Send + 'static> RenderThread<W> {
    /// Starts the render thread and builds the driver on it with `init`.
    ///
    /// Returns once the driver is ready, or with the error `init` produced.
    pub fn spawn<D, F>(config: PipelineConfig, init: F) -> Result<Self>
    where
        D: Driver<Window = W>,
        F: FnOnce(&PipelineConfig) -> Result<D, RenderError> + Send + 'static,
    {
        let (events_tx, events_rx) = unbounded();
        let notify_tx = events_tx.clone();
        let (mailbox, target) = FrameMailbox::new(move || {
            let _ = notify_tx.send(RenderEvent::FrameAvailable);
        });
        let stats = Arc::new(FrameStats::default());

        let (ready_tx, ready_rx) = bounded(1);
        let thread_stats = stats.clone();
        let handle = thread::Builder::new()
            .name("blurview-render".into())
            .spawn(move || run_render_thread(config, init, mailbox, events_rx, ready_tx, thread_stats))
            .map_err(|err| anyhow!("failed to spawn render thread: {err}"))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let _ = handle.join();
                return Err(err.into());
            }
            Err(err) => {
                let _ = handle.join();
                return Err(anyhow!("render thread failed to initialise: {err}"));
            }
        }

        Ok(Self {
            events: events_tx,
            target,
            stats,
            join_handle: Some(handle),
        })
    }

    /// Handle the frame producer writes into.
    pub fn delivery_target(&self) -> DeliveryTarget {
        self.target.clone()
    }

    pub fn stats(&self) -> Arc<FrameStats> {
        self.stats.clone()
    }

    /// Binds `window` as the drawable and waits for the result.
    pub fn surface_created(&self, window: W) -> Result<SurfaceId, RenderError> {
        let (reply, response) = bounded(1);
        self.events
            .send(RenderEvent::SurfaceCreated { window, reply })
            .map_err(|_| RenderError::Disconnected)?;
        response.recv().map_err(|_| RenderError::Disconnected)?
    }

    pub fn surface_changed(&self, width: u32, height: u32) -> Result<(), RenderError> {
        self.events
            .send(RenderEvent::SurfaceChanged { width, height })
            .map_err(|_| RenderError::Disconnected)
    }

    /// Releases the window surface and waits until the render thread has
    /// rebound the offscreen target. No draw starts after this returns.
    pub fn surface_destroyed(&self) -> Result<(), RenderError> {
        let (reply, response) = bounded(1);
        self.events
            .send(RenderEvent::SurfaceDestroyed { reply })
            .map_err(|_| RenderError::Disconnected)?;
        response.recv().map_err(|_| RenderError::Disconnected)
    }

    pub fn shutdown(mut self) -> Result<()> {
        if let Some(handle) = self.join_handle.take() {
            let _ = self.events.send(RenderEvent::Shutdown);
            handle
                .join()
                .map_err(|err| anyhow!("render thread panicked: {err:?}"))??;
        }
        Ok(())
    }
}

impl RenderThread<SurfaceWindow> {
    /// Starts the render thread on the wgpu driver.
    pub fn spawn_wgpu(config: PipelineConfig) -> Result<Self> {
        Self::spawn(config, WgpuDriver::new)
    }
}

impl<W: Send + 'static> Drop for RenderThread<W> {
    fn drop(&mut self) {
        if let Some(handle) = self.join_handle.take() {
            let _ = self.events.send(RenderEvent::Shutdown);
            let _ = handle.join();
        }
    }
}

fn run_render_thread<D, F>(
    config: PipelineConfig,
    init: F,
    mailbox: FrameMailbox,
    events: Receiver<RenderEvent<D::Window>>,
    ready_tx: Sender<Result<(), RenderError>>,
    stats: Arc<FrameStats>,
) -> Result<()>
where
    D: Driver,
    F: FnOnce(&PipelineConfig) -> Result<D, RenderError>,
{
    let driver = match init(&config) {
        Ok(driver) => driver,
        Err(err) => {
            mailbox.release();
            let message = err.to_string();
            let _ = ready_tx.send(Err(err));
            return Err(anyhow!(message));
        }
    };
    let mut pipeline = FramePipeline::new(driver, mailbox, &config, stats);
    let _ = ready_tx.send(Ok(()));
    debug!("render thread ready");

    for event in events.iter() {
        match event {
            RenderEvent::FrameAvailable => pipeline.frame_available(),
            RenderEvent::SurfaceCreated { window, reply } => {
                let _ = reply.send(pipeline.surface_created(window));
            }
            RenderEvent::SurfaceChanged { width, height } => {
                pipeline.surface_changed(width, height);
            }
            RenderEvent::SurfaceDestroyed { reply } => {
                pipeline.surface_destroyed();
                let _ = reply.send(());
            }
            RenderEvent::Shutdown => break,
        }
    }

    pipeline.release();
    let counts = pipeline.stats().snapshot();
    info!(
        presented = counts.presented,
        dropped = counts.dropped,
        failed = counts.failed,
        "render thread stopped"
    );
    Ok(())
}
