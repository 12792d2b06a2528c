use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use renderer::{DeliveryTarget, FrameFormat, VideoFrame};
use viewconfig::PatternKind;

/// Resolution of generated patterns, portrait like a phone capture.
pub const PATTERN_SIZE: (u32, u32) = (360, 640);

const CHECKER_CELL: u32 = 40;

const BAR_COLORS: [[u8; 3]; 8] = [
    [235, 235, 235],
    [235, 235, 16],
    [16, 235, 235],
    [16, 235, 16],
    [235, 16, 235],
    [235, 16, 16],
    [16, 16, 235],
    [16, 16, 16],
];

/// What the demo source feeds the renderer.
#[derive(Debug, Clone)]
pub enum SourceContent {
    Pattern(PatternKind),
    Still(VideoFrame),
}

impl SourceContent {
    /// Loads `image` when given, otherwise animates `pattern`.
    pub fn resolve(
        image: Option<&Path>,
        pattern: PatternKind,
        format: FrameFormat,
    ) -> Result<Self> {
        match image {
            Some(path) => Ok(SourceContent::Still(load_still(path, format)?)),
            None => Ok(SourceContent::Pattern(pattern)),
        }
    }

    pub fn frame(&self, index: u64, format: FrameFormat) -> VideoFrame {
        match self {
            SourceContent::Pattern(kind) => {
                let (width, height) = PATTERN_SIZE;
                let rgba = render_pattern(*kind, width, height, index);
                VideoFrame::packed(width, height, format, encode(rgba, format))
            }
            SourceContent::Still(frame) => frame.clone(),
        }
    }
}

/// Producer thread standing in for a video decoder.
///
/// Writes a frame every `interval` until stopped or until the delivery target
/// reports its texture was released.
pub struct FrameSource {
    stop: Option<Sender<()>>,
    join_handle: Option<JoinHandle<u64>>,
}

impl FrameSource {
    pub fn spawn(
        target: DeliveryTarget,
        content: SourceContent,
        format: FrameFormat,
        interval: Duration,
    ) -> Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("blurview-source".into())
            .spawn(move || {
                let mut written = 0u64;
                let mut next = Instant::now();
                loop {
                    let frame = content.frame(written, format);
                    if let Err(err) = target.write(frame) {
                        tracing::debug!(error = %err, "frame source stopping");
                        break;
                    }
                    written += 1;

                    next += interval;
                    let now = Instant::now();
                    let wait = if next > now {
                        next - now
                    } else {
                        next = now;
                        Duration::ZERO
                    };
                    match stop_rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                written
            })
            .map_err(|err| anyhow!("failed to spawn frame source: {err}"))?;

        Ok(Self {
            stop: Some(stop_tx),
            join_handle: Some(handle),
        })
    }

    /// Stops the producer and returns how many frames it wrote.
    pub fn stop(mut self) -> u64 {
        self.finish()
    }

    fn finish(&mut self) -> u64 {
        drop(self.stop.take());
        match self.join_handle.take() {
            Some(handle) => match handle.join() {
                Ok(written) => written,
                Err(err) => {
                    tracing::warn!("frame source thread panicked: {err:?}");
                    0
                }
            },
            None => 0,
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.finish();
    }
}

fn load_still(path: &Path, format: FrameFormat) -> Result<VideoFrame> {
    let image = image::open(path)
        .with_context(|| format!("failed to load source image {}", path.display()))?
        .to_rgba8();
    let (width, height) = image.dimensions();
    tracing::info!(path = %path.display(), width, height, "loaded still source image");
    Ok(VideoFrame::packed(
        width,
        height,
        format,
        encode(image.into_raw(), format),
    ))
}

/// Converts packed RGBA8 into the byte layout of `format`.
fn encode(rgba: Vec<u8>, format: FrameFormat) -> Arc<[u8]> {
    match format {
        FrameFormat::Rgba8 => rgba.into(),
        FrameFormat::Rgba32Float => rgba
            .iter()
            .flat_map(|&channel| (f32::from(channel) / 255.0).to_le_bytes())
            .collect(),
    }
}

/// Renders one RGBA8 frame of `kind`, shifted by `index` for motion.
pub fn render_pattern(kind: PatternKind, width: u32, height: u32, index: u64) -> Vec<u8> {
    let shift = (index % u64::from(width.max(1))) as u32;
    let mut data = Vec::with_capacity(width as usize * height as usize * 4);
    for y in 0..height {
        for x in 0..width {
            let [r, g, b] = match kind {
                PatternKind::Gradient => {
                    let u = ((x + shift) % width) * 255 / width.max(1);
                    let v = y * 255 / height.max(1);
                    [u as u8, v as u8, (255 - u) as u8]
                }
                PatternKind::Checker => {
                    let cell = ((x + shift) / CHECKER_CELL + y / CHECKER_CELL) % 2;
                    if cell == 0 {
                        [240, 240, 240]
                    } else {
                        [20, 40, 90]
                    }
                }
                PatternKind::Bars => {
                    let bar = ((x + shift) % width) as usize * BAR_COLORS.len() / width as usize;
                    BAR_COLORS[bar]
                }
            };
            data.extend_from_slice(&[r, g, b, 255]);
        }
    }
    data
}
