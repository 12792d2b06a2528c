//! Decoder-facing half of the external frame texture.
//!
//! The decoder only ever sees a [`DeliveryTarget`]. Each write replaces the
//! pending frame in a shared slot and fires the registered notification; the
//! render thread later takes whatever is newest through [`FrameMailbox`]. Frames
//! that are overwritten before the render thread gets to them are never uploaded.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::RenderError;
use crate::types::FrameFormat;

/// One decoded frame as raw rows of pixels.
#[derive(Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// Bytes per row, including any padding.
    pub stride: u32,
    pub data: Arc<[u8]>,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, stride: u32, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            width,
            height,
            stride,
            data: data.into(),
        }
    }

    /// Builds a frame whose rows carry no padding.
    pub fn packed(width: u32, height: u32, format: FrameFormat, data: impl Into<Arc<[u8]>>) -> Self {
        Self::new(width, height, width * format.bytes_per_pixel(), data)
    }

    /// Checks the buffer covers `height` rows of `width` pixels at `stride`.
    pub fn validate(&self, format: FrameFormat) -> Result<(), RenderError> {
        let row_bytes = self.width as usize * format.bytes_per_pixel() as usize;
        let expected = if self.width == 0 || self.height == 0 {
            1
        } else {
            self.stride as usize * (self.height as usize - 1) + row_bytes
        };
        if self.width == 0
            || self.height == 0
            || (self.stride as usize) < row_bytes
            || self.data.len() < expected
        {
            return Err(RenderError::FrameSize {
                width: self.width,
                height: self.height,
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("bytes", &self.data.len())
            .finish()
    }
}

type Notify = Arc<dyn Fn() + Send + Sync>;

struct Slot {
    pending: Option<VideoFrame>,
    notify: Option<Notify>,
    /// A notification was sent and the render thread has not claimed it yet.
    token_outstanding: bool,
    released: bool,
    delivered: u64,
    superseded: u64,
}

fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Render-thread side of the frame slot.
pub struct FrameMailbox {
    slot: Arc<Mutex<Slot>>,
}

impl FrameMailbox {
    /// Creates the slot and its delivery target. `notify` runs on the writer's
    /// thread and must only enqueue work. Writes made while an earlier
    /// notification is still unclaimed do not notify again, so at most one
    /// token is ever queued.
    pub fn new<F>(notify: F) -> (Self, DeliveryTarget)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let slot = Arc::new(Mutex::new(Slot {
            pending: None,
            notify: Some(Arc::new(notify)),
            token_outstanding: false,
            released: false,
            delivered: 0,
            superseded: 0,
        }));
        (
            Self { slot: slot.clone() },
            DeliveryTarget { slot },
        )
    }

    /// Marks the outstanding notification as handled. The next write notifies
    /// again. Call before [`take_latest`](Self::take_latest).
    pub fn claim_token(&self) {
        lock(&self.slot).token_outstanding = false;
    }

    /// Takes the newest undelivered frame, if any.
    pub fn take_latest(&self) -> Option<VideoFrame> {
        lock(&self.slot).pending.take()
    }

    pub fn is_released(&self) -> bool {
        lock(&self.slot).released
    }

    /// Frames accepted so far, and how many of them were overwritten unseen.
    pub fn delivery_counts(&self) -> (u64, u64) {
        let slot = lock(&self.slot);
        (slot.delivered, slot.superseded)
    }

    /// Detaches the notification and drops any pending frame. Idempotent.
    pub fn release(&self) {
        let notify = {
            let mut slot = lock(&self.slot);
            slot.released = true;
            slot.pending = None;
            slot.notify.take()
        };
        // Drop the callback outside the lock; it may own channel endpoints.
        drop(notify);
    }
}

/// Decoder-side handle frames are written into. Cheap to clone.
#[derive(Clone)]
pub struct DeliveryTarget {
    slot: Arc<Mutex<Slot>>,
}

impl DeliveryTarget {
    /// Publishes `frame` as the newest frame and notifies the render thread
    /// unless a notification is already pending.
    ///
    /// Fails with [`RenderError::TextureReleased`] once the owning texture has
    /// been released.
    pub fn write(&self, frame: VideoFrame) -> Result<(), RenderError> {
        let notify = {
            let mut slot = lock(&self.slot);
            if slot.released {
                return Err(RenderError::TextureReleased);
            }
            if slot.pending.replace(frame).is_some() {
                slot.superseded += 1;
            }
            slot.delivered += 1;
            if slot.token_outstanding {
                None
            } else {
                slot.token_outstanding = true;
                slot.notify.clone()
            }
        };
        if let Some(notify) = notify {
            notify();
        }
        Ok(())
    }

    pub fn is_released(&self) -> bool {
        lock(&self.slot).released
    }
}

impl fmt::Debug for DeliveryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryTarget")
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn frame(value: u8) -> VideoFrame {
        VideoFrame::packed(2, 2, FrameFormat::Rgba8, vec![value; 16])
    }

    #[test]
    fn newest_frame_wins() {
        let (mailbox, target) = FrameMailbox::new(|| {});
        target.write(frame(1)).unwrap();
        target.write(frame(2)).unwrap();

        let latest = mailbox.take_latest().unwrap();
        assert_eq!(latest.data[0], 2);
        assert!(mailbox.take_latest().is_none());
        assert_eq!(mailbox.delivery_counts(), (2, 1));
    }

    #[test]
    fn writes_coalesce_until_token_is_claimed() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let (mailbox, target) = FrameMailbox::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        for value in 0..3 {
            target.write(frame(value)).unwrap();
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        mailbox.claim_token();
        target.write(frame(3)).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(mailbox.take_latest().unwrap().data[0], 3);
        assert_eq!(mailbox.delivery_counts(), (4, 3));
    }

    #[test]
    fn unclaimed_frame_does_not_block_later_tokens() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let (mailbox, target) = FrameMailbox::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        target.write(frame(1)).unwrap();
        // Token handled with nothing bound: the frame stays pending.
        mailbox.claim_token();
        target.write(frame(2)).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn writes_after_release_are_rejected_without_notifying() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let (mailbox, target) = FrameMailbox::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        target.write(frame(1)).unwrap();
        mailbox.release();
        mailbox.release();

        assert!(matches!(
            target.write(frame(2)),
            Err(RenderError::TextureReleased)
        ));
        assert!(target.is_released());
        assert!(mailbox.take_latest().is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn validate_accepts_padded_rows() {
        let padded = VideoFrame::new(2, 2, 12, vec![0u8; 12 + 8]);
        assert!(padded.validate(FrameFormat::Rgba8).is_ok());
    }

    #[test]
    fn validate_rejects_short_buffers() {
        let short = VideoFrame::packed(4, 4, FrameFormat::Rgba8, vec![0u8; 63]);
        let err = short.validate(FrameFormat::Rgba8).unwrap_err();
        assert!(matches!(
            err,
            RenderError::FrameSize {
                expected: 64,
                actual: 63,
                ..
            }
        ));
    }

    #[test]
    fn validate_rejects_empty_frames() {
        let empty = VideoFrame::packed(0, 0, FrameFormat::Rgba8, Vec::<u8>::new());
        assert!(empty.validate(FrameFormat::Rgba8).is_err());
    }
}
