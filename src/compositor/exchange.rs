//! Frame exchange - hands finished frames from the rasterizer to the compositor
//!
//! Three images rotate between the two loops: the rasterizer's working
//! image, the pending slot held here, and the compositor's front image.
//! A hand-off is always a pointer swap with the pending slot:
//!
//! 1. The rasterizer finishes drawing, then under the lock swaps its
//!    working image into the slot and raises `dirty`.
//! 2. The compositor sees `dirty`, then under the lock clears it and swaps
//!    its front image with the slot.
//!
//! Neither side ever sees an image the other is still drawing into, so a
//! frame can be dropped (if the compositor is slower) but never torn.
//! `dirty` only changes while the lock is held, so it always describes the
//! slot's content and a frame already shown never comes back. The unlocked
//! load in `take_if_dirty` is just a fast path for idle repaints.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use image::RgbaImage;

use crate::render::Canvas;

pub struct FrameExchange {
    pending: Mutex<RgbaImage>,
    dirty: AtomicBool,
    closed: AtomicBool,
    published: AtomicU64,
}

impl FrameExchange {
    /// Create an exchange whose pending slot starts as a copy of `initial`
    ///
    /// Every image in the rotation should start from the same chrome, so
    /// callers pass the rasterizer's first frame here.
    pub fn new(initial: &RgbaImage) -> Self {
        Self {
            pending: Mutex::new(initial.clone()),
            dirty: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            published: AtomicU64::new(0),
        }
    }

    /// Size of the frames passing through
    pub fn dimensions(&self) -> (u32, u32) {
        self.pending
            .lock()
            .map(|image| image.dimensions())
            .unwrap_or((0, 0))
    }

    /// Copy of the pending frame
    ///
    /// Whatever sits in the slot is a complete frame, so this is a valid
    /// starting point for a new front image.
    pub fn latest(&self) -> RgbaImage {
        match self.pending.lock() {
            Ok(pending) => pending.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Publish the canvas' finished image (rasterizer side)
    ///
    /// The canvas gets the previous pending image back to draw the next
    /// frame into. Does nothing once the exchange is closed.
    pub fn publish(&self, canvas: &mut Canvas) -> bool {
        let Ok(mut pending) = self.pending.lock() else {
            return false;
        };
        if self.is_closed() {
            return false;
        }
        canvas.swap_image(&mut pending);
        self.published.fetch_add(1, Ordering::Relaxed);
        self.dirty.store(true, Ordering::Release);
        true
    }

    /// Swap in the newest frame if one arrived since the last call
    /// (compositor side)
    pub fn take_if_dirty(&self, front: &mut RgbaImage) -> bool {
        if !self.dirty.load(Ordering::Acquire) {
            return false;
        }
        let Ok(mut pending) = self.pending.lock() else {
            return false;
        };
        // Re-check under the lock: the slot may have been taken meanwhile
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return false;
        }
        if pending.dimensions() != front.dimensions() {
            *front = RgbaImage::new(pending.width(), pending.height());
        }
        std::mem::swap(&mut *pending, front);
        true
    }

    /// Whether a frame is waiting to be taken
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Frames published so far
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Refuse further frames and drop any pending one
    pub fn close(&self) {
        let _pending = match self.pending.lock() {
            Ok(pending) => pending,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.closed.store(true, Ordering::Release);
        self.dirty.store(false, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::sync::Arc;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    fn canvas() -> Canvas {
        Canvas::new(8.0, 4.0, 1.0)
    }

    #[test]
    fn test_nothing_to_take_initially() {
        let canvas = canvas();
        let exchange = FrameExchange::new(canvas.image());
        let mut front = RgbaImage::new(8, 4);

        assert!(!exchange.take_if_dirty(&mut front));
        assert_eq!(exchange.dimensions(), (8, 4));
        assert_eq!(exchange.latest().dimensions(), (8, 4));
    }

    #[test]
    fn test_publish_then_take() {
        let mut canvas = canvas();
        let exchange = FrameExchange::new(canvas.image());
        let mut front = RgbaImage::new(8, 4);

        canvas.fill(RED);
        assert!(exchange.publish(&mut canvas));
        assert!(exchange.is_dirty());

        assert!(exchange.take_if_dirty(&mut front));
        assert_eq!(*front.get_pixel(0, 0), RED);
        // Taken once, not twice
        assert!(!exchange.take_if_dirty(&mut front));
    }

    #[test]
    fn test_compositor_gets_latest_of_two() {
        let mut canvas = canvas();
        let exchange = FrameExchange::new(canvas.image());
        let mut front = RgbaImage::new(8, 4);

        canvas.fill(RED);
        exchange.publish(&mut canvas);
        canvas.fill(BLUE);
        exchange.publish(&mut canvas);

        assert!(exchange.take_if_dirty(&mut front));
        assert_eq!(*front.get_pixel(0, 0), BLUE);
        assert_eq!(exchange.published(), 2);
    }

    #[test]
    fn test_closed_exchange_rejects_frames() {
        let mut canvas = canvas();
        let exchange = FrameExchange::new(canvas.image());
        let mut front = RgbaImage::new(8, 4);

        canvas.fill(RED);
        exchange.publish(&mut canvas);
        exchange.close();

        assert!(!exchange.take_if_dirty(&mut front));
        assert!(!exchange.publish(&mut canvas));
    }

    #[test]
    fn test_frames_are_never_torn_across_threads() {
        let exchange = Arc::new(FrameExchange::new(canvas().image()));
        let writer_exchange = Arc::clone(&exchange);

        let writer = std::thread::spawn(move || {
            let mut canvas = canvas();
            for i in 0..500u32 {
                // Whole frame is one colour; a torn frame would mix two
                let shade = (i % 250) as u8 + 1;
                canvas.fill(Rgba([shade, shade, shade, 255]));
                writer_exchange.publish(&mut canvas);
            }
        });

        let mut front = RgbaImage::new(8, 4);
        let mut seen = 0;
        while !writer.is_finished() || exchange.is_dirty() {
            if exchange.take_if_dirty(&mut front) {
                let first = *front.get_pixel(0, 0);
                assert!(front.pixels().all(|p| *p == first));
                seen += 1;
            }
        }
        writer.join().unwrap();
        assert!(seen > 0);
    }

    /// Frame `i` is filled with `i` spread over the RGB bytes
    fn frame_index(pixel: Rgba<u8>) -> u32 {
        pixel.0[0] as u32 | (pixel.0[1] as u32) << 8 | (pixel.0[2] as u32) << 16
    }

    #[test]
    fn test_taken_frames_never_go_backwards() {
        let exchange = Arc::new(FrameExchange::new(canvas().image()));
        let writer_exchange = Arc::clone(&exchange);

        let writer = std::thread::spawn(move || {
            let mut canvas = canvas();
            for i in 1..=20_000u32 {
                canvas.fill(Rgba([i as u8, (i >> 8) as u8, (i >> 16) as u8, 255]));
                writer_exchange.publish(&mut canvas);
            }
        });

        let mut front = RgbaImage::new(8, 4);
        let mut last = 0;
        while !writer.is_finished() || exchange.is_dirty() {
            if exchange.take_if_dirty(&mut front) {
                let index = frame_index(*front.get_pixel(0, 0));
                assert!(index > last, "frame {} shown after frame {}", index, last);
                last = index;
            }
        }
        writer.join().unwrap();
        assert_eq!(last, 20_000);
    }
}
