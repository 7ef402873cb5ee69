//! Rasterizer - draws one scope frame per tick into the offscreen image
//!
//! ## Tick order
//!
//! 1. Consume a pending reset (flat buffer, full-scale window)
//! 2. Clear the plot region (the border drawn at construction persists)
//! 3. Grid (dashed) and center axes (solid)
//! 4. / 5. Consume auto-zoom / recenter requests through the autoscale phases
//! 6. Min/max voltage labels
//! 7. Read new samples, one write + one phase advance per slot
//! 8. Trace the buffer as a single polyline
//!
//! Publishing (step 9) and scheduling (step 10) belong to `RasterLoop`,
//! which owns the thread this all runs on.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use image::{Rgba, RgbaImage};

use super::canvas::{Canvas, DrawError};
use super::mapping::{format_voltage, PlotLayout};
use super::text::LabelFont;
use crate::capture::{RingBuffer, Sampler, SourceError, MIDPOINT};
use crate::compositor::FrameExchange;
use crate::pipeline::Controls;
use crate::scale::{Autoscale, ScalePhase};

/// Colours used for the offscreen frame
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Palette {
    pub background: Rgba<u8>,
    pub border: Rgba<u8>,
    pub grid: Rgba<u8>,
    pub axis: Rgba<u8>,
    pub label: Rgba<u8>,
    pub trace: Rgba<u8>,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            background: Rgba([10, 20, 10, 255]),
            border: Rgba([80, 100, 80, 255]),
            grid: Rgba([60, 80, 60, 160]),
            axis: Rgba([80, 110, 80, 220]),
            label: Rgba([140, 200, 140, 255]),
            trace: Rgba([100, 255, 100, 255]),
        }
    }
}

/// Everything the rasterizer needs to know up front
#[derive(Clone, Debug)]
pub struct RasterConfig {
    pub layout: PlotLayout,
    /// Pixels per logical unit in the offscreen image
    pub render_scale: f32,
    /// Volts at normalized sample 1.0
    pub full_scale: f32,
    /// Samples read (and columns scrolled) per tick
    pub samples_per_tick: usize,
    /// Grid pitch in logical units
    pub grid_spacing: f32,
    pub trace_width: f32,
    pub palette: Palette,
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            layout: PlotLayout::default(),
            render_scale: 2.0,
            full_scale: 5.0,
            samples_per_tick: 1,
            grid_spacing: 20.0,
            trace_width: 1.5,
            palette: Palette::default(),
        }
    }
}

/// Chrome geometry, in logical units from the surface edge
const BORDER_INSET: f32 = 3.0;
const BORDER_RADIUS: f32 = 6.0;
const BORDER_WIDTH: f32 = 1.5;
/// Everything inside this inset is redrawn each tick
const CLEAR_INSET: f32 = 7.0;

const LABEL_SIZE: f32 = 9.0;
const LABEL_PAD: f32 = 3.0;

/// Owner of the ring buffer, scale window and canvas
pub struct Rasterizer {
    config: RasterConfig,
    ring: RingBuffer,
    autoscale: Autoscale,
    canvas: Canvas,
    controls: Arc<Controls>,
    /// Labels are skipped when the font can't be loaded
    font: Option<LabelFont>,
    /// Reused coordinate list for the trace
    points: Vec<f32>,
}

impl Rasterizer {
    /// Create the rasterizer in its rest state and draw the chrome
    pub fn new(config: RasterConfig, controls: Arc<Controls>) -> Self {
        let layout = config.layout;
        let columns = layout.columns();
        let mut canvas = Canvas::new(layout.width, layout.height, config.render_scale);

        canvas.fill(config.palette.background);
        canvas.rounded_rect(
            BORDER_INSET,
            BORDER_INSET,
            layout.width - 2.0 * BORDER_INSET,
            layout.height - 2.0 * BORDER_INSET,
            BORDER_RADIUS,
            BORDER_WIDTH,
            config.palette.border,
        );

        let font = match LabelFont::load() {
            Ok(font) => Some(font),
            Err(e) => {
                log::warn!("Scale labels disabled: {}", e);
                None
            }
        };

        Self {
            ring: RingBuffer::new(columns, MIDPOINT),
            autoscale: Autoscale::new(config.full_scale),
            canvas,
            controls,
            font,
            points: Vec::with_capacity(columns * 2),
            config,
        }
    }

    /// Number of display columns (ring capacity)
    pub fn columns(&self) -> usize {
        self.ring.len()
    }

    pub fn ring(&self) -> &RingBuffer {
        &self.ring
    }

    pub fn autoscale(&self) -> &Autoscale {
        &self.autoscale
    }

    /// The image drawn by the last tick (until it is published)
    pub fn frame(&self) -> &RgbaImage {
        self.canvas.image()
    }

    pub fn canvas_mut(&mut self) -> &mut Canvas {
        &mut self.canvas
    }

    /// Run one tick, pulling new samples from `read`
    ///
    /// A failed read leaves that slot's previous value in place; the cursor
    /// still moves on.
    pub fn tick<F>(&mut self, mut read: F) -> Result<(), DrawError>
    where
        F: FnMut() -> Result<f32, SourceError>,
    {
        if self.controls.take_reset() {
            self.ring.fill(MIDPOINT);
            self.autoscale.reset();
        }

        self.clear_plot();
        self.draw_grid();

        let phase = ScalePhase::from_requests(
            self.controls.take_auto_zoom(),
            self.controls.take_recenter(),
        );
        if phase != ScalePhase::Settled {
            let stats = self.ring.statistics();
            let autoscale = &mut self.autoscale;
            // A zoom step from the UI in between makes this rerun on the new value
            self.controls.update_zoom(|mut zoom| {
                autoscale.settle(phase, &stats, &mut zoom);
                zoom
            });
        }

        self.draw_labels();

        for _ in 0..self.config.samples_per_tick.max(1) {
            let slot = self.ring.phase();
            match read() {
                Ok(value) => self.ring.write(slot, value),
                Err(e) => log::debug!("No sample for slot {}: {}", slot, e),
            }
            self.ring.advance();
        }

        self.draw_trace()
    }

    fn clear_plot(&mut self) {
        let layout = self.config.layout;
        self.canvas.clear_rect(
            CLEAR_INSET,
            CLEAR_INSET,
            layout.width - 2.0 * CLEAR_INSET,
            layout.height - 2.0 * CLEAR_INSET,
            self.config.palette.background,
        );
    }

    fn draw_grid(&mut self) {
        let layout = self.config.layout;
        let palette = self.config.palette;
        let spacing = self.config.grid_spacing.max(4.0);
        let (cx, cy) = (
            (layout.left() + layout.right()) / 2.0,
            (layout.top() + layout.bottom()) / 2.0,
        );

        // Lines step outward from the center axes so the grid stays symmetric
        let mut offset = spacing;
        while cx + offset < layout.right() {
            for x in [cx - offset, cx + offset] {
                self.canvas.dashed_line(
                    x,
                    layout.top(),
                    x,
                    layout.bottom(),
                    0.5,
                    3.0,
                    3.0,
                    palette.grid,
                );
            }
            offset += spacing;
        }

        let mut offset = spacing;
        while cy + offset < layout.bottom() {
            for y in [cy - offset, cy + offset] {
                self.canvas.dashed_line(
                    layout.left(),
                    y,
                    layout.right(),
                    y,
                    0.5,
                    3.0,
                    3.0,
                    palette.grid,
                );
            }
            offset += spacing;
        }

        self.canvas
            .line(cx, layout.top(), cx, layout.bottom(), 1.0, palette.axis);
        self.canvas
            .line(layout.left(), cy, layout.right(), cy, 1.0, palette.axis);
    }

    fn draw_labels(&mut self) {
        let Some(font) = self.font.as_ref() else {
            return;
        };
        let layout = self.config.layout;
        let color = self.config.palette.label;
        let window = self.autoscale.window();

        let x = layout.left() + LABEL_PAD;
        self.canvas.text(
            x,
            layout.top() + LABEL_PAD,
            &format_voltage(window.max),
            font,
            LABEL_SIZE,
            color,
        );
        self.canvas.text(
            x,
            layout.bottom() - LABEL_PAD - font.line_height(LABEL_SIZE),
            &format_voltage(window.min),
            font,
            LABEL_SIZE,
            color,
        );

        let zoom = self.controls.zoom();
        if zoom > 1.0 {
            let text = format!("{}x", zoom.round() as u32);
            let width = font.text_width(&text, LABEL_SIZE);
            self.canvas.text(
                layout.right() - LABEL_PAD - width,
                layout.top() + LABEL_PAD,
                &text,
                font,
                LABEL_SIZE,
                color,
            );
        }
    }

    fn draw_trace(&mut self) -> Result<(), DrawError> {
        let layout = self.config.layout;
        let window = self.autoscale.window();
        let full_scale = self.config.full_scale;

        self.points.clear();
        for (i, sample) in self.ring.read_ordered().enumerate() {
            self.points.push(layout.column_x(i));
            self.points
                .push(layout.sample_to_y(sample, window, full_scale));
        }

        // One column can't make a line; nothing to draw
        if self.points.len() < 4 {
            return Ok(());
        }
        self.canvas
            .polyline(&self.points, self.config.trace_width, self.config.palette.trace)
    }
}

/// The thread that drives the rasterizer at a fixed cadence
pub struct RasterLoop {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl RasterLoop {
    /// Start ticking every `interval`
    pub fn spawn(
        rasterizer: Rasterizer,
        sampler: Sampler,
        exchange: Arc<FrameExchange>,
        interval: Duration,
    ) -> io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);

        let handle = std::thread::Builder::new()
            .name("crt-scope-raster".into())
            .spawn(move || run_loop(rasterizer, sampler, exchange, interval, thread_running))?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Cancel the next tick and wait for the thread to finish
    ///
    /// A tick already in progress completes but is not published.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                log::error!("Raster thread panicked");
            }
        }
    }
}

impl Drop for RasterLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(
    mut rasterizer: Rasterizer,
    mut sampler: Sampler,
    exchange: Arc<FrameExchange>,
    interval: Duration,
    running: Arc<AtomicBool>,
) {
    log::debug!(
        "Raster loop running every {:?} ({} columns, sample wait {:?})",
        interval,
        rasterizer.columns(),
        sampler.timeout()
    );

    let mut next_tick = Instant::now();
    while running.load(Ordering::Acquire) {
        match rasterizer.tick(|| sampler.read()) {
            Ok(()) => {
                if running.load(Ordering::Acquire) {
                    exchange.publish(rasterizer.canvas_mut());
                }
            }
            Err(e) => log::error!("Frame dropped: {}", e),
        }

        next_tick += interval;
        let now = Instant::now();
        if next_tick > now {
            std::thread::park_timeout(next_tick - now);
        } else {
            // Fell behind; don't try to catch up with a burst of ticks
            next_tick = now;
        }
    }

    sampler.shutdown();
    log::debug!("Raster loop exited");
}
