//! Pipeline lifecycle and the command surface
//!
//! `Controls` is the only state shared between UI command handlers and the
//! rasterizer thread: three one-shot flags plus the zoom scalar. Handlers
//! only ever raise a flag or step the zoom; the rasterizer consumes the
//! flags at the start of its next tick and does the actual work there. The
//! ring buffer, scale window and canvas stay private to the rasterizer.
//!
//! `Pipeline` owns the running loops. Teardown stops the rasterizer (and
//! waits for its thread) before closing the frame exchange, so no frame
//! can land after the compositor has been told to clear.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::capture::{
    AudioInputSource, SampleSource, Sampler, SineSource, SourceFactory, SourceKind, StatsFeed,
    StatsSink,
};
use crate::compositor::FrameExchange;
use crate::render::{RasterLoop, Rasterizer};
use crate::scale::{clamp_zoom, zoomed_in, zoomed_out, ZOOM_MIN};
use crate::settings::ScopeSettings;

/// Errors that can occur while starting the pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] io::Error),
}

/// Deferred commands shared with the rasterizer
pub struct Controls {
    needs_recenter: AtomicBool,
    needs_auto_zoom: AtomicBool,
    needs_reset: AtomicBool,
    /// f32 bits of the current zoom level
    zoom: AtomicU32,
}

impl Default for Controls {
    fn default() -> Self {
        Self::new()
    }
}

impl Controls {
    pub fn new() -> Self {
        Self {
            needs_recenter: AtomicBool::new(false),
            needs_auto_zoom: AtomicBool::new(false),
            needs_reset: AtomicBool::new(false),
            zoom: AtomicU32::new(ZOOM_MIN.to_bits()),
        }
    }

    pub fn zoom(&self) -> f32 {
        f32::from_bits(self.zoom.load(Ordering::Acquire))
    }

    /// Store a zoom level (clamped)
    pub fn set_zoom(&self, zoom: f32) {
        self.zoom
            .store(clamp_zoom(zoom).to_bits(), Ordering::Release);
    }

    /// Atomically replace the zoom with `f(zoom)` (clamped) and return it
    ///
    /// `f` may run more than once if another thread changes the zoom in
    /// between, so it must only depend on the value it is given.
    pub fn update_zoom<F: FnMut(f32) -> f32>(&self, mut f: F) -> f32 {
        let mut updated = ZOOM_MIN;
        // Never fails: the closure always returns Some
        let _ = self
            .zoom
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                updated = clamp_zoom(f(f32::from_bits(bits)));
                Some(updated.to_bits())
            });
        updated
    }

    fn step_zoom(&self, step: fn(f32) -> f32) {
        self.update_zoom(step);
        self.needs_recenter.store(true, Ordering::Release);
    }

    pub fn request_auto_zoom(&self) {
        self.needs_auto_zoom.store(true, Ordering::Release);
    }

    pub fn request_reset(&self) {
        self.set_zoom(ZOOM_MIN);
        self.needs_reset.store(true, Ordering::Release);
    }

    pub fn zoom_in(&self) {
        self.step_zoom(zoomed_in);
    }

    pub fn zoom_out(&self) {
        self.step_zoom(zoomed_out);
    }

    /// Consume the reset flag
    pub fn take_reset(&self) -> bool {
        self.needs_reset.swap(false, Ordering::AcqRel)
    }

    /// Consume the auto-zoom flag
    pub fn take_auto_zoom(&self) -> bool {
        self.needs_auto_zoom.swap(false, Ordering::AcqRel)
    }

    /// Consume the recenter flag
    pub fn take_recenter(&self) -> bool {
        self.needs_recenter.swap(false, Ordering::AcqRel)
    }
}

/// Fire-and-forget command surface handed to the UI
#[derive(Clone)]
pub struct ScopeHandle {
    controls: Arc<Controls>,
}

impl ScopeHandle {
    pub fn new(controls: Arc<Controls>) -> Self {
        Self { controls }
    }

    /// Fit the zoom to the current signal and recenter
    pub fn auto(&self) {
        self.controls.request_auto_zoom();
    }

    /// Back to full scale with a flat buffer
    pub fn reset(&self) {
        self.controls.request_reset();
    }

    pub fn zoom_in(&self) {
        self.controls.zoom_in();
    }

    pub fn zoom_out(&self) {
        self.controls.zoom_out();
    }

    pub fn zoom(&self) -> f32 {
        self.controls.zoom()
    }
}

/// Build the sample source selected in the settings
///
/// The audio input falls back to the sine generator when no device can be
/// opened, so the scope always has something to show.
pub fn source_factory(kind: SourceKind) -> SourceFactory {
    Box::new(move || {
        let source: Box<dyn SampleSource> = match kind {
            SourceKind::Sine => Box::new(SineSource::new()),
            SourceKind::AudioInput => match AudioInputSource::open() {
                Ok(source) => Box::new(source),
                Err(e) => {
                    log::warn!("Audio input unavailable ({}), using sine", e);
                    Box::new(SineSource::new())
                }
            },
        };
        Ok(source)
    })
}

/// A running capture-and-render pipeline
pub struct Pipeline {
    controls: Arc<Controls>,
    exchange: Arc<FrameExchange>,
    stats: StatsFeed,
    raster: Option<RasterLoop>,
}

impl Pipeline {
    /// Start sampling and rasterizing with the configured source
    pub fn start(settings: &ScopeSettings) -> Result<Self, PipelineError> {
        Self::start_with(settings, source_factory(settings.source))
    }

    /// Start with an explicit source factory
    pub fn start_with(settings: &ScopeSettings, factory: SourceFactory) -> Result<Self, PipelineError> {
        let controls = Arc::new(Controls::new());
        let stats = StatsFeed::new();

        let rasterizer = Rasterizer::new(settings.raster_config(), Arc::clone(&controls));
        let exchange = Arc::new(FrameExchange::new(rasterizer.frame()));

        let sampler = Sampler::spawn(
            factory,
            settings.sample_timeout(),
            Some(StatsSink {
                feed: stats.clone(),
                capacity: rasterizer.columns(),
                full_scale: settings.full_scale_volts,
            }),
        )?;

        let raster = RasterLoop::spawn(
            rasterizer,
            sampler,
            Arc::clone(&exchange),
            settings.tick_interval(),
        )?;

        log::info!(
            "Pipeline started ({} Hz, {} source)",
            settings.tick_rate_hz,
            settings.source.name()
        );

        Ok(Self {
            controls,
            exchange,
            stats,
            raster: Some(raster),
        })
    }

    /// Command surface for the UI
    pub fn handle(&self) -> ScopeHandle {
        ScopeHandle::new(Arc::clone(&self.controls))
    }

    /// Where finished frames appear
    pub fn exchange(&self) -> Arc<FrameExchange> {
        Arc::clone(&self.exchange)
    }

    pub fn stats(&self) -> StatsFeed {
        self.stats.clone()
    }

    pub fn is_running(&self) -> bool {
        self.raster.is_some()
    }

    /// Stop both loops and close the exchange
    ///
    /// Idempotent. Once this returns no further tick runs and no further
    /// frame is published.
    pub fn teardown(&mut self) {
        let Some(mut raster) = self.raster.take() else {
            return;
        };
        raster.stop();
        self.exchange.close();
        log::info!("Pipeline stopped");
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.teardown();
    }
}
