//! Autoscale engine - which voltage range is mapped onto the screen
//!
//! The visible range is a `ScaleWindow` in volts. It only changes in two
//! ways, both driven by one-shot requests consumed at the start of a
//! rasterizer tick:
//!
//! - **Auto-zoom** picks a zoom level so the current sample spread fills
//!   80% of the plot height, then hands over to recenter.
//! - **Recenter** centers a window of width `full_scale / zoom` on the
//!   buffer's mean voltage.
//!
//! The two are modelled as an explicit phase sequence
//! (`AutoZoom -> Recenter -> Settled`) rather than nested conditionals, so
//! the algorithm can be driven and tested without a render loop.

use crate::capture::Statistics;

/// Zoom never shows less detail than full scale
pub const ZOOM_MIN: f32 = 1.0;

/// Deepest zoom reachable by any command
pub const ZOOM_MAX: f32 = 32.0;

/// Share of the plot height the sample spread should fill after auto-zoom
const FILL_FRACTION: f32 = 0.8;

/// Clamp a zoom level into `[ZOOM_MIN, ZOOM_MAX]`
pub fn clamp_zoom(zoom: f32) -> f32 {
    if zoom.is_nan() {
        return ZOOM_MIN;
    }
    zoom.clamp(ZOOM_MIN, ZOOM_MAX)
}

/// One manual zoom-in step
pub fn zoomed_in(zoom: f32) -> f32 {
    clamp_zoom(zoom * 2.0)
}

/// One manual zoom-out step
pub fn zoomed_out(zoom: f32) -> f32 {
    clamp_zoom(zoom / 2.0)
}

/// Zoom that makes the sample spread fill the plot
///
/// Returns `None` when all samples are equal: there is no spread to fit, so
/// the current zoom should be kept instead of dividing by zero.
pub fn fit_zoom(stats: &Statistics) -> Option<f32> {
    let spread = stats.spread();
    if !spread.is_finite() || spread <= f32::EPSILON {
        return None;
    }
    Some(clamp_zoom(FILL_FRACTION / spread))
}

/// Voltage range shown on screen, `min < max`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleWindow {
    pub min: f32,
    pub max: f32,
}

impl ScaleWindow {
    /// `[0, full_scale]`
    pub fn full(full_scale: f32) -> Self {
        Self {
            min: 0.0,
            max: full_scale,
        }
    }

    /// Window of `width` volts centered on `midpoint`
    pub fn centered(midpoint: f32, width: f32) -> Self {
        let half = width / 2.0;
        Self {
            min: midpoint - half,
            max: midpoint + half,
        }
    }

    pub fn width(&self) -> f32 {
        self.max - self.min
    }

    pub fn midpoint(&self) -> f32 {
        (self.min + self.max) / 2.0
    }
}

/// Where the autoscale sequence is within a tick
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScalePhase {
    AutoZoom,
    Recenter,
    Settled,
}

impl ScalePhase {
    /// Entry phase for the requests pending this tick
    pub fn from_requests(auto_zoom: bool, recenter: bool) -> Self {
        if auto_zoom {
            ScalePhase::AutoZoom
        } else if recenter {
            ScalePhase::Recenter
        } else {
            ScalePhase::Settled
        }
    }
}

/// Owner of the scale window
///
/// Zoom itself lives with the command controls (the UI changes it), so the
/// engine takes it by reference and writes it back only during auto-zoom.
#[derive(Clone, Debug)]
pub struct Autoscale {
    full_scale: f32,
    window: ScaleWindow,
}

impl Autoscale {
    pub fn new(full_scale: f32) -> Self {
        Self {
            full_scale,
            window: ScaleWindow::full(full_scale),
        }
    }

    pub fn full_scale(&self) -> f32 {
        self.full_scale
    }

    pub fn window(&self) -> ScaleWindow {
        self.window
    }

    /// Back to `[0, full_scale]`
    pub fn reset(&mut self) {
        self.window = ScaleWindow::full(self.full_scale);
    }

    /// Center the window on the mean voltage at the given zoom
    pub fn recenter(&mut self, stats: &Statistics, zoom: f32) {
        let average = stats.mean * self.full_scale;
        let width = self.full_scale / clamp_zoom(zoom);
        self.window = ScaleWindow::centered(average, width);
    }

    /// Run one phase and return the next
    pub fn step(&mut self, phase: ScalePhase, stats: &Statistics, zoom: &mut f32) -> ScalePhase {
        match phase {
            ScalePhase::AutoZoom => {
                match fit_zoom(stats) {
                    Some(fitted) => *zoom = fitted,
                    None => log::debug!("Flat signal, keeping zoom at {}x", zoom),
                }
                ScalePhase::Recenter
            }
            ScalePhase::Recenter => {
                self.recenter(stats, *zoom);
                ScalePhase::Settled
            }
            ScalePhase::Settled => ScalePhase::Settled,
        }
    }

    /// Run phases from `start` until settled
    pub fn settle(&mut self, start: ScalePhase, stats: &Statistics, zoom: &mut f32) {
        let mut phase = start;
        while phase != ScalePhase::Settled {
            phase = self.step(phase, stats, zoom);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(min: f32, max: f32, mean: f32) -> Statistics {
        Statistics { min, max, mean }
    }

    #[test]
    fn test_fit_zoom_scenario() {
        // Spread of 0.1 fills 80% at 8x
        let zoom = fit_zoom(&stats(0.45, 0.55, 0.5)).unwrap();
        assert!((zoom - 8.0).abs() < 1e-3);
    }

    #[test]
    fn test_fit_zoom_never_below_one() {
        let zoom = fit_zoom(&stats(0.0, 1.0, 0.5)).unwrap();
        assert_eq!(zoom, ZOOM_MIN);
    }

    #[test]
    fn test_fit_zoom_capped() {
        let zoom = fit_zoom(&stats(0.5, 0.5001, 0.5)).unwrap();
        assert_eq!(zoom, ZOOM_MAX);
    }

    #[test]
    fn test_fit_zoom_flat_signal() {
        assert_eq!(fit_zoom(&stats(0.3, 0.3, 0.3)), None);
    }

    #[test]
    fn test_auto_zoom_then_recenter() {
        let cases = [
            stats(0.45, 0.55, 0.5),
            stats(0.1, 0.3, 0.22),
            stats(0.0, 1.0, 0.4375),
            stats(0.7, 0.71, 0.705),
        ];

        for s in cases {
            let mut engine = Autoscale::new(5.0);
            let mut zoom = 1.0;
            engine.settle(ScalePhase::AutoZoom, &s, &mut zoom);

            let window = engine.window();
            assert!((window.width() - 5.0 / zoom).abs() < 1e-4);
            assert!((window.midpoint() - s.mean * 5.0).abs() < 1e-4);
            assert!(window.min < window.max);
        }
    }

    #[test]
    fn test_flat_auto_zoom_keeps_zoom_and_recenters() {
        let mut engine = Autoscale::new(5.0);
        let mut zoom = 4.0;
        engine.settle(ScalePhase::AutoZoom, &stats(0.2, 0.2, 0.2), &mut zoom);

        assert_eq!(zoom, 4.0);
        assert!((engine.window().midpoint() - 1.0).abs() < 1e-5);
        assert!((engine.window().width() - 1.25).abs() < 1e-5);
    }

    #[test]
    fn test_phase_sequence() {
        let mut engine = Autoscale::new(5.0);
        let s = stats(0.4, 0.6, 0.5);
        let mut zoom = 1.0;

        let next = engine.step(ScalePhase::AutoZoom, &s, &mut zoom);
        assert_eq!(next, ScalePhase::Recenter);
        // Zoom already changed, window not yet
        assert_eq!(engine.window(), ScaleWindow::full(5.0));

        let next = engine.step(next, &s, &mut zoom);
        assert_eq!(next, ScalePhase::Settled);
        assert_ne!(engine.window(), ScaleWindow::full(5.0));
    }

    #[test]
    fn test_from_requests() {
        assert_eq!(ScalePhase::from_requests(true, false), ScalePhase::AutoZoom);
        assert_eq!(ScalePhase::from_requests(true, true), ScalePhase::AutoZoom);
        assert_eq!(ScalePhase::from_requests(false, true), ScalePhase::Recenter);
        assert_eq!(ScalePhase::from_requests(false, false), ScalePhase::Settled);
    }

    #[test]
    fn test_zoom_steps_clamp() {
        let mut zoom = 1.0;
        for _ in 0..20 {
            zoom = zoomed_in(zoom);
            assert!(zoom <= ZOOM_MAX);
        }
        assert_eq!(zoom, ZOOM_MAX);

        for _ in 0..20 {
            zoom = zoomed_out(zoom);
            assert!(zoom >= ZOOM_MIN);
        }
        assert_eq!(zoom, ZOOM_MIN);
    }

    #[test]
    fn test_reset_restores_full_window() {
        let mut engine = Autoscale::new(5.0);
        engine.recenter(&stats(0.1, 0.2, 0.15), 16.0);
        engine.reset();
        assert_eq!(engine.window(), ScaleWindow::full(5.0));
    }
}
