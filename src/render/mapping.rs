//! Sample-to-screen mapping
//!
//! Two composed affine steps take a normalized sample to a vertical pixel
//! position:
//!
//! ```text
//! position = invlerp(min / full_scale, max / full_scale, sample)   // [0, 1]
//! y        = height - margin - lerp(inner, height - 2*margin - inner, position)
//! ```
//!
//! Both steps clamp, so values outside the scale window stick to the
//! nearest edge of the plot instead of leaving it.
//!
//! ## Coordinate System
//!
//! Logical units, origin at the top-left, Y growing downward. The canvas
//! multiplies by its render scale when it touches pixels.

use crate::scale::ScaleWindow;

/// Clamp `x` into `[lo, hi]`; NaN maps to `lo`
#[inline]
pub fn clamp(lo: f32, hi: f32, x: f32) -> f32 {
    x.max(lo).min(hi)
}

/// Where `v` sits between `lo` and `hi`, clamped to `[0, 1]`
#[inline]
pub fn invlerp(lo: f32, hi: f32, v: f32) -> f32 {
    clamp(0.0, 1.0, (v - lo) / (hi - lo))
}

/// Point at fraction `t` (clamped) between `lo` and `hi`
#[inline]
pub fn lerp(lo: f32, hi: f32, t: f32) -> f32 {
    (hi - lo) * clamp(0.0, 1.0, t) + lo
}

/// Geometry of the plot inside the offscreen image
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlotLayout {
    /// Logical width of the whole surface
    pub width: f32,
    /// Logical height of the whole surface
    pub height: f32,
    /// Border around the plot area (chrome lives here)
    pub margin: f32,
    /// Extra vertical inset so the trace never touches the border
    pub inner_margin: f32,
}

impl Default for PlotLayout {
    fn default() -> Self {
        Self {
            width: 400.0,
            height: 250.0,
            margin: 20.0,
            inner_margin: 10.0,
        }
    }
}

impl PlotLayout {
    /// Number of display columns, one sample each
    pub fn columns(&self) -> usize {
        (self.width - 2.0 * self.margin).max(1.0) as usize
    }

    /// Left edge of the plot
    pub fn left(&self) -> f32 {
        self.margin
    }

    pub fn right(&self) -> f32 {
        self.width - self.margin
    }

    pub fn top(&self) -> f32 {
        self.margin
    }

    pub fn bottom(&self) -> f32 {
        self.height - self.margin
    }

    /// X coordinate of display column `i`
    pub fn column_x(&self, i: usize) -> f32 {
        self.margin + i as f32
    }

    /// Y coordinate of a normalized sample under the given window
    pub fn sample_to_y(&self, sample: f32, window: ScaleWindow, full_scale: f32) -> f32 {
        let position = invlerp(window.min / full_scale, window.max / full_scale, sample);
        let span = lerp(
            self.inner_margin,
            self.height - 2.0 * self.margin - self.inner_margin,
            position,
        );
        self.height - self.margin - span
    }
}

/// Below this magnitude a label is treated as zero
const LABEL_EPSILON: f32 = 0.005;

/// Voltage label: explicit sign, two decimals for small non-zero values
///
/// `0.25 -> "+0.25V"`, `5.0 -> "+5.0V"`, `-1.3 -> "-1.3V"`, `0.0 -> "+0.0V"`
pub fn format_voltage(volts: f32) -> String {
    let sign = if volts < 0.0 && volts.abs() >= LABEL_EPSILON {
        '-'
    } else {
        '+'
    };
    let magnitude = volts.abs();
    if magnitude < 1.0 && magnitude >= LABEL_EPSILON {
        format!("{}{:.2}V", sign, magnitude)
    } else if magnitude < LABEL_EPSILON {
        format!("{}0.0V", sign)
    } else {
        format!("{}{:.1}V", sign, magnitude)
    }
}
