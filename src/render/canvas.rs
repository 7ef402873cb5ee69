//! Software canvas backed by an RGBA image
//!
//! All drawing calls take logical coordinates; the canvas multiplies them by
//! its render scale so the offscreen image can be supersampled without the
//! rasterizer knowing about pixels.
//!
//! Lines are anti-aliased by coverage: every pixel near a segment gets
//! `half_width + 0.5 - distance` (clamped to `[0, 1]`) of the colour,
//! blended source-over. Text uses the same blend with the glyph outline's
//! coverage.

use ab_glyph::Font;
use image::{Rgba, RgbaImage};
use thiserror::Error;

use super::text::LabelFont;

/// Errors from malformed draw input
#[derive(Error, Debug, PartialEq)]
pub enum DrawError {
    #[error("Coordinate list has odd length {0}")]
    OddCoordinates(usize),

    #[error("Polyline needs at least two points, got {0}")]
    TooFewPoints(usize),
}

/// Segments per rounded corner
const CORNER_SEGMENTS: usize = 8;

/// RGBA raster surface with primitive draw operations
pub struct Canvas {
    image: RgbaImage,
    /// Pixels per logical unit
    scale: f32,
}

impl Canvas {
    /// Create a canvas of `width x height` logical units
    pub fn new(width: f32, height: f32, scale: f32) -> Self {
        let scale = scale.max(0.25);
        let px_w = (width * scale).round().max(1.0) as u32;
        let px_h = (height * scale).round().max(1.0) as u32;
        Self {
            image: RgbaImage::new(px_w, px_h),
            scale,
        }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Exchange the backing image with `other`
    ///
    /// Used to hand a finished frame off without copying; `other` must have
    /// the same dimensions.
    pub fn swap_image(&mut self, other: &mut RgbaImage) {
        debug_assert_eq!(self.image.dimensions(), other.dimensions());
        std::mem::swap(&mut self.image, other);
    }

    /// Fill the whole surface
    pub fn fill(&mut self, color: Rgba<u8>) {
        for pixel in self.image.pixels_mut() {
            *pixel = color;
        }
    }

    /// Overwrite a rectangle (no blending)
    pub fn clear_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Rgba<u8>) {
        let (img_w, img_h) = self.image.dimensions();
        let x0 = ((x * self.scale).floor().max(0.0) as u32).min(img_w);
        let y0 = ((y * self.scale).floor().max(0.0) as u32).min(img_h);
        let x1 = (((x + w) * self.scale).ceil().max(0.0) as u32).min(img_w);
        let y1 = (((y + h) * self.scale).ceil().max(0.0) as u32).min(img_h);

        for py in y0..y1 {
            for px in x0..x1 {
                self.image.put_pixel(px, py, color);
            }
        }
    }

    /// Anti-aliased line segment
    pub fn line(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, width: f32, color: Rgba<u8>) {
        let s = self.scale;
        self.segment_px(x0 * s, y0 * s, x1 * s, y1 * s, width * s, color);
    }

    /// Line split into `dash` on, `gap` off runs
    #[allow(clippy::too_many_arguments)]
    pub fn dashed_line(
        &mut self,
        x0: f32,
        y0: f32,
        x1: f32,
        y1: f32,
        width: f32,
        dash: f32,
        gap: f32,
        color: Rgba<u8>,
    ) {
        let length = ((x1 - x0).powi(2) + (y1 - y0).powi(2)).sqrt();
        if length <= f32::EPSILON || dash <= 0.0 {
            return;
        }
        let (dx, dy) = ((x1 - x0) / length, (y1 - y0) / length);
        let period = dash + gap.max(0.0);

        let mut start = 0.0;
        while start < length {
            let end = (start + dash).min(length);
            self.line(
                x0 + dx * start,
                y0 + dy * start,
                x0 + dx * end,
                y0 + dy * end,
                width,
                color,
            );
            start += period;
        }
    }

    /// Stroke a rectangle with rounded corners
    #[allow(clippy::too_many_arguments)]
    pub fn rounded_rect(
        &mut self,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        radius: f32,
        width: f32,
        color: Rgba<u8>,
    ) {
        let r = radius.clamp(0.0, w.min(h) / 2.0);

        // Corner centers, clockwise from top-left, with their start angle
        let corners = [
            (x + r, y + r, std::f32::consts::PI),
            (x + w - r, y + r, 1.5 * std::f32::consts::PI),
            (x + w - r, y + h - r, 0.0),
            (x + r, y + h - r, 0.5 * std::f32::consts::PI),
        ];

        let mut outline = Vec::with_capacity((CORNER_SEGMENTS + 1) * 4 * 2 + 2);
        for (cx, cy, start) in corners {
            for i in 0..=CORNER_SEGMENTS {
                let angle = start + (i as f32 / CORNER_SEGMENTS as f32) * std::f32::consts::FRAC_PI_2;
                outline.push(cx + r * angle.cos());
                outline.push(cy + r * angle.sin());
            }
        }
        // Close the loop
        outline.push(outline[0]);
        outline.push(outline[1]);

        self.stroke_points(&outline, width, color);
    }

    /// Continuous stroke through `[x0, y0, x1, y1, ...]`
    ///
    /// An odd-length list is a caller bug; nothing is drawn and the error is
    /// returned instead of drawing a partial shape.
    pub fn polyline(&mut self, coords: &[f32], width: f32, color: Rgba<u8>) -> Result<(), DrawError> {
        if coords.len() % 2 != 0 {
            return Err(DrawError::OddCoordinates(coords.len()));
        }
        if coords.len() < 4 {
            return Err(DrawError::TooFewPoints(coords.len() / 2));
        }
        self.stroke_points(coords, width, color);
        Ok(())
    }

    /// Single-line text with the top of the line at `(x, y)`
    ///
    /// `size` is the face's height in logical units.
    pub fn text(&mut self, x: f32, y: f32, text: &str, font: &LabelFont, size: f32, color: Rgba<u8>) {
        let s = self.scale;
        let (img_w, img_h) = self.image.dimensions();
        let (glyphs, _) = font.layout(text, size * s, x * s, y * s);

        for glyph in glyphs {
            // Spaces and unknown characters have no outline
            let Some(outlined) = font.font().outline_glyph(glyph) else {
                continue;
            };
            let bounds = outlined.px_bounds();
            outlined.draw(|gx, gy, coverage| {
                let px = bounds.min.x as i64 + gx as i64;
                let py = bounds.min.y as i64 + gy as i64;
                if px >= 0 && py >= 0 && px < img_w as i64 && py < img_h as i64 {
                    self.blend(px as u32, py as u32, color, coverage.min(1.0));
                }
            });
        }
    }

    /// Connected segments through an even-length coordinate list
    fn stroke_points(&mut self, coords: &[f32], width: f32, color: Rgba<u8>) {
        let s = self.scale;
        for pair in coords.chunks_exact(2).collect::<Vec<_>>().windows(2) {
            self.segment_px(
                pair[0][0] * s,
                pair[0][1] * s,
                pair[1][0] * s,
                pair[1][1] * s,
                width * s,
                color,
            );
        }
    }

    /// Coverage-rasterize one segment in pixel space
    fn segment_px(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, width: f32, color: Rgba<u8>) {
        let half = (width / 2.0).max(0.5);
        let reach = half + 1.0;

        let (img_w, img_h) = self.image.dimensions();
        let min_x = (x0.min(x1) - reach).floor().max(0.0) as i64;
        let max_x = ((x0.max(x1) + reach).ceil() as i64).min(img_w as i64 - 1);
        let min_y = (y0.min(y1) - reach).floor().max(0.0) as i64;
        let max_y = ((y0.max(y1) + reach).ceil() as i64).min(img_h as i64 - 1);

        let (dx, dy) = (x1 - x0, y1 - y0);
        let len_sq = dx * dx + dy * dy;

        for py in min_y..=max_y {
            for px in min_x..=max_x {
                // Distance from the pixel center to the segment
                let (cx, cy) = (px as f32 + 0.5, py as f32 + 0.5);
                let t = if len_sq > 0.0 {
                    (((cx - x0) * dx + (cy - y0) * dy) / len_sq).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                let (nx, ny) = (x0 + t * dx, y0 + t * dy);
                let dist = ((cx - nx).powi(2) + (cy - ny).powi(2)).sqrt();

                let coverage = (half + 0.5 - dist).clamp(0.0, 1.0);
                if coverage > 0.0 {
                    self.blend(px as u32, py as u32, color, coverage);
                }
            }
        }
    }

    fn blend(&mut self, x: u32, y: u32, color: Rgba<u8>, coverage: f32) {
        let alpha = coverage * color.0[3] as f32 / 255.0;
        let dst = self.image.get_pixel_mut(x, y);
        for c in 0..3 {
            let mixed = color.0[c] as f32 * alpha + dst.0[c] as f32 * (1.0 - alpha);
            dst.0[c] = mixed.round() as u8;
        }
        let out_alpha = 255.0 * alpha + dst.0[3] as f32 * (1.0 - alpha);
        dst.0[3] = out_alpha.round() as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);
    const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);

    fn green_pixels(canvas: &Canvas) -> usize {
        canvas.image().pixels().filter(|p| p.0[1] > 128).count()
    }

    /// Pixels touched at all; thin glyph stems rarely reach full coverage
    fn lit_pixels(canvas: &Canvas) -> usize {
        canvas.image().pixels().filter(|p| p.0[1] > 0).count()
    }

    #[test]
    fn test_dimensions_follow_scale() {
        let canvas = Canvas::new(400.0, 250.0, 2.0);
        assert_eq!(canvas.image().dimensions(), (800, 500));
    }

    #[test]
    fn test_odd_coordinates_rejected_without_drawing() {
        let mut canvas = Canvas::new(20.0, 20.0, 1.0);
        canvas.fill(BLACK);

        let result = canvas.polyline(&[1.0, 1.0, 10.0, 10.0, 15.0], 1.0, GREEN);
        assert_eq!(result, Err(DrawError::OddCoordinates(5)));
        assert_eq!(green_pixels(&canvas), 0);
    }

    #[test]
    fn test_single_point_rejected() {
        let mut canvas = Canvas::new(20.0, 20.0, 1.0);
        assert_eq!(
            canvas.polyline(&[1.0, 1.0], 1.0, GREEN),
            Err(DrawError::TooFewPoints(1))
        );
    }

    #[test]
    fn test_horizontal_line_hits_its_row() {
        let mut canvas = Canvas::new(20.0, 20.0, 1.0);
        canvas.fill(BLACK);
        canvas.line(2.0, 10.5, 18.0, 10.5, 1.0, GREEN);

        let image = canvas.image();
        assert!(image.get_pixel(10, 10).0[1] > 200);
        assert_eq!(image.get_pixel(10, 2).0[1], 0);
    }

    #[test]
    fn test_dashed_line_leaves_gaps() {
        let mut solid = Canvas::new(40.0, 10.0, 1.0);
        solid.fill(BLACK);
        solid.line(0.0, 5.5, 40.0, 5.5, 1.0, GREEN);

        let mut dashed = Canvas::new(40.0, 10.0, 1.0);
        dashed.fill(BLACK);
        dashed.dashed_line(0.0, 5.5, 40.0, 5.5, 1.0, 4.0, 4.0, GREEN);

        let solid_count = green_pixels(&solid);
        let dashed_count = green_pixels(&dashed);
        assert!(dashed_count > 0);
        assert!(dashed_count < solid_count);
    }

    #[test]
    fn test_clear_rect_only_touches_region() {
        let mut canvas = Canvas::new(10.0, 10.0, 1.0);
        canvas.fill(GREEN);
        canvas.clear_rect(2.0, 2.0, 4.0, 4.0, BLACK);

        assert_eq!(*canvas.image().get_pixel(3, 3), BLACK);
        assert_eq!(*canvas.image().get_pixel(8, 8), GREEN);
    }

    #[test]
    fn test_rounded_rect_is_hollow() {
        let mut canvas = Canvas::new(40.0, 40.0, 1.0);
        canvas.fill(BLACK);
        canvas.rounded_rect(5.0, 5.0, 30.0, 30.0, 6.0, 1.0, GREEN);

        assert!(green_pixels(&canvas) > 0);
        assert_eq!(canvas.image().get_pixel(20, 20).0[1], 0);
        // Straight edge is drawn
        assert!(canvas.image().get_pixel(20, 5).0[1] > 0);
    }

    #[test]
    fn test_text_stays_inside_its_box() {
        let font = LabelFont::load().unwrap();
        let mut canvas = Canvas::new(80.0, 40.0, 2.0);
        canvas.fill(BLACK);
        canvas.text(10.0, 10.0, "+5.0V", &font, 10.0, GREEN);
        assert!(lit_pixels(&canvas) > 20);

        // Logical box scaled to pixels, with slack for partial coverage
        let right = (10.0 + font.text_width("+5.0V", 10.0)) * 2.0 + 2.0;
        let bottom = (10.0 + font.line_height(10.0)) * 2.0 + 2.0;
        for (x, y, p) in canvas.image().enumerate_pixels() {
            if p.0[1] > 0 {
                assert!(x as f32 >= 19.0 && (x as f32) <= right, "x {} outside", x);
                assert!(y as f32 >= 19.0 && (y as f32) <= bottom, "y {} outside", y);
            }
        }
    }

    #[test]
    fn test_text_clipped_at_the_edge() {
        let font = LabelFont::load().unwrap();
        let mut canvas = Canvas::new(12.0, 12.0, 1.0);
        canvas.fill(BLACK);
        // Runs off the right and bottom edges without panicking
        canvas.text(4.0, 6.0, "+12.50V", &font, 10.0, GREEN);
        canvas.text(-20.0, -20.0, "-1.3V", &font, 10.0, GREEN);
        assert!(lit_pixels(&canvas) > 0);
    }

    #[test]
    fn test_blank_text_draws_nothing() {
        let font = LabelFont::load().unwrap();
        let mut canvas = Canvas::new(40.0, 20.0, 1.0);
        canvas.fill(BLACK);
        canvas.text(2.0, 2.0, "   ", &font, 10.0, GREEN);
        canvas.text(2.0, 2.0, "", &font, 10.0, GREEN);
        assert_eq!(lit_pixels(&canvas), 0);
    }

    #[test]
    fn test_swap_image() {
        let mut canvas = Canvas::new(4.0, 4.0, 1.0);
        canvas.fill(GREEN);
        let mut other = RgbaImage::new(4, 4);

        canvas.swap_image(&mut other);
        assert_eq!(*other.get_pixel(0, 0), GREEN);
        assert_eq!(canvas.image().get_pixel(0, 0).0[3], 0);
    }
}
