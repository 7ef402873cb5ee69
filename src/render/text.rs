//! Label text - glyph outlines from the UI's bundled font
//!
//! The scale labels are drawn with the same proportional face egui uses for
//! its widgets, so the plot and the controls around it read alike. Glyphs
//! are laid out on a single line (kerning applied) and rasterized by the
//! canvas from their outline coverage.

use ab_glyph::{point, Font, FontArc, Glyph, GlyphId, PxScale, ScaleFont};
use eframe::egui;
use thiserror::Error;

/// Key of the proportional face in egui's default font set
const LABEL_FONT: &str = "Ubuntu-Light";

/// Errors that can occur while loading the label font
#[derive(Error, Debug)]
pub enum TextError {
    #[error("Font {0} is not bundled")]
    MissingFont(&'static str),

    #[error("Failed to parse font: {0}")]
    FontError(String),
}

/// Parsed font used for every label
#[derive(Clone)]
pub struct LabelFont {
    font: FontArc,
}

impl LabelFont {
    /// Load the proportional face shipped with egui
    pub fn load() -> Result<Self, TextError> {
        let definitions = egui::FontDefinitions::default();
        let data = definitions
            .font_data
            .get(LABEL_FONT)
            .ok_or(TextError::MissingFont(LABEL_FONT))?;
        Self::from_bytes(data.font.to_vec())
    }

    /// Parse a TTF/OTF font from its bytes
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, TextError> {
        let font = FontArc::try_from_vec(bytes).map_err(|e| TextError::FontError(e.to_string()))?;
        Ok(Self { font })
    }

    pub fn font(&self) -> &FontArc {
        &self.font
    }

    /// Position the glyphs of `text` with the top of the line at `(x, y)`
    ///
    /// Returns the glyphs and the advance of the whole line. `size` is the
    /// pixel height of the face.
    pub fn layout(&self, text: &str, size: f32, x: f32, y: f32) -> (Vec<Glyph>, f32) {
        let scale = PxScale::from(size);
        let scaled = self.font.as_scaled(scale);
        let baseline = y + scaled.ascent();

        let mut glyphs = Vec::with_capacity(text.len());
        let mut caret = x;
        let mut previous: Option<GlyphId> = None;
        for c in text.chars() {
            let id = scaled.glyph_id(c);
            if let Some(previous) = previous {
                caret += scaled.kern(previous, id);
            }
            glyphs.push(id.with_scale_and_position(scale, point(caret, baseline)));
            caret += scaled.h_advance(id);
            previous = Some(id);
        }

        (glyphs, caret - x)
    }

    /// Advance width of `text` at `size`
    pub fn text_width(&self, text: &str, size: f32) -> f32 {
        self.layout(text, size, 0.0, 0.0).1
    }

    /// Distance from the top of the line to the lowest descender
    pub fn line_height(&self, size: f32) -> f32 {
        self.font.as_scaled(PxScale::from(size)).height()
    }
}
