//! Render module - offscreen drawing of the scope plot
//!
//! This module provides:
//! - Software canvas with anti-aliased primitives
//! - Label text from the bundled UI font
//! - Sample-to-screen mapping
//! - The rasterizer and the thread that drives it

mod canvas;
mod mapping;
mod rasterizer;
mod text;

pub use canvas::{Canvas, DrawError};
pub use mapping::PlotLayout;
pub use rasterizer::{Palette, RasterConfig, RasterLoop, Rasterizer};
