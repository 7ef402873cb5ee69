use std::path::{Path, PathBuf};
use std::time::Duration;

use image::Rgba;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capture::SourceKind;
use crate::compositor::CrtParams;
use crate::render::{Palette, PlotLayout, RasterConfig};

const APP_DIR: &str = "crt-scope";

/// Errors from reading or writing the settings file
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid settings JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Returns the app's config directory: `~/.config/crt-scope`
fn config_dir() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(APP_DIR);
    path
}

/// Returns the path to the settings file: `~/.config/crt-scope/settings.json`
pub fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

/// Persisted application settings.
///
/// Serialized as JSON to the platform config directory.
/// Fields use `#[serde(default)]` so that adding new settings
/// won't break existing config files.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeSettings {
    // Signal
    pub source: SourceKind,
    /// Volts at normalized sample 1.0
    pub full_scale_volts: f32,

    // Timing
    pub tick_rate_hz: f32,
    /// Bounded wait per sample; `None` waits one tick interval
    pub sample_timeout_ms: Option<u64>,
    pub samples_per_tick: usize,
    pub stats_interval_ms: u64,

    // Surface (logical units)
    pub width: f32,
    pub height: f32,
    pub margin: f32,
    pub inner_margin: f32,
    pub grid_spacing: f32,
    pub trace_width: f32,
    /// Supersampling of the offscreen image
    pub render_scale: f32,
    /// On-screen size relative to the logical surface
    pub present_scale: f32,

    // Colors (stored as u8 triples since Rgba isn't serde-friendly)
    pub trace_color: [u8; 3],
    pub grid_color: [u8; 3],
    pub background_color: [u8; 3],

    // CRT
    pub crt: CrtParams,
}

impl Default for ScopeSettings {
    fn default() -> Self {
        Self {
            source: SourceKind::Sine,
            full_scale_volts: 5.0,

            tick_rate_hz: 60.0,
            sample_timeout_ms: None,
            samples_per_tick: 1,
            stats_interval_ms: 1000,

            width: 400.0,
            height: 250.0,
            margin: 20.0,
            inner_margin: 10.0,
            grid_spacing: 20.0,
            trace_width: 1.5,
            render_scale: 2.0,
            present_scale: 1.8,

            trace_color: [100, 255, 100],
            grid_color: [60, 80, 60],
            background_color: [10, 20, 10],

            crt: CrtParams::default(),
        }
    }
}

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

fn rgba([r, g, b]: [u8; 3], a: u8) -> Rgba<u8> {
    Rgba([r, g, b, a])
}

impl ScopeSettings {
    /// Load settings from disk, falling back to defaults on any error.
    pub fn load() -> Self {
        let path = settings_path();
        match Self::load_from(&path) {
            Ok(settings) => {
                log::info!("Loaded settings from {}", path.display());
                settings
            }
            Err(SettingsError::Io(e)) => {
                log::info!("No settings file found ({}), using defaults", e);
                Self::default()
            }
            Err(e) => {
                log::warn!("Failed to parse settings ({}), using defaults", e);
                Self::default()
            }
        }
    }

    /// Read and sanitize settings from `path`
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let contents = std::fs::read_to_string(path)?;
        let mut settings: Self = serde_json::from_str(&contents)?;
        settings.sanitize();
        Ok(settings)
    }

    /// Save settings to disk as pretty JSON.
    pub fn save(&self) {
        let path = settings_path();
        match self.save_to(&path) {
            Ok(()) => log::debug!("Saved settings to {}", path.display()),
            Err(e) => log::warn!("Failed to write settings: {}", e),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Pull every field back into its valid range
    pub fn sanitize(&mut self) {
        let d = Self::default();

        self.full_scale_volts = finite_or(self.full_scale_volts, d.full_scale_volts).clamp(0.1, 1000.0);
        self.tick_rate_hz = finite_or(self.tick_rate_hz, d.tick_rate_hz).clamp(1.0, 240.0);
        self.sample_timeout_ms = self.sample_timeout_ms.map(|ms| ms.clamp(1, 5000));
        self.samples_per_tick = self.samples_per_tick.clamp(1, 64);
        self.stats_interval_ms = self.stats_interval_ms.clamp(100, 60_000);

        self.width = finite_or(self.width, d.width).clamp(100.0, 4000.0);
        self.height = finite_or(self.height, d.height).clamp(60.0, 4000.0);
        // At least a few columns and rows must remain inside the margins
        let max_margin = self.width.min(self.height) / 2.0 - 8.0;
        self.margin = finite_or(self.margin, d.margin).clamp(8.0, max_margin);
        let plot_height = self.height - 2.0 * self.margin;
        self.inner_margin = finite_or(self.inner_margin, d.inner_margin).clamp(0.0, (plot_height / 2.0 - 2.0).max(0.0));
        self.grid_spacing = finite_or(self.grid_spacing, d.grid_spacing).clamp(5.0, 500.0);
        self.trace_width = finite_or(self.trace_width, d.trace_width).clamp(0.5, 10.0);
        self.render_scale = finite_or(self.render_scale, d.render_scale).clamp(0.5, 4.0);
        self.present_scale = finite_or(self.present_scale, d.present_scale).clamp(0.5, 4.0);

        self.crt.sanitize();
    }

    pub fn layout(&self) -> PlotLayout {
        PlotLayout {
            width: self.width,
            height: self.height,
            margin: self.margin,
            inner_margin: self.inner_margin,
        }
    }

    pub fn palette(&self) -> Palette {
        Palette {
            background: rgba(self.background_color, 255),
            border: rgba(self.grid_color, 255),
            grid: rgba(self.grid_color, 160),
            axis: rgba(self.grid_color, 230),
            label: rgba(self.trace_color, 200),
            trace: rgba(self.trace_color, 255),
        }
    }

    pub fn raster_config(&self) -> RasterConfig {
        RasterConfig {
            layout: self.layout(),
            render_scale: self.render_scale,
            full_scale: self.full_scale_volts,
            samples_per_tick: self.samples_per_tick,
            grid_spacing: self.grid_spacing,
            trace_width: self.trace_width,
            palette: self.palette(),
        }
    }

    /// Time between rasterizer ticks
    pub fn tick_interval(&self) -> Duration {
        let rate = finite_or(self.tick_rate_hz, 60.0).clamp(1.0, 240.0);
        Duration::from_secs_f32(1.0 / rate)
    }

    /// Bounded wait for one sample
    pub fn sample_timeout(&self) -> Duration {
        match self.sample_timeout_ms {
            Some(ms) => Duration::from_millis(ms),
            None => self.tick_interval(),
        }
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }

    /// Where the next snapshot is written
    pub fn snapshot_path(&self, index: u32) -> PathBuf {
        config_dir()
            .join("snapshots")
            .join(format!("frame-{:04}.png", index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = ScopeSettings::default();
        assert_eq!(settings.layout().columns(), 360);
        assert_eq!(settings.sample_timeout(), settings.tick_interval());
        assert!((settings.tick_interval().as_secs_f32() - 1.0 / 60.0).abs() < 1e-6);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let settings = ScopeSettings {
            source: SourceKind::AudioInput,
            tick_rate_hz: 30.0,
            sample_timeout_ms: Some(5),
            trace_color: [1, 2, 3],
            ..ScopeSettings::default()
        };
        settings.save_to(&path).unwrap();

        let loaded = ScopeSettings::load_from(&path).unwrap();
        assert_eq!(loaded, settings);
        assert_eq!(loaded.sample_timeout(), Duration::from_millis(5));
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "tick_rate_hz": 30.0, "crt": { "glow": 0.1 } }"#).unwrap();

        let loaded = ScopeSettings::load_from(&path).unwrap();
        assert_eq!(loaded.tick_rate_hz, 30.0);
        assert_eq!(loaded.full_scale_volts, 5.0);
        assert_eq!(loaded.crt.glow, 0.1);
        assert_eq!(loaded.crt.threshold, CrtParams::default().threshold);
    }

    #[test]
    fn test_bad_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            ScopeSettings::load_from(&path),
            Err(SettingsError::Json(_))
        ));
        assert!(matches!(
            ScopeSettings::load_from(&dir.path().join("missing.json")),
            Err(SettingsError::Io(_))
        ));
    }

    #[test]
    fn test_sanitize() {
        let mut settings = ScopeSettings {
            tick_rate_hz: 0.0,
            full_scale_volts: f32::NAN,
            samples_per_tick: 0,
            margin: 500.0,
            sample_timeout_ms: Some(0),
            ..ScopeSettings::default()
        };
        settings.sanitize();

        assert_eq!(settings.tick_rate_hz, 1.0);
        assert_eq!(settings.full_scale_volts, 5.0);
        assert_eq!(settings.samples_per_tick, 1);
        assert_eq!(settings.margin, 117.0);
        assert!(settings.layout().columns() >= 16);
        assert_eq!(settings.sample_timeout_ms, Some(1));
    }

    #[test]
    fn test_raster_config_follows_settings() {
        let settings = ScopeSettings {
            full_scale_volts: 3.3,
            samples_per_tick: 4,
            ..ScopeSettings::default()
        };
        let config = settings.raster_config();
        assert_eq!(config.full_scale, 3.3);
        assert_eq!(config.samples_per_tick, 4);
        assert_eq!(config.palette.trace, Rgba([100, 255, 100, 255]));
    }
}
