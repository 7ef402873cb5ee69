//! Sample sources - where normalized voltage readings come from
//!
//! A source returns one reading per call, normalized to `[0, 1]` where `0`
//! is 0V and `1` is the full-scale voltage. Sources may be slow or fail;
//! the sampler runs them on their own thread and bounds how long the render
//! loop waits for an answer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors a source can report for a single reading
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("No input device found")]
    NoDevice,

    #[error("Audio device error: {0}")]
    Device(String),

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("No sample available yet")]
    Starved,

    #[error("Reading out of range: {0}")]
    OutOfRange(f32),

    #[error("Timed out waiting for a reading")]
    TimedOut,

    #[error("Sampler is not running")]
    Disconnected,
}

/// A provider of normalized voltage readings
///
/// `read` is called from the sampler thread only, so implementations
/// don't need to be `Sync`, and they are constructed on that thread so they
/// don't need to be `Send` either.
pub trait SampleSource {
    /// Take one reading in `[0, 1]`
    fn read(&mut self) -> Result<f32, SourceError>;

    /// Name shown in the UI and logs
    fn name(&self) -> &str;
}

/// Which source the pipeline should build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    /// Built-in sine generator
    Sine,
    /// Default audio input device via cpal
    AudioInput,
}

impl SourceKind {
    pub fn all() -> &'static [SourceKind] {
        &[SourceKind::Sine, SourceKind::AudioInput]
    }

    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::Sine => "Sine",
            SourceKind::AudioInput => "Audio input",
        }
    }
}

/// Check a raw reading and pass it through if it is a usable sample
pub fn validate(value: f32) -> Result<f32, SourceError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(SourceError::OutOfRange(value))
    }
}

/// Synthetic analog reading
///
/// An 8-bit counter wraps every 256 reads; each read maps
/// `(sin(k / 7) + 1) / 2` into `[low, high]`, giving a slow sine with a
/// small discontinuity at the wrap.
pub struct SineSource {
    ticker: u8,
    low: f32,
    high: f32,
}

impl SineSource {
    pub fn new() -> Self {
        Self::with_range(0.2, 0.8)
    }

    /// Sine confined to `[low, high]` (both in the normalized range)
    pub fn with_range(low: f32, high: f32) -> Self {
        Self {
            ticker: 0,
            low: low.clamp(0.0, 1.0),
            high: high.clamp(0.0, 1.0),
        }
    }
}

impl Default for SineSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleSource for SineSource {
    fn read(&mut self) -> Result<f32, SourceError> {
        self.ticker = self.ticker.wrapping_add(1);
        let angle = self.ticker as f32 / 7.0;
        let t = (angle.sin() + 1.0) / 2.0;
        Ok(self.low + (self.high - self.low) * t)
    }

    fn name(&self) -> &str {
        "Sine"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sine_stays_in_range() {
        let mut source = SineSource::new();
        for _ in 0..600 {
            let v = source.read().unwrap();
            assert!((0.199..=0.801).contains(&v), "reading {} escaped range", v);
        }
    }

    #[test]
    fn test_sine_wraps_after_256_reads() {
        let mut source = SineSource::new();
        let first: Vec<f32> = (0..10).map(|_| source.read().unwrap()).collect();
        for _ in 10..256 {
            source.read().unwrap();
        }
        let again: Vec<f32> = (0..10).map(|_| source.read().unwrap()).collect();
        assert_eq!(first, again);
    }

    #[test]
    fn test_validate() {
        assert_eq!(validate(0.0).unwrap(), 0.0);
        assert_eq!(validate(1.0).unwrap(), 1.0);
        assert!(validate(1.5).is_err());
        assert!(validate(-0.1).is_err());
        assert!(validate(f32::NAN).is_err());
    }
}
