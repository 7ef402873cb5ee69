//! Signal statistics - amplitude, frequency and wavelength
//!
//! Advisory numbers shown next to the trace. They are computed from every
//! successful reading on the sampler thread and published as a small
//! snapshot that the UI polls on its own slow interval. Nothing in the
//! rendering math depends on them.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Snapshot handed to the UI
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SignalStats {
    /// Half the peak-to-peak swing, in volts
    pub amplitude: f32,
    /// Hz, zero until a full wave has been observed
    pub frequency: f32,
    /// Seconds between peaks, zero until measured
    pub wavelength: f32,
}

/// Fraction of the amplitude treated as "still at the peak"
const PEAK_BAND: f32 = 0.05;

/// Rolling history of readings with peak tracking
///
/// Min and max only ever widen; the mean is kept incrementally over the
/// last `capacity` readings.
pub struct SignalHistory {
    data: Vec<f32>,
    head: usize,
    average: f32,
    min: f32,
    max: f32,
    /// When the signal last left the peak band
    left_peak_at: Option<Instant>,
    wavelength: Option<Duration>,
    frequency: f32,
    full_scale: f32,
}

impl SignalHistory {
    pub fn new(capacity: usize, rest: f32, full_scale: f32) -> Self {
        Self {
            data: vec![rest; capacity.max(1)],
            head: 0,
            average: rest,
            min: rest,
            max: rest,
            left_peak_at: None,
            wavelength: None,
            frequency: 0.0,
            full_scale,
        }
    }

    /// Record a reading taken now
    pub fn push(&mut self, value: f32) {
        self.push_at(value, Instant::now());
    }

    /// Record a reading taken at `now`
    pub fn push_at(&mut self, value: f32, now: Instant) {
        let len = self.data.len() as f32;
        let old = self.data[self.head];
        self.data[self.head] = value;
        self.average += (value - old) / len;
        self.head = (self.head + 1) % self.data.len();

        self.max = self.max.max(value);
        self.min = self.min.min(value);

        let band = (self.max - self.min) / 2.0 * PEAK_BAND;

        if self.max - value > band {
            if self.left_peak_at.is_none() {
                self.left_peak_at = Some(now);
            }
        } else if let Some(left_at) = self.left_peak_at.take() {
            // Back at the peak: one full wave since we left it
            let wavelength = now.saturating_duration_since(left_at);
            if !wavelength.is_zero() {
                self.wavelength = Some(wavelength);
                self.frequency = 1.0 / wavelength.as_secs_f32();
            }
        }
    }

    /// Running mean of the retained readings (normalized)
    pub fn average(&self) -> f32 {
        self.average
    }

    pub fn stats(&self) -> SignalStats {
        SignalStats {
            amplitude: (self.max - self.min) / 2.0 * self.full_scale,
            frequency: self.frequency,
            wavelength: self.wavelength.map(|d| d.as_secs_f32()).unwrap_or(0.0),
        }
    }
}

/// Shared, pollable statistics snapshot
#[derive(Clone, Default)]
pub struct StatsFeed {
    inner: Arc<Mutex<SignalStats>>,
}

impl StatsFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a new snapshot (sampler thread)
    pub fn publish(&self, stats: SignalStats) {
        if let Ok(mut guard) = self.inner.lock() {
            *guard = stats;
        }
    }

    /// Latest snapshot (UI thread)
    pub fn read(&self) -> SignalStats {
        self.inner.lock().map(|guard| *guard).unwrap_or_default()
    }
}
