//! Capture module - everything between the signal and the ring buffer
//!
//! This module provides:
//! - Fixed-size ring buffer with a phase cursor
//! - Sample sources (synthetic sine, live audio input)
//! - Sampler worker with a bounded wait per reading
//! - Advisory signal statistics

mod input;
mod ring;
mod sampler;
mod source;
mod stats;

pub use input::AudioInputSource;
pub use ring::{RingBuffer, Statistics, MIDPOINT};
pub use sampler::{Sampler, SourceFactory, StatsSink};
pub use source::{SampleSource, SineSource, SourceError, SourceKind};
pub use stats::{SignalStats, StatsFeed};
