//! Ring buffer holding one normalized sample per display column
//!
//! The buffer is fixed at `N` slots for its whole lifetime. A single write
//! cursor (`phase`) picks the slot that receives the newest sample and also
//! decides the rotation used when the trace is drawn:
//!
//! ```text
//! display column i  ->  samples[(i + phase) % N]
//! ```
//!
//! Because the cursor is advanced right after each write, the slot at
//! `phase` always holds the oldest sample, so the oldest value lands on the
//! left edge and the newest on the right edge.
//!
//! ## Design Notes
//!
//! The buffer has no interior mutability. It is owned by the rasterizer
//! thread and every write happens on that thread, so nothing here needs a
//! lock.

/// Midpoint of the normalized range, used as the resting fill value
pub const MIDPOINT: f32 = 0.5;

/// Single-pass summary of the buffer contents
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Statistics {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
}

impl Statistics {
    /// Distance between the largest and smallest sample
    pub fn spread(&self) -> f32 {
        self.max - self.min
    }
}

/// Fixed-size circular store of normalized samples
#[derive(Clone, Debug)]
pub struct RingBuffer {
    /// Sample storage, always `len` long
    samples: Vec<f32>,
    /// Write cursor, always in `[0, len)`
    phase: usize,
}

impl RingBuffer {
    /// Create a buffer of `capacity` slots, every slot set to `fill`
    ///
    /// A zero capacity is bumped to one so the cursor arithmetic stays valid.
    pub fn new(capacity: usize, fill: f32) -> Self {
        Self {
            samples: vec![fill; capacity.max(1)],
            phase: 0,
        }
    }

    /// Number of slots (`N`)
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Current write cursor
    pub fn phase(&self) -> usize {
        self.phase
    }

    /// Store `value` at `index` unconditionally
    ///
    /// Callers keep `index` in `[0, N)`; an out-of-range index is a logic
    /// error and panics like any slice index would.
    pub fn write(&mut self, index: usize, value: f32) {
        self.samples[index] = value;
    }

    /// Move the cursor one slot forward, wrapping at `N`
    pub fn advance(&mut self) {
        self.phase = (self.phase + 1) % self.samples.len();
    }

    /// Value currently stored at `index`
    pub fn get(&self, index: usize) -> f32 {
        self.samples[index]
    }

    /// Samples in display order, oldest first and newest last
    pub fn read_ordered(&self) -> impl ExactSizeIterator<Item = f32> + '_ {
        let len = self.samples.len();
        (0..len).map(move |i| self.samples[(i + self.phase) % len])
    }

    /// Min, max and mean of the current contents in one pass
    pub fn statistics(&self) -> Statistics {
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        let mut sum = 0.0f64;

        for &sample in &self.samples {
            min = min.min(sample);
            max = max.max(sample);
            sum += sample as f64;
        }

        Statistics {
            min,
            max,
            mean: (sum / self.samples.len() as f64) as f32,
        }
    }

    /// Overwrite every slot with `value` and rewind the cursor
    pub fn fill(&mut self, value: f32) {
        self.samples.fill(value);
        self.phase = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_from(values: &[f32]) -> RingBuffer {
        let mut buffer = RingBuffer::new(values.len(), MIDPOINT);
        for (i, &v) in values.iter().enumerate() {
            buffer.write(i, v);
        }
        buffer
    }

    #[test]
    fn test_new_is_midpoint_filled() {
        let buffer = RingBuffer::new(8, MIDPOINT);
        assert_eq!(buffer.len(), 8);
        assert_eq!(buffer.phase(), 0);
        assert!(buffer.read_ordered().all(|s| s == MIDPOINT));
    }

    #[test]
    fn test_newest_sample_is_drawn_last() {
        let mut buffer = RingBuffer::new(5, MIDPOINT);

        // Wrap the cursor around more than once
        for m in 0..13 {
            let value = m as f32 / 100.0;
            let phase = buffer.phase();
            buffer.write(phase, value);
            buffer.advance();

            let ordered: Vec<f32> = buffer.read_ordered().collect();
            assert_eq!(ordered.len(), 5);
            assert_eq!(*ordered.last().unwrap(), value);
        }
    }

    #[test]
    fn test_ordered_read_is_oldest_first() {
        let mut buffer = RingBuffer::new(3, 0.0);
        for value in [0.1, 0.2, 0.3, 0.4] {
            let phase = buffer.phase();
            buffer.write(phase, value);
            buffer.advance();
        }

        let ordered: Vec<f32> = buffer.read_ordered().collect();
        assert_eq!(ordered, vec![0.2, 0.3, 0.4]);
    }

    #[test]
    fn test_statistics_scenario() {
        let buffer = buffer_from(&[0.0, 0.25, 0.5, 1.0]);
        let stats = buffer.statistics();

        assert_eq!(stats.min, 0.0);
        assert_eq!(stats.max, 1.0);
        assert!((stats.mean - 0.4375).abs() < 1e-6);
        assert!((stats.spread() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_statistics_scenario_voltages() {
        use crate::render::PlotLayout;
        use crate::scale::ScaleWindow;

        let buffer = buffer_from(&[0.0, 0.25, 0.5, 1.0]);
        let window = ScaleWindow::full(5.0);

        let volts: Vec<f32> = buffer.read_ordered().map(|s| s * window.max).collect();
        assert_eq!(volts, vec![0.0, 1.25, 2.5, 5.0]);
        let mean_volts = buffer.statistics().mean * window.max;
        assert!((mean_volts - 2.1875).abs() < 1e-5);

        // Full window: 0V on the lowest trace row, 5V on the highest
        let layout = PlotLayout::default();
        let ys: Vec<f32> = buffer
            .read_ordered()
            .map(|s| layout.sample_to_y(s, window, 5.0))
            .collect();
        assert!((ys[0] - 220.0).abs() < 1e-4);
        assert!((ys[3] - 30.0).abs() < 1e-4);
        assert!(ys.windows(2).all(|pair| pair[1] < pair[0]));
    }

    #[test]
    fn test_read_does_not_mutate() {
        let buffer = buffer_from(&[0.9, 0.1, 0.4]);
        let first: Vec<f32> = buffer.read_ordered().collect();
        let second: Vec<f32> = buffer.read_ordered().collect();
        assert_eq!(first, second);
        assert_eq!(buffer.phase(), 0);
    }

    #[test]
    fn test_fill_resets_contents_and_cursor() {
        let mut buffer = buffer_from(&[0.0, 1.0, 0.3]);
        buffer.advance();
        buffer.fill(MIDPOINT);

        assert_eq!(buffer.phase(), 0);
        let stats = buffer.statistics();
        assert_eq!(stats.min, MIDPOINT);
        assert_eq!(stats.max, MIDPOINT);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut buffer = RingBuffer::new(0, MIDPOINT);
        assert_eq!(buffer.len(), 1);
        buffer.advance();
        assert_eq!(buffer.phase(), 0);
    }
}
