//! Running-average smoothing for noisy tracker positions.
//!
//! Skeletal trackers report joints with several millimeters of jitter per
//! frame.  `Smoother` keeps the last N samples in a ring buffer and returns
//! their per-channel mean.

use glam::Vec3;

/// Default number of samples in the averaging window.
pub const DEFAULT_WINDOW: usize = 20;

/// Fixed-capacity running-average filter over 3D samples.
#[derive(Debug, Clone)]
pub struct Smoother {
    samples: Vec<Vec3>,
    /// Next write position, always in `[0, capacity)`.
    index: usize,
    /// Set once the buffer has been filled at least once.
    wrap: bool,
}

impl Smoother {
    /// Create a smoother holding `capacity` samples (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: vec![Vec3::ZERO; capacity.max(1)],
            index: 0,
            wrap: false,
        }
    }

    /// Number of samples the buffer holds once full.
    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    /// Whether the buffer has wrapped at least once.
    #[cfg(test)]
    pub fn is_full(&self) -> bool {
        self.wrap
    }

    /// Number of samples currently contributing to the average.
    pub fn len(&self) -> usize {
        if self.wrap {
            self.samples.len()
        } else {
            self.index
        }
    }

    /// Whether no sample has been added yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record a sample, overwriting the oldest one once full.
    pub fn add(&mut self, sample: Vec3) {
        self.samples[self.index] = sample;
        self.index += 1;
        if self.index == self.samples.len() {
            self.index = 0;
            self.wrap = true;
        }
    }

    /// Per-channel mean of the buffered samples, or `None` before the first `add`.
    pub fn average(&self) -> Option<Vec3> {
        let live = &self.samples[..self.len()];
        if live.is_empty() {
            return None;
        }
        let sum = live.iter().fold(Vec3::ZERO, |acc, s| acc + *s);
        Some(sum / live.len() as f32)
    }
}

impl Default for Smoother {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

// ── Tests ──────────────────────────────────────────────────
