//! Local stand-in for the inference link.
//!
//! Used only when no live channel is available. Every box it produces is
//! synthetic, so an active generator can hide a dead backend; the session logs
//! a warning each time it is switched on and it can be disabled in config.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

use super::result::{DetectionBox, DEFAULT_LABEL};

pub const DEFAULT_TICK: Duration = Duration::from_millis(100);
pub const DEFAULT_PROBABILITY: f64 = 0.1;

/// Synthetic instrumentation reported alongside generated boxes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SyntheticMetrics {
    pub fps: f64,
    pub latency_ms: f64,
}

pub struct FallbackGenerator {
    rng: StdRng,
    probability: f64,
}

impl FallbackGenerator {
    pub fn new(probability: f64) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            probability: probability.clamp(0.0, 1.0),
        }
    }

    pub fn with_seed(probability: f64, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            probability: probability.clamp(0.0, 1.0),
        }
    }

    /// One tick: maybe one box with confidence in [60, 100).
    pub fn tick(&mut self) -> Option<DetectionBox> {
        if !self.rng.gen_bool(self.probability) {
            return None;
        }
        Some(DetectionBox {
            x: self.rng.gen_range(0.1..0.7),
            y: self.rng.gen_range(0.1..0.7),
            width: self.rng.gen_range(0.1..0.3),
            height: self.rng.gen_range(0.1..0.3),
            confidence: self.rng.gen_range(60.0..100.0),
            label: DEFAULT_LABEL.to_string(),
        })
    }

    /// Plausible fps (25-30) and latency (50-100ms).
    pub fn metrics(&mut self) -> SyntheticMetrics {
        SyntheticMetrics {
            fps: self.rng.gen_range(25.0..30.0),
            latency_ms: self.rng.gen_range(50.0..100.0),
        }
    }
}
