//! Live metrics and overlay projection.
//!
//! Metrics are derived state: recomputed on every inference cycle, never
//! persisted. With a live link fps and latency are measured here; in fallback
//! mode the generator supplies synthetic values.

use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

use crate::detect::DetectionBox;

const FPS_WINDOW: Duration = Duration::from_secs(1);
const MAX_PENDING_SENDS: usize = 64;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveMetrics {
    pub fps: f64,
    pub latency_ms: f64,
    pub last_confidence: f64,
    /// Outbound frame queue occupancy, 0-100.
    pub buffer_fullness: f64,
}

#[derive(Debug, Default)]
pub struct MetricsProjector {
    metrics: LiveMetrics,
    results: VecDeque<Instant>,
    pending_sends: VecDeque<Instant>,
}

impl MetricsProjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> LiveMetrics {
        self.metrics
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn record_frame_sent(&mut self, at: Instant) {
        if self.pending_sends.len() == MAX_PENDING_SENDS {
            self.pending_sends.pop_front();
        }
        self.pending_sends.push_back(at);
    }

    /// A result arrived: latency from the oldest unanswered send, fps over the
    /// trailing one-second window.
    pub fn record_result(&mut self, at: Instant) {
        if let Some(sent) = self.pending_sends.pop_front() {
            self.metrics.latency_ms = at.saturating_duration_since(sent).as_secs_f64() * 1000.0;
        }
        self.results.push_back(at);
        while let Some(first) = self.results.front() {
            if at.saturating_duration_since(*first) > FPS_WINDOW {
                self.results.pop_front();
            } else {
                break;
            }
        }
        self.metrics.fps = self.results.len() as f64 / FPS_WINDOW.as_secs_f64();
    }

    pub fn record_accepted(&mut self, confidence: f64) {
        self.metrics.last_confidence = confidence;
    }

    pub fn set_buffer_fullness(&mut self, percent: f64) {
        self.metrics.buffer_fullness = percent.clamp(0.0, 100.0);
    }

    pub fn apply_synthetic(&mut self, fps: f64, latency_ms: f64) {
        self.metrics.fps = fps;
        self.metrics.latency_ms = latency_ms;
    }
}

/// Overlay rectangle in percent of the rendered video frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayRect {
    pub left_pct: f64,
    pub top_pct: f64,
    pub width_pct: f64,
    pub height_pct: f64,
    pub caption: String,
}

/// Boxes are already frame-relative, so projection is a straight scale.
pub fn project(boxes: &[DetectionBox]) -> Vec<OverlayRect> {
    boxes
        .iter()
        .map(|b| OverlayRect {
            left_pct: b.x * 100.0,
            top_pct: b.y * 100.0,
            width_pct: b.width * 100.0,
            height_pct: b.height * 100.0,
            caption: format!("{} {:.1}%", b.label, b.confidence),
        })
        .collect()
}
