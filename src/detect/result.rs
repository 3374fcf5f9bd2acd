use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Label used when the service omits a class, and by the fallback generator.
pub const DEFAULT_LABEL: &str = "Violence";

/// Inbound result message from the inference service.
#[derive(Clone, Debug, Deserialize)]
pub struct InferenceMessage {
    pub detections: Vec<RawDetection>,
}

/// One detection as sent by the service: corner points plus a 0..1 score.
#[derive(Clone, Debug, Deserialize)]
pub struct RawDetection {
    /// `[x0, y0, x1, y1]`, normalized to the frame.
    pub bbox: [f64; 4],
    pub confidence: f64,
    #[serde(default)]
    pub class: Option<String>,
}

/// Frame-relative rectangle with a 0..100 confidence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub confidence: f64,
    pub label: String,
}

impl InferenceMessage {
    pub fn parse(text: &str) -> Result<Self, SessionError> {
        serde_json::from_str(text).map_err(|e| SessionError::Parse(e.to_string()))
    }

    pub fn into_boxes(self) -> Vec<DetectionBox> {
        self.detections
            .into_iter()
            .map(RawDetection::into_box)
            .collect()
    }
}

impl RawDetection {
    /// Convert corner points to `(x, y, width, height)` and rescale confidence.
    ///
    /// Coordinates are clamped into the frame; inverted corners collapse to a
    /// zero-size box.
    pub fn into_box(self) -> DetectionBox {
        let [x0, y0, x1, y1] = self.bbox.map(unit);
        DetectionBox {
            x: x0,
            y: y0,
            width: (x1 - x0).max(0.0),
            height: (y1 - y0).max(0.0),
            confidence: unit(self.confidence) * 100.0,
            label: self
                .class
                .filter(|class| !class.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_LABEL.to_string()),
        }
    }
}

fn unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
