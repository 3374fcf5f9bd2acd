//! Threshold filtering and the capped event history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::result::DetectionBox;

/// Maximum number of events retained, newest first.
pub const MAX_EVENTS: usize = 50;

/// Confidence at or above which an event counts as high confidence.
pub const HIGH_CONFIDENCE: f64 = 90.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionEvent {
    pub id: String,
    #[serde(with = "timestamp_millis")]
    pub timestamp: DateTime<Utc>,
    pub confidence: f64,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_false_positive: bool,
}

impl DetectionEvent {
    pub fn new(
        confidence: f64,
        model: &str,
        thumbnail: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: format!(
                "event-{}-{}",
                timestamp.timestamp_millis(),
                hex::encode(rand::random::<[u8; 4]>())
            ),
            timestamp,
            confidence,
            model: model.to_string(),
            thumbnail,
            note: None,
            is_false_positive: false,
        }
    }

    /// Fixed-width RFC 3339 form, so string order matches time order.
    pub fn timestamp_string(&self) -> String {
        format_timestamp(&self.timestamp)
    }
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

mod timestamp_millis {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// True when a box becomes an event at `threshold`.
pub fn qualifies(detection: &DetectionBox, threshold: u8) -> bool {
    detection.confidence >= f64::from(threshold)
}

/// View filter over the history. Filtering never mutates stored events.
#[derive(Clone, Debug, Default)]
pub struct EventFilter {
    /// Hide events below `threshold`.
    pub high_confidence_only: bool,
    pub threshold: u8,
    /// Substring matched against the event timestamp.
    pub text: String,
}

impl EventFilter {
    pub fn matches(&self, event: &DetectionEvent) -> bool {
        if event.is_false_positive {
            return false;
        }
        if self.high_confidence_only && event.confidence < f64::from(self.threshold) {
            return false;
        }
        let text = self.text.trim();
        text.is_empty() || event.timestamp_string().contains(text)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EventSummary {
    pub total: usize,
    pub high_confidence: usize,
    pub average_confidence: f64,
}

impl EventSummary {
    /// Average confidence to one decimal, `"0.0"` when empty.
    pub fn average_display(&self) -> String {
        format!("{:.1}", self.average_confidence)
    }
}

pub fn summarize<'a>(events: impl IntoIterator<Item = &'a DetectionEvent>) -> EventSummary {
    let mut total = 0usize;
    let mut high_confidence = 0usize;
    let mut sum = 0.0;
    for event in events {
        total += 1;
        sum += event.confidence;
        if event.confidence >= HIGH_CONFIDENCE {
            high_confidence += 1;
        }
    }
    EventSummary {
        total,
        high_confidence,
        average_confidence: if total == 0 { 0.0 } else { sum / total as f64 },
    }
}

/// Owns the event history.
#[derive(Clone, Debug, Default)]
pub struct DetectionAggregator {
    history: VecDeque<DetectionEvent>,
}

impl DetectionAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a stored history (newest first), keeping at most `MAX_EVENTS`.
    pub fn restore(events: Vec<DetectionEvent>) -> Self {
        let mut history: VecDeque<DetectionEvent> = events.into();
        history.truncate(MAX_EVENTS);
        Self { history }
    }

    /// Turn qualifying boxes into events. `thumbnail` is called once per
    /// created event. Returns the number of events created.
    pub fn ingest<F>(
        &mut self,
        boxes: &[DetectionBox],
        threshold: u8,
        model: &str,
        mut thumbnail: F,
    ) -> usize
    where
        F: FnMut() -> Option<String>,
    {
        let mut created = 0;
        for detection in boxes.iter().filter(|b| qualifies(b, threshold)) {
            let event = DetectionEvent::new(detection.confidence, model, thumbnail(), Utc::now());
            self.record(event);
            created += 1;
        }
        created
    }

    /// Prepend one event and evict beyond capacity.
    pub fn record(&mut self, event: DetectionEvent) {
        self.history.push_front(event);
        self.history.truncate(MAX_EVENTS);
    }

    pub fn events(&self) -> impl Iterator<Item = &DetectionEvent> {
        self.history.iter()
    }

    pub fn to_vec(&self) -> Vec<DetectionEvent> {
        self.history.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&DetectionEvent> {
        self.history.front()
    }

    pub fn get(&self, id: &str) -> Option<&DetectionEvent> {
        self.history.iter().find(|event| event.id == id)
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Attach or clear an operator note. Returns false for unknown ids.
    pub fn annotate(&mut self, id: &str, note: Option<String>) -> bool {
        match self.history.iter_mut().find(|event| event.id == id) {
            Some(event) => {
                event.note = note.filter(|n| !n.trim().is_empty());
                true
            }
            None => false,
        }
    }

    pub fn mark_false_positive(&mut self, id: &str, flag: bool) -> bool {
        match self.history.iter_mut().find(|event| event.id == id) {
            Some(event) => {
                event.is_false_positive = flag;
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    pub fn visible<'a>(&'a self, filter: &'a EventFilter) -> impl Iterator<Item = &'a DetectionEvent> {
        self.history.iter().filter(move |event| filter.matches(event))
    }

    pub fn summary(&self) -> EventSummary {
        summarize(self.history.iter())
    }
}
