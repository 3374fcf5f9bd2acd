//! Cross-view handoff record.
//!
//! When the operator leaves the live panel for the results view, the session
//! writes the event history, the playable source reference and a last
//! snapshot into the key-value store. The results view (and the
//! `export_events` tool) read them back from there.

use anyhow::{Context, Result};

use crate::detect::aggregator::{summarize, EventSummary};
use crate::detect::DetectionEvent;
use crate::storage::{read_key, remove_key, write_key, SharedStore};

pub const EVENTS_KEY: &str = "detection-events";
pub const VIDEO_SRC_KEY: &str = "lastVideoSrc";
pub const SNAPSHOT_KEY: &str = "lastSnapshot";

#[derive(Clone, Debug, Default, PartialEq)]
pub struct HandoffRecord {
    /// Newest first.
    pub events: Vec<DetectionEvent>,
    pub last_video_src: Option<String>,
    /// JPEG data URL.
    pub last_snapshot: Option<String>,
}

impl HandoffRecord {
    pub fn summary(&self) -> EventSummary {
        summarize(&self.events)
    }

    /// Write the record. A missing video source removes the stored one; a
    /// missing snapshot leaves the previous snapshot in place.
    pub fn publish(&self, store: &SharedStore) -> Result<()> {
        let events = serde_json::to_string(&self.events).context("serialize detection events")?;
        write_key(store, EVENTS_KEY, &events)?;
        match self.last_video_src.as_deref().filter(|src| !src.is_empty()) {
            Some(src) => write_key(store, VIDEO_SRC_KEY, src)?,
            None => remove_key(store, VIDEO_SRC_KEY)?,
        }
        if let Some(snapshot) = &self.last_snapshot {
            store_snapshot(store, snapshot)?;
        }
        log::info!(
            "published {} events for the results view (video source: {})",
            self.events.len(),
            self.last_video_src.as_deref().unwrap_or("none")
        );
        Ok(())
    }

    pub fn load(store: &SharedStore) -> Result<Self> {
        let events = match read_key(store, EVENTS_KEY)? {
            Some(raw) => serde_json::from_str(&raw).context("parse stored detection events")?,
            None => Vec::new(),
        };
        Ok(Self {
            events,
            last_video_src: read_key(store, VIDEO_SRC_KEY)?,
            last_snapshot: read_key(store, SNAPSHOT_KEY)?,
        })
    }
}

pub fn store_snapshot(store: &SharedStore, data_url: &str) -> Result<()> {
    write_key(store, SNAPSHOT_KEY, data_url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{shared, InMemoryKvStore};
    use chrono::{TimeZone, Utc};

    fn event(confidence: f64) -> DetectionEvent {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        DetectionEvent::new(confidence, "movinet-a1", None, ts)
    }

    #[test]
    fn record_round_trips_through_store() {
        let store = shared(InMemoryKvStore::new());
        let record = HandoffRecord {
            events: vec![event(95.0), event(72.0)],
            last_video_src: Some("file:///tmp/clip.mp4".into()),
            last_snapshot: Some("data:image/jpeg;base64,AAAA".into()),
        };
        record.publish(&store).unwrap();

        let raw = read_key(&store, EVENTS_KEY).unwrap().unwrap();
        assert!(raw.contains("\"timestamp\":\"2024-03-09T14:05:07.000Z\""));

        let loaded = HandoffRecord::load(&store).unwrap();
        assert_eq!(loaded, record);
        let summary = loaded.summary();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.high_confidence, 1);
        assert_eq!(summary.average_display(), "83.5");
    }

    #[test]
    fn camera_sessions_clear_video_source() {
        let store = shared(InMemoryKvStore::new());
        write_key(&store, VIDEO_SRC_KEY, "rtsp://old").unwrap();
        write_key(&store, SNAPSHOT_KEY, "data:image/jpeg;base64,OLD").unwrap();

        HandoffRecord::default().publish(&store).unwrap();

        let loaded = HandoffRecord::load(&store).unwrap();
        assert!(loaded.events.is_empty());
        assert_eq!(loaded.last_video_src, None);
        assert_eq!(loaded.last_snapshot.as_deref(), Some("data:image/jpeg;base64,OLD"));
    }

    #[test]
    fn empty_store_loads_empty_record() {
        let store = shared(InMemoryKvStore::new());
        assert_eq!(HandoffRecord::load(&store).unwrap(), HandoffRecord::default());
    }

    #[test]
    fn malformed_events_are_reported() {
        let store = shared(InMemoryKvStore::new());
        write_key(&store, EVENTS_KEY, "{not json").unwrap();
        assert!(HandoffRecord::load(&store).is_err());
    }
}
