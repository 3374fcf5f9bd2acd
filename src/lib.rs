//! Live Detection Session Controller
//!
//! This crate drives a live video-monitoring workflow: an operator attaches a
//! video source, starts a detection session, watches bounding-box overlays and
//! a rolling event log, and exports the results.
//!
//! # Architecture
//!
//! The controller holds the following guarantees by construction:
//!
//! 1. **One source**: At most one video source is attached; connecting another
//!    tears the previous one down first.
//! 2. **Ordered state**: `detecting` implies `streaming` implies `connected`.
//! 3. **Bounded history**: The event log keeps the newest 50 events.
//! 4. **No stale results**: Inputs from a stopped session are discarded.
//! 5. **Degraded, not dead**: Losing the inference service switches to the
//!    fallback generator instead of ending the session.
//!
//! # Module Structure
//!
//! - `session`: `SessionController`, status observers, scheduled tasks
//! - `ingest`: Video sources (camera, stream, file) behind `MediaProvider`
//! - `detect`: Inference link, wire format, fallback generator, aggregator
//! - `frame`: Still frames, JPEG encoding, thumbnails
//! - `metrics`: Live metrics and overlay projection
//! - `prefs`, `storage`: Persisted preferences on a key-value store
//! - `handoff`, `export`: Results handoff record and CSV export
//! - `config`: Daemon configuration

pub mod config;
pub mod detect;
pub mod error;
pub mod export;
pub mod frame;
pub mod handoff;
pub mod ingest;
pub mod metrics;
pub mod prefs;
pub mod session;
pub mod storage;

pub use config::PanelConfig;
pub use detect::{
    DetectionAggregator, DetectionBox, DetectionEvent, EventFilter, EventSummary,
    FallbackGenerator, InferenceLink, MAX_EVENTS,
};
pub use error::SessionError;
pub use frame::Frame;
pub use handoff::HandoffRecord;
pub use ingest::{
    CameraDevice, MediaProvider, MediaTrack, Source, SourceAcquirer, SyntheticProvider,
    VideoFile, DEFAULT_CAMERA,
};
pub use metrics::{LiveMetrics, OverlayRect};
pub use prefs::{InputMode, PreferenceStore, Preferences, Sensitivity};
pub use session::{
    ConnectionState, DetectionState, Notice, NoticeLevel, SessionController, SessionSettings,
    SessionStatus, SessionUpdate, Snapshot,
};
pub use storage::{InMemoryKvStore, KeyValueStore, SharedStore, SqliteKvStore};
