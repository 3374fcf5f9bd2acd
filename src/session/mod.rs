//! Detection session controller.
//!
//! `SessionController` owns the connection and detection state, the active
//! source handle and the inference link. Every operator action is a method
//! on the controller; every timer and socket event arrives as a
//! `SessionInput` on one queue and is applied by `step()`, so state is only
//! ever touched from the task driving the controller.
//!
//! Inputs are tagged with the session generation current when their producer
//! was started. `stop_detection` and `disconnect` bump the generation, which
//! turns anything still queued into a no-op.

pub mod status;
pub mod task;

use chrono::Utc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;

use crate::config::PanelConfig;
use crate::detect::aggregator::{qualifies, EventFilter};
use crate::detect::fallback::{DEFAULT_PROBABILITY, DEFAULT_TICK};
use crate::detect::link::{SendOutcome, DEFAULT_OUTBOUND_CAPACITY};
use crate::detect::{
    DetectionAggregator, DetectionBox, DetectionEvent, FallbackGenerator, InferenceLink,
    InferenceMessage,
};
use crate::error::SessionError;
use crate::export::snapshot_filename;
use crate::handoff::{self, HandoffRecord};
use crate::ingest::{
    CameraDevice, MediaProvider, MediaTrack, Source, SourceAcquirer, TrackStats, DEFAULT_CAMERA,
};
use crate::metrics::{project, LiveMetrics, MetricsProjector, OverlayRect};
use crate::prefs::{self, InputMode, PreferenceStore, Preferences, Sensitivity};
use crate::storage::SharedStore;

pub use status::{ConnectionState, DetectionState, Notice, NoticeLevel, SessionStatus};
pub use task::{GuardToken, ScheduledTask, SessionGuard};

/// Displayed boxes are cleared this long after the batch that produced them.
pub const BOX_DISPLAY_DURATION: Duration = Duration::from_secs(2);

const NOTICE_CAPACITY: usize = 32;

#[derive(Debug)]
pub(crate) enum SessionInput {
    SampleDue,
    FallbackTick,
    Inbound(String),
    LinkLost(String),
    ExpireBoxes,
}

#[derive(Debug)]
pub(crate) struct TaggedInput {
    generation: u64,
    input: SessionInput,
}

pub(crate) type InputSender = mpsc::UnboundedSender<TaggedInput>;

impl GuardToken {
    pub(crate) fn tag(&self, input: SessionInput) -> TaggedInput {
        TaggedInput {
            generation: self.generation(),
            input,
        }
    }
}

/// What one `step()` did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionUpdate {
    FrameSent,
    /// Capture failed or the outbound buffer was full.
    FrameDropped,
    Detections { shown: usize, created: usize },
    /// Fallback tick without a detection.
    Quiet,
    BoxesCleared,
    /// The link went away and the fallback generator took over (if enabled).
    LinkLost,
    MessageDropped,
    /// Input from a stopped session.
    Stale,
}

#[derive(Clone, Debug)]
pub struct SessionSettings {
    /// `None` runs every detection session on the fallback generator.
    pub endpoint: Option<String>,
    pub outbound_capacity: usize,
    pub fallback_enabled: bool,
    pub fallback_tick: Duration,
    pub fallback_probability: f64,
    /// Fixed seed for the fallback generator.
    pub fallback_seed: Option<u64>,
    pub box_display: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            fallback_enabled: true,
            fallback_tick: DEFAULT_TICK,
            fallback_probability: DEFAULT_PROBABILITY,
            fallback_seed: None,
            box_display: BOX_DISPLAY_DURATION,
        }
    }
}

impl From<&PanelConfig> for SessionSettings {
    fn from(cfg: &PanelConfig) -> Self {
        Self {
            endpoint: cfg.inference.endpoint.clone(),
            outbound_capacity: cfg.inference.outbound_capacity,
            fallback_enabled: cfg.simulation.fallback_enabled,
            fallback_tick: cfg.simulation.fallback_tick,
            fallback_probability: cfg.simulation.fallback_probability,
            ..Self::default()
        }
    }
}

/// A captured still ready to be saved.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub filename: String,
    pub data_url: String,
}

pub struct SessionController<P> {
    acquirer: SourceAcquirer<P>,
    settings: SessionSettings,
    store: SharedStore,
    prefs_store: PreferenceStore,
    prefs: Preferences,
    status: watch::Sender<SessionStatus>,
    notices: broadcast::Sender<Notice>,

    source: Option<Source>,
    track: Option<Box<dyn MediaTrack>>,
    link: Option<InferenceLink>,
    fallback: Option<FallbackGenerator>,

    guard: SessionGuard,
    sampler: Option<ScheduledTask>,
    fallback_ticker: Option<ScheduledTask>,
    expiries: Vec<ScheduledTask>,
    inputs: InputSender,
    queue: mpsc::UnboundedReceiver<TaggedInput>,

    aggregator: DetectionAggregator,
    boxes: Vec<DetectionBox>,
    metrics: MetricsProjector,

    cameras: Vec<CameraDevice>,
    selected_camera: String,
}

impl<P: MediaProvider> SessionController<P> {
    pub fn new(provider: P, store: SharedStore, settings: SessionSettings) -> Self {
        let prefs_store = PreferenceStore::new(store.clone());
        let prefs = prefs_store.load();
        let (status, _) = watch::channel(SessionStatus {
            input_mode: prefs.input_mode,
            ..SessionStatus::default()
        });
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        let (inputs, queue) = mpsc::unbounded_channel();
        log::info!(
            "session controller ready (model {}, threshold {}%, inference {})",
            prefs.model,
            prefs.threshold,
            settings.endpoint.as_deref().unwrap_or("disabled")
        );
        Self {
            acquirer: SourceAcquirer::new(provider),
            settings,
            store,
            prefs_store,
            prefs,
            status,
            notices,
            source: None,
            track: None,
            link: None,
            fallback: None,
            guard: SessionGuard::new(),
            sampler: None,
            fallback_ticker: None,
            expiries: Vec::new(),
            inputs,
            queue,
            aggregator: DetectionAggregator::new(),
            boxes: Vec::new(),
            metrics: MetricsProjector::new(),
            cameras: Vec::new(),
            selected_camera: DEFAULT_CAMERA.to_string(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    pub fn preferences(&self) -> &Preferences {
        &self.prefs
    }

    pub fn provider(&self) -> &P {
        self.acquirer.provider()
    }

    pub fn source(&self) -> Option<&Source> {
        self.source.as_ref()
    }

    pub fn track_stats(&self) -> Option<TrackStats> {
        self.track.as_ref().map(|track| track.stats())
    }

    pub fn is_link_open(&self) -> bool {
        self.link.is_some()
    }

    pub fn is_fallback_active(&self) -> bool {
        self.fallback.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.guard.generation()
    }

    pub fn boxes(&self) -> &[DetectionBox] {
        &self.boxes
    }

    pub fn overlay(&self) -> Vec<OverlayRect> {
        project(&self.boxes)
    }

    pub fn metrics(&self) -> LiveMetrics {
        self.metrics.current()
    }

    pub fn events(&self) -> &DetectionAggregator {
        &self.aggregator
    }

    /// View filter bound to the current threshold.
    pub fn event_filter(&self, high_confidence_only: bool, text: &str) -> EventFilter {
        EventFilter {
            high_confidence_only,
            threshold: self.prefs.threshold,
            text: text.to_string(),
        }
    }

    pub fn visible_events(&self, filter: &EventFilter) -> Vec<&DetectionEvent> {
        self.aggregator
            .events()
            .filter(|event| filter.matches(event))
            .collect()
    }

    // ---- lifecycle ----

    /// Attach `source`, replacing any current one.
    pub async fn connect(&mut self, source: Source) -> Result<(), SessionError> {
        if let Err(e) = SourceAcquirer::<P>::validate(&source) {
            return Err(self.report(e));
        }
        self.release_source();
        let mode = source.input_mode();
        self.update_status(|status| {
            status.input_mode = mode;
            status.connection = ConnectionState::Connecting;
            status.detection = DetectionState::Idle;
        });
        log::info!("connecting {} source", source.kind());

        match self.acquirer.acquire(&source).await {
            Ok(track) => {
                let stats = track.stats();
                log::info!(
                    "{} source connected: {} ({}x{})",
                    source.kind(),
                    stats.label,
                    stats.width,
                    stats.height
                );
                self.track = Some(track);
                self.source = Some(source);
                if self.prefs.input_mode != mode {
                    self.update_prefs(|p| p.input_mode = mode);
                }
                self.update_status(|status| {
                    status.connection = ConnectionState::Connected;
                    status.detection = DetectionState::Streaming;
                });
                self.notify(Notice::success(format!("Connected to {} source", mode.as_str())));
                Ok(())
            }
            Err(e) => {
                self.update_status(|status| {
                    status.connection = ConnectionState::Error;
                    status.detection = DetectionState::Idle;
                });
                Err(self.report(e))
            }
        }
    }

    pub async fn start_detection(&mut self) -> Result<(), SessionError> {
        let status = self.status();
        if status.detection != DetectionState::Streaming {
            let hint = match status.detection {
                DetectionState::Detecting => "stop the running detection first",
                _ => "connect a video source first",
            };
            return Err(self.report(SessionError::InvalidState {
                action: "start detection",
                state: status.to_string(),
                hint,
            }));
        }

        self.metrics.reset();
        let token = self.guard.token();
        if let Some(endpoint) = self.settings.endpoint.clone() {
            match InferenceLink::open(
                &endpoint,
                self.settings.outbound_capacity,
                token,
                self.inputs.clone(),
            )
            .await
            {
                Ok(link) => self.link = Some(link),
                Err(e) => log::warn!("inference link unavailable: {}", e),
            }
        }
        if self.link.is_some() {
            self.start_sampler();
        } else {
            self.start_fallback();
        }

        self.update_status(|status| status.detection = DetectionState::Detecting);
        log::info!(
            "detection started (generation {}, model {}, threshold {}%)",
            self.guard.generation(),
            self.prefs.model,
            self.prefs.threshold
        );
        self.notify(Notice::success("Detection started"));
        Ok(())
    }

    pub fn stop_detection(&mut self) -> Result<(), SessionError> {
        let status = self.status();
        if status.detection != DetectionState::Detecting {
            return Err(self.report(SessionError::InvalidState {
                action: "stop detection",
                state: status.to_string(),
                hint: "start detection first",
            }));
        }
        self.halt_detection();
        self.update_status(|status| status.detection = DetectionState::Streaming);
        log::info!("detection stopped");
        self.notify(Notice::success("Detection stopped"));
        Ok(())
    }

    /// Legal from any state.
    pub fn disconnect(&mut self) {
        self.release_source();
        self.update_status(|status| {
            status.connection = ConnectionState::Disconnected;
            status.detection = DetectionState::Idle;
        });
        self.notify(Notice::success("Disconnected"));
    }

    /// Wait for the next internal input and apply it.
    pub async fn step(&mut self) -> SessionUpdate {
        // The controller keeps a sender, so the queue never closes.
        let Some(tagged) = self.queue.recv().await else {
            return SessionUpdate::Stale;
        };
        if tagged.generation != self.guard.generation() {
            log::debug!(
                "discarding {:?} from generation {} (current {})",
                tagged.input,
                tagged.generation,
                self.guard.generation()
            );
            return SessionUpdate::Stale;
        }
        match tagged.input {
            SessionInput::SampleDue => self.sample_frame(),
            SessionInput::FallbackTick => self.fallback_tick(),
            SessionInput::Inbound(text) => self.handle_inbound(&text),
            SessionInput::LinkLost(reason) => self.handle_link_lost(&reason),
            SessionInput::ExpireBoxes => {
                self.expiries.retain(|task| !task.is_finished());
                self.boxes.clear();
                SessionUpdate::BoxesCleared
            }
        }
    }

    /// Apply one batch of detections: every box is displayed, qualifying
    /// boxes become events. Returns the number of events created.
    ///
    /// Batches arriving outside `detecting` are ignored.
    pub fn ingest_boxes(&mut self, boxes: Vec<DetectionBox>) -> usize {
        if self.status().detection != DetectionState::Detecting {
            log::debug!("ignoring {} detection(s) while not detecting", boxes.len());
            return 0;
        }
        let threshold = self.prefs.threshold;
        let track = &mut self.track;
        let created = self
            .aggregator
            .ingest(&boxes, threshold, &self.prefs.model, || capture_thumbnail(track));
        if let Some(accepted) = boxes.iter().rev().find(|b| qualifies(b, threshold)) {
            self.metrics.record_accepted(accepted.confidence);
        }
        if created > 0 {
            log::info!(
                "{} detection event(s) recorded, history holds {}",
                created,
                self.aggregator.len()
            );
        }
        if !boxes.is_empty() {
            self.schedule_box_expiry();
        }
        self.boxes = boxes;
        created
    }

    // ---- preferences ----

    /// Does not disconnect the current source.
    pub fn set_input_mode(&mut self, mode: InputMode) {
        self.update_prefs(|p| p.input_mode = mode);
        self.update_status(|status| status.input_mode = mode);
    }

    pub fn set_model(&mut self, model: &str) -> Result<(), SessionError> {
        if let Err(e) = prefs::validate_model(model) {
            return Err(self.report(e));
        }
        self.update_prefs(|p| p.model = model.to_string());
        Ok(())
    }

    /// Affects new events and the view filter; stored events are untouched.
    pub fn set_threshold(&mut self, threshold: u8) -> Result<(), SessionError> {
        if let Err(e) = prefs::validate_threshold(threshold) {
            return Err(self.report(e));
        }
        self.update_prefs(|p| p.threshold = threshold);
        Ok(())
    }

    pub fn set_sensitivity(&mut self, sensitivity: Sensitivity) {
        self.update_prefs(|p| p.sensitivity = sensitivity);
    }

    pub fn set_use_gpu(&mut self, use_gpu: bool) {
        self.update_prefs(|p| p.use_gpu = use_gpu);
    }

    /// Restarts a running sampler at the new interval.
    pub fn set_frame_sampling(&mut self, rate: u8) -> Result<(), SessionError> {
        if let Err(e) = prefs::validate_frame_sampling(rate) {
            return Err(self.report(e));
        }
        self.update_prefs(|p| p.frame_sampling = rate);
        self.restart_sampler();
        Ok(())
    }

    pub fn set_clip_length(&mut self, seconds: u8) -> Result<(), SessionError> {
        if let Err(e) = prefs::validate_clip_length(seconds) {
            return Err(self.report(e));
        }
        self.update_prefs(|p| p.clip_length = seconds);
        Ok(())
    }

    pub fn reset_preferences(&mut self) {
        if let Err(e) = self.prefs_store.reset() {
            log::error!("failed to clear stored preferences: {}", e);
        }
        self.prefs = Preferences::default();
        if self.source.is_none() {
            let mode = self.prefs.input_mode;
            self.update_status(|status| status.input_mode = mode);
        }
        self.restart_sampler();
        self.notify(Notice::success("Settings reset to defaults"));
    }

    // ---- events ----

    pub fn annotate_event(&mut self, id: &str, note: Option<String>) -> Result<(), SessionError> {
        if self.aggregator.annotate(id, note) {
            Ok(())
        } else {
            Err(self.report(unknown_event(id)))
        }
    }

    pub fn mark_false_positive(&mut self, id: &str, flag: bool) -> Result<(), SessionError> {
        if self.aggregator.mark_false_positive(id, flag) {
            Ok(())
        } else {
            Err(self.report(unknown_event(id)))
        }
    }

    pub fn clear_events(&mut self) {
        self.aggregator.clear();
        log::info!("event history cleared");
    }

    // ---- capture & handoff ----

    /// Capture a thumbnail of the current frame and keep it as the last
    /// snapshot.
    pub fn snapshot(&mut self) -> Result<Snapshot, SessionError> {
        let status = self.status();
        let kind = self.source.as_ref().map(Source::kind).unwrap_or("video");
        let Some(track) = self.track.as_mut() else {
            return Err(self.report(SessionError::InvalidState {
                action: "take a snapshot",
                state: status.to_string(),
                hint: "connect a video source first",
            }));
        };
        let data_url = match track.grab_frame().and_then(|frame| frame.thumbnail_data_url()) {
            Ok(url) => url,
            Err(e) => {
                return Err(self.report(SessionError::Acquisition {
                    source_kind: kind,
                    reason: e.to_string(),
                    hint: "check that the video source is still live",
                }))
            }
        };
        if let Err(e) = handoff::store_snapshot(&self.store, &data_url) {
            log::error!("failed to store snapshot: {}", e);
        }
        self.notify(Notice::success("Snapshot saved"));
        Ok(Snapshot {
            filename: snapshot_filename(&Utc::now()),
            data_url,
        })
    }

    /// Write the handoff record for the results view.
    pub fn publish_results(&mut self) -> Result<HandoffRecord, SessionError> {
        let record = HandoffRecord {
            events: self.aggregator.to_vec(),
            last_video_src: self.track.as_ref().and_then(|track| track.playable_ref()),
            last_snapshot: capture_thumbnail(&mut self.track),
        };
        match record.publish(&self.store) {
            Ok(()) => Ok(record),
            Err(e) => {
                log::error!("failed to persist results: {}", e);
                Err(SessionError::from(e))
            }
        }
    }

    // ---- cameras ----

    pub async fn refresh_cameras(&mut self) -> &[CameraDevice] {
        self.cameras = self.acquirer.enumerate_cameras().await;
        log::info!("{} camera(s) available", self.cameras.len());
        if self.selected_camera == DEFAULT_CAMERA {
            if let Some(first) = self.cameras.first() {
                self.selected_camera = first.device_id.clone();
            }
        }
        &self.cameras
    }

    pub fn cameras(&self) -> &[CameraDevice] {
        &self.cameras
    }

    pub fn selected_camera(&self) -> &str {
        &self.selected_camera
    }

    /// `default-camera` resolves to the first enumerated device when there is one.
    pub fn select_camera(&mut self, device_id: &str) -> Result<(), SessionError> {
        if device_id == DEFAULT_CAMERA {
            self.selected_camera = self
                .cameras
                .first()
                .map(|device| device.device_id.clone())
                .unwrap_or_else(|| DEFAULT_CAMERA.to_string());
            return Ok(());
        }
        if !self.cameras.iter().any(|device| device.device_id == device_id) {
            return Err(self.report(SessionError::validation(
                format!("unknown camera '{}'", device_id),
                "refresh the camera list",
            )));
        }
        self.selected_camera = device_id.to_string();
        Ok(())
    }

    // ---- internals ----

    fn sample_frame(&mut self) -> SessionUpdate {
        let (Some(link), Some(track)) = (self.link.as_ref(), self.track.as_mut()) else {
            return SessionUpdate::Stale;
        };
        let jpeg = match track.grab_frame().and_then(|frame| frame.encode_jpeg()) {
            Ok(jpeg) => jpeg,
            Err(e) => {
                log::warn!("frame capture failed: {}", e);
                return SessionUpdate::FrameDropped;
            }
        };
        match link.send_frame(jpeg) {
            Ok(outcome) => {
                let fullness = link.buffer_fullness();
                self.metrics.set_buffer_fullness(fullness);
                match outcome {
                    SendOutcome::Queued => {
                        self.metrics.record_frame_sent(Instant::now());
                        SessionUpdate::FrameSent
                    }
                    SendOutcome::Dropped => {
                        log::debug!("outbound buffer full, frame dropped");
                        SessionUpdate::FrameDropped
                    }
                }
            }
            Err(e) => self.handle_link_lost(&e.to_string()),
        }
    }

    fn fallback_tick(&mut self) -> SessionUpdate {
        let Some(generator) = self.fallback.as_mut() else {
            return SessionUpdate::Stale;
        };
        match generator.tick() {
            Some(detection) => {
                let synthetic = generator.metrics();
                self.metrics.apply_synthetic(synthetic.fps, synthetic.latency_ms);
                let created = self.ingest_boxes(vec![detection]);
                SessionUpdate::Detections { shown: 1, created }
            }
            None => SessionUpdate::Quiet,
        }
    }

    fn handle_inbound(&mut self, text: &str) -> SessionUpdate {
        match InferenceMessage::parse(text) {
            Ok(message) => {
                self.metrics.record_result(Instant::now());
                let boxes = message.into_boxes();
                let shown = boxes.len();
                let created = self.ingest_boxes(boxes);
                SessionUpdate::Detections { shown, created }
            }
            Err(e) => {
                log::warn!("dropping inbound message: {}", e);
                SessionUpdate::MessageDropped
            }
        }
    }

    fn handle_link_lost(&mut self, reason: &str) -> SessionUpdate {
        let Some(link) = self.link.take() else {
            return SessionUpdate::Stale;
        };
        log::warn!("inference link to {} lost: {}", link.endpoint(), reason);
        link.close();
        if let Some(sampler) = self.sampler.take() {
            sampler.cancel();
        }
        self.metrics.set_buffer_fullness(0.0);
        self.start_fallback();
        SessionUpdate::LinkLost
    }

    fn start_sampler(&mut self) {
        let interval = self.prefs.sampling_interval();
        let inputs = self.inputs.clone();
        let token = self.guard.token();
        let tag = token.clone();
        self.sampler = Some(ScheduledTask::periodic("frame sampler", interval, token, move || {
            inputs.send(tag.tag(SessionInput::SampleDue)).is_ok()
        }));
        log::debug!("frame sampler running every {:?}", interval);
    }

    fn restart_sampler(&mut self) {
        if let Some(sampler) = self.sampler.take() {
            sampler.cancel();
            self.start_sampler();
        }
    }

    fn start_fallback(&mut self) {
        if !self.settings.fallback_enabled {
            log::warn!("no inference link and the fallback generator is disabled; no detections will be produced");
            return;
        }
        log::warn!("inference link unavailable, fallback generator active: detections are synthetic");
        let probability = self.settings.fallback_probability;
        self.fallback = Some(match self.settings.fallback_seed {
            Some(seed) => FallbackGenerator::with_seed(probability, seed),
            None => FallbackGenerator::new(probability),
        });
        let inputs = self.inputs.clone();
        let token = self.guard.token();
        let tag = token.clone();
        self.fallback_ticker = Some(ScheduledTask::periodic(
            "fallback generator",
            self.settings.fallback_tick,
            token,
            move || inputs.send(tag.tag(SessionInput::FallbackTick)).is_ok(),
        ));
    }

    fn schedule_box_expiry(&mut self) {
        self.expiries.retain(|task| !task.is_finished());
        let inputs = self.inputs.clone();
        let token = self.guard.token();
        let tag = token.clone();
        self.expiries.push(ScheduledTask::once(
            "box expiry",
            self.settings.box_display,
            token,
            move || {
                let _ = inputs.send(tag.tag(SessionInput::ExpireBoxes));
            },
        ));
    }

    /// Invalidate the running session and release everything it started.
    fn halt_detection(&mut self) {
        let generation = self.guard.invalidate();
        log::debug!("session generation now {}", generation);
        if let Some(link) = self.link.take() {
            link.close();
        }
        for task in [self.sampler.take(), self.fallback_ticker.take()]
            .into_iter()
            .flatten()
            .chain(self.expiries.drain(..))
        {
            task.cancel();
        }
        self.fallback = None;
        self.boxes.clear();
    }

    fn release_source(&mut self) {
        self.halt_detection();
        if let Some(mut track) = self.track.take() {
            track.stop();
            log::info!("released {} source", self.source.as_ref().map(Source::kind).unwrap_or("video"));
        }
        self.source = None;
    }

    fn update_status(&self, apply: impl FnOnce(&mut SessionStatus)) {
        self.status.send_if_modified(|status| {
            let before = *status;
            apply(status);
            if *status != before {
                log::debug!("session status {} -> {}", before, status);
                true
            } else {
                false
            }
        });
    }

    /// Apply and persist. Storage failures are logged, never fatal.
    fn update_prefs(&mut self, apply: impl FnOnce(&mut Preferences)) {
        apply(&mut self.prefs);
        if let Err(e) = self.prefs_store.save(&self.prefs) {
            log::error!("failed to persist preferences: {}", e);
        }
    }

    fn notify(&self, notice: Notice) {
        // No subscribers is fine.
        let _ = self.notices.send(notice);
    }

    /// Log an error and surface it to the operator when it is user visible.
    fn report(&self, err: SessionError) -> SessionError {
        if err.is_user_visible() {
            log::warn!("{}", err);
            self.notify(Notice::error(err.to_string(), err.hint()));
        } else {
            log::error!("{}", err);
        }
        err
    }
}

fn capture_thumbnail(track: &mut Option<Box<dyn MediaTrack>>) -> Option<String> {
    let track = track.as_mut()?;
    match track.grab_frame().and_then(|frame| frame.thumbnail_data_url()) {
        Ok(url) => Some(url),
        Err(e) => {
            log::warn!("thumbnail capture failed: {}", e);
            None
        }
    }
}

fn unknown_event(id: &str) -> SessionError {
    SessionError::validation(format!("unknown event '{}'", id), "refresh the event list")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::SyntheticProvider;
    use crate::storage::{shared, InMemoryKvStore};

    fn controller() -> SessionController<SyntheticProvider> {
        SessionController::new(
            SyntheticProvider::new()
                .with_frame_size(32, 18)
                .with_stream_delay(Duration::from_millis(10)),
            shared(InMemoryKvStore::new()),
            SessionSettings::default(),
        )
    }

    /// Detecting with no link and no fallback, so only injected batches land.
    async fn detecting_controller() -> SessionController<SyntheticProvider> {
        let mut session = SessionController::new(
            SyntheticProvider::new().with_frame_size(32, 18),
            shared(InMemoryKvStore::new()),
            SessionSettings {
                fallback_enabled: false,
                ..SessionSettings::default()
            },
        );
        session.connect(Source::camera(DEFAULT_CAMERA)).await.unwrap();
        session.start_detection().await.unwrap();
        session
    }

    fn detection(confidence: f64) -> DetectionBox {
        DetectionBox {
            x: 0.2,
            y: 0.3,
            width: 0.1,
            height: 0.1,
            confidence,
            label: "Violence".into(),
        }
    }

    #[tokio::test]
    async fn connect_moves_to_streaming() {
        let mut session = controller();
        let mut status_rx = session.subscribe();
        session.connect(Source::camera(DEFAULT_CAMERA)).await.unwrap();
        assert!(status_rx.has_changed().unwrap());
        let status = *status_rx.borrow_and_update();
        assert_eq!(status.connection, ConnectionState::Connected);
        assert_eq!(status.detection, DetectionState::Streaming);
        assert_eq!(status.input_mode, InputMode::Camera);
    }

    #[tokio::test]
    async fn start_requires_streaming() {
        let mut session = controller();
        let mut notices = session.notices();
        let err = session.start_detection().await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidState { .. }));
        assert_eq!(err.hint(), Some("connect a video source first"));
        assert_eq!(session.status().detection, DetectionState::Idle);
        let notice = notices.try_recv().unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert_eq!(notice.hint, Some("connect a video source first"));
    }

    #[tokio::test]
    async fn stop_requires_detecting() {
        let mut session = controller();
        session.connect(Source::camera(DEFAULT_CAMERA)).await.unwrap();
        assert!(session.stop_detection().is_err());
        assert_eq!(session.status().detection, DetectionState::Streaming);
    }

    #[tokio::test]
    async fn denied_camera_sets_error_state() {
        let mut session = SessionController::new(
            SyntheticProvider::new().with_camera_denied(true),
            shared(InMemoryKvStore::new()),
            SessionSettings::default(),
        );
        let err = session.connect(Source::camera(DEFAULT_CAMERA)).await.unwrap_err();
        assert!(matches!(err, SessionError::Acquisition { .. }));
        let status = session.status();
        assert_eq!(status.connection, ConnectionState::Error);
        assert_eq!(status.detection, DetectionState::Idle);
    }

    #[tokio::test]
    async fn accepted_box_updates_history_and_metrics() {
        let mut session = detecting_controller().await;
        assert_eq!(session.ingest_boxes(vec![detection(85.0)]), 1);
        assert_eq!(session.events().len(), 1);
        assert_eq!(session.metrics().last_confidence, 85.0);
        let event = session.events().latest().unwrap();
        assert_eq!(event.model, "movinet-a1");
        assert!(event.thumbnail.as_deref().unwrap().starts_with("data:image/jpeg;base64,"));
        assert_eq!(session.overlay()[0].caption, "Violence 85.0%");
    }

    #[tokio::test]
    async fn threshold_change_filters_view_only() {
        let mut session = detecting_controller().await;
        session.ingest_boxes(vec![detection(75.0), detection(95.0)]);
        session.set_threshold(90).unwrap();
        assert_eq!(session.events().len(), 2);
        let filter = session.event_filter(true, "");
        assert_eq!(session.visible_events(&filter).len(), 1);
        let filter = session.event_filter(false, "");
        assert_eq!(session.visible_events(&filter).len(), 2);
    }

    #[tokio::test]
    async fn event_actions_reject_unknown_ids() {
        let mut session = detecting_controller().await;
        session.ingest_boxes(vec![detection(95.0)]);
        let id = session.events().latest().unwrap().id.clone();
        session.annotate_event(&id, Some("lobby".into())).unwrap();
        session.mark_false_positive(&id, true).unwrap();
        assert!(session.annotate_event("event-0-none", None).is_err());
        let filter = session.event_filter(false, "");
        assert!(session.visible_events(&filter).is_empty());
        session.clear_events();
        assert!(session.events().is_empty());
    }

    #[tokio::test]
    async fn batches_outside_detecting_are_ignored() {
        let mut session = controller();
        assert_eq!(session.ingest_boxes(vec![detection(95.0)]), 0);
        assert!(session.events().is_empty());
        assert!(session.boxes().is_empty());

        session.connect(Source::camera(DEFAULT_CAMERA)).await.unwrap();
        assert_eq!(session.ingest_boxes(vec![detection(95.0)]), 0);
        assert!(session.events().is_empty());
        assert!(session.boxes().is_empty());
        assert_eq!(session.metrics().last_confidence, 0.0);
    }

    #[tokio::test]
    async fn malformed_inbound_leaves_metrics_alone() {
        let mut session = detecting_controller().await;
        session.metrics.record_frame_sent(Instant::now());
        assert_eq!(session.handle_inbound("{oops"), SessionUpdate::MessageDropped);
        assert_eq!(session.metrics().fps, 0.0);
        assert_eq!(session.metrics().latency_ms, 0.0);

        let update = session.handle_inbound(r#"{"detections":[]}"#);
        assert_eq!(update, SessionUpdate::Detections { shown: 0, created: 0 });
        assert_eq!(session.metrics().fps, 1.0);
    }

    #[tokio::test]
    async fn preference_setters_validate_and_persist() {
        let store = shared(InMemoryKvStore::new());
        let mut session = SessionController::new(
            SyntheticProvider::new(),
            store.clone(),
            SessionSettings::default(),
        );
        assert!(session.set_model("resnet-50").is_err());
        assert!(session.set_frame_sampling(0).is_err());
        assert!(session.set_clip_length(61).is_err());
        session.set_model("movinet-a2").unwrap();
        session.set_frame_sampling(5).unwrap();
        session.set_sensitivity(Sensitivity::Long);
        session.set_use_gpu(false);
        session.set_input_mode(InputMode::File);

        let reloaded = PreferenceStore::new(store.clone()).load();
        assert_eq!(reloaded.model, "movinet-a2");
        assert_eq!(reloaded.frame_sampling, 5);
        assert_eq!(reloaded.sensitivity, Sensitivity::Long);
        assert!(!reloaded.use_gpu);
        assert_eq!(session.status().input_mode, InputMode::File);

        session.reset_preferences();
        assert_eq!(session.preferences(), &Preferences::default());
        assert_eq!(PreferenceStore::new(store).load(), Preferences::default());
    }

    #[tokio::test]
    async fn default_camera_selects_first_device() {
        let mut session = SessionController::new(
            SyntheticProvider::new().with_cameras(vec![
                CameraDevice {
                    device_id: "cam-a".into(),
                    label: "Front".into(),
                },
                CameraDevice {
                    device_id: "cam-b".into(),
                    label: "Back".into(),
                },
            ]),
            shared(InMemoryKvStore::new()),
            SessionSettings::default(),
        );
        assert_eq!(session.selected_camera(), DEFAULT_CAMERA);
        assert_eq!(session.refresh_cameras().await.len(), 2);
        assert_eq!(session.selected_camera(), "cam-a");
        session.select_camera("cam-b").unwrap();
        assert_eq!(session.selected_camera(), "cam-b");
        assert!(session.select_camera("cam-z").is_err());
        session.select_camera(DEFAULT_CAMERA).unwrap();
        assert_eq!(session.selected_camera(), "cam-a");
    }

    #[tokio::test]
    async fn snapshot_needs_a_source() {
        let mut session = controller();
        assert!(matches!(
            session.snapshot(),
            Err(SessionError::InvalidState { .. })
        ));
        session.connect(Source::camera(DEFAULT_CAMERA)).await.unwrap();
        let snapshot = session.snapshot().unwrap();
        assert!(snapshot.filename.starts_with("snapshot-"));
        assert!(snapshot.filename.ends_with("Z.jpg"));
        assert!(snapshot.data_url.starts_with("data:image/jpeg;base64,"));
    }
}
