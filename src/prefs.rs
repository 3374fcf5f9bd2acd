//! Operator preferences and their durable record.
//!
//! The record lives under a single key as JSON. Missing fields fall back to
//! defaults, out-of-range values are clamped, and a malformed record is
//! replaced by defaults.

use anyhow::Result;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::SessionError;
use crate::storage::{read_key, remove_key, write_key, SharedStore};

pub const PREFERENCES_KEY: &str = "detection-preferences";

pub const DEFAULT_MODEL: &str = "movinet-a1";
pub const DEFAULT_THRESHOLD: u8 = 70;
pub const DEFAULT_FRAME_SAMPLING: u8 = 3;
pub const DEFAULT_CLIP_LENGTH_S: u8 = 10;

pub const FRAME_SAMPLING_RANGE: (u8, u8) = (1, 10);
pub const CLIP_LENGTH_RANGE_S: (u8, u8) = (5, 60);

/// Models the detection service can run.
pub const MODELS: &[(&str, &str)] = &[
    ("movinet-a0", "MoviNet-A0"),
    ("movinet-a1", "MoviNet-A1"),
    ("movinet-a2", "MoviNet-A2"),
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    #[default]
    Camera,
    Stream,
    File,
}

impl InputMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Camera => "camera",
            Self::Stream => "stream",
            Self::File => "file",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    Short,
    #[default]
    Medium,
    Long,
}

impl Sensitivity {
    /// Window length of the tier in milliseconds.
    pub fn window_ms(self) -> u64 {
        match self {
            Self::Short => 500,
            Self::Medium => 1000,
            Self::Long => 2000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    pub model: String,
    #[serde(deserialize_with = "lenient_u8")]
    pub threshold: u8,
    pub input_mode: InputMode,
    pub sensitivity: Sensitivity,
    pub use_gpu: bool,
    #[serde(deserialize_with = "lenient_u8")]
    pub frame_sampling: u8,
    #[serde(deserialize_with = "lenient_u8")]
    pub clip_length: u8,
}

/// Any JSON number, rounded and saturated into `u8`. `normalized` then clamps
/// it to the field's range.
fn lenient_u8<'de, D>(deserializer: D) -> std::result::Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    let rounded = raw.round();
    if rounded != raw {
        log::warn!("preference value {} is not a whole number, rounding to {}", raw, rounded);
    }
    Ok(rounded.clamp(0.0, f64::from(u8::MAX)) as u8)
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            threshold: DEFAULT_THRESHOLD,
            input_mode: InputMode::Camera,
            sensitivity: Sensitivity::Medium,
            use_gpu: true,
            frame_sampling: DEFAULT_FRAME_SAMPLING,
            clip_length: DEFAULT_CLIP_LENGTH_S,
        }
    }
}

impl Preferences {
    /// Interval between frames sent to the inference link.
    pub fn sampling_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(1000 / u64::from(self.frame_sampling.max(1)))
    }

    /// Clamp every field into its documented range.
    pub fn normalized(mut self) -> Self {
        if self.threshold > 100 {
            log::warn!("threshold {} out of range, clamping to 100", self.threshold);
            self.threshold = 100;
        }
        let clamped = self
            .frame_sampling
            .clamp(FRAME_SAMPLING_RANGE.0, FRAME_SAMPLING_RANGE.1);
        if clamped != self.frame_sampling {
            log::warn!(
                "frame sampling {} out of range, clamping to {}",
                self.frame_sampling,
                clamped
            );
            self.frame_sampling = clamped;
        }
        let clamped = self
            .clip_length
            .clamp(CLIP_LENGTH_RANGE_S.0, CLIP_LENGTH_RANGE_S.1);
        if clamped != self.clip_length {
            log::warn!(
                "clip length {}s out of range, clamping to {}s",
                self.clip_length,
                clamped
            );
            self.clip_length = clamped;
        }
        if !is_known_model(&self.model) {
            log::warn!("unknown model '{}', using {}", self.model, DEFAULT_MODEL);
            self.model = DEFAULT_MODEL.to_string();
        }
        self
    }
}

pub fn is_known_model(model: &str) -> bool {
    MODELS.iter().any(|(id, _)| *id == model)
}

pub fn validate_model(model: &str) -> Result<(), SessionError> {
    if is_known_model(model) {
        Ok(())
    } else {
        Err(SessionError::validation(
            format!("unknown model '{}'", model),
            "choose one of movinet-a0, movinet-a1, movinet-a2",
        ))
    }
}

pub fn validate_threshold(threshold: u8) -> Result<(), SessionError> {
    if threshold <= 100 {
        Ok(())
    } else {
        Err(SessionError::validation(
            format!("confidence threshold {} is above 100", threshold),
            "pick a threshold between 0 and 100",
        ))
    }
}

pub fn validate_frame_sampling(rate: u8) -> Result<(), SessionError> {
    if (FRAME_SAMPLING_RANGE.0..=FRAME_SAMPLING_RANGE.1).contains(&rate) {
        Ok(())
    } else {
        Err(SessionError::validation(
            format!("frame sampling {} is outside 1..=10", rate),
            "pick a sampling rate between 1 and 10",
        ))
    }
}

pub fn validate_clip_length(seconds: u8) -> Result<(), SessionError> {
    if (CLIP_LENGTH_RANGE_S.0..=CLIP_LENGTH_RANGE_S.1).contains(&seconds) {
        Ok(())
    } else {
        Err(SessionError::validation(
            format!("clip length {}s is outside 5..=60", seconds),
            "pick a clip length between 5 and 60 seconds",
        ))
    }
}

/// Loads and saves `Preferences` through the shared key-value store.
#[derive(Clone)]
pub struct PreferenceStore {
    store: SharedStore,
}

impl PreferenceStore {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Load preferences, falling back to defaults when the record is absent
    /// or unreadable.
    pub fn load(&self) -> Preferences {
        match read_key(&self.store, PREFERENCES_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<Preferences>(&raw) {
                Ok(prefs) => prefs.normalized(),
                Err(e) => {
                    log::error!("failed to load preferences: {}", e);
                    Preferences::default()
                }
            },
            Ok(None) => Preferences::default(),
            Err(e) => {
                log::error!("failed to read preferences: {}", e);
                Preferences::default()
            }
        }
    }

    pub fn save(&self, prefs: &Preferences) -> Result<()> {
        let json = serde_json::to_string(prefs)?;
        write_key(&self.store, PREFERENCES_KEY, &json)
    }

    /// Drop the stored record so the next load yields defaults.
    pub fn reset(&self) -> Result<()> {
        remove_key(&self.store, PREFERENCES_KEY)
    }
}
