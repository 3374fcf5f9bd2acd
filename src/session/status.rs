//! Observable session state.

use serde::Serialize;
use std::fmt;

use crate::prefs::InputMode;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }

    /// Operator-facing status badge.
    pub fn label(self) -> &'static str {
        match self {
            Self::Connected => "Connected",
            Self::Connecting => "Reconnecting",
            Self::Disconnected | Self::Error => "Disconnected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `Streaming` requires a connected source, `Detecting` requires `Streaming`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionState {
    #[default]
    Idle,
    Streaming,
    Detecting,
}

impl DetectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Streaming => "streaming",
            Self::Detecting => "detecting",
        }
    }
}

impl fmt::Display for DetectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub input_mode: InputMode,
    pub connection: ConnectionState,
    pub detection: DetectionState,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({})", self.connection, self.detection, self.input_mode.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Error,
}

/// Operator toast with an optional remediation hint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<&'static str>,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
            hint: None,
        }
    }

    pub fn error(message: impl Into<String>, hint: Option<&'static str>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
            hint,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connecting_reads_as_reconnecting() {
        assert_eq!(ConnectionState::Connecting.label(), "Reconnecting");
        assert_eq!(ConnectionState::Error.label(), "Disconnected");
        assert_eq!(ConnectionState::Connected.label(), "Connected");
    }

    #[test]
    fn status_serializes_camel_case() {
        let status = SessionStatus {
            input_mode: InputMode::Stream,
            connection: ConnectionState::Connected,
            detection: DetectionState::Detecting,
        };
        let json = serde_json::to_value(status).unwrap();
        assert_eq!(json["inputMode"], "stream");
        assert_eq!(json["connection"], "connected");
        assert_eq!(json["detection"], "detecting");
        assert_eq!(status.to_string(), "connected/detecting (stream)");
    }
}
