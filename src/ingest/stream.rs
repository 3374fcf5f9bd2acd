//! Network stream requests.
//!
//! Only request validation lives here; the handshake itself is the provider's
//! job. The synthetic provider simulates it with a fixed delay.

use url::Url;

use crate::error::SessionError;

const STREAM_URL_HINT: &str = "enter a valid stream URL";

/// Reject empty or unparseable stream URLs.
pub fn validate_stream_url(raw: &str) -> Result<Url, SessionError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(SessionError::validation(
            "stream URL is empty",
            STREAM_URL_HINT,
        ));
    }
    let url = Url::parse(trimmed).map_err(|e| {
        SessionError::validation(format!("invalid stream URL '{}': {}", trimmed, e), STREAM_URL_HINT)
    })?;
    if !url.has_host() && url.scheme() != "stub" {
        return Err(SessionError::validation(
            format!("stream URL '{}' has no host", trimmed),
            STREAM_URL_HINT,
        ));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_stream_urls() {
        for raw in [
            "rtsp://192.168.1.100:554/stream",
            "http://cam.local/feed.mjpg",
            "wss://relay.example.com/live",
            " stub://front_camera ",
        ] {
            assert!(validate_stream_url(raw).is_ok(), "{raw}");
        }
    }

    #[test]
    fn rejects_empty_and_garbage() {
        assert!(validate_stream_url("").is_err());
        assert!(validate_stream_url("   ").is_err());
        assert!(validate_stream_url("not a url").is_err());
        assert!(validate_stream_url("mailto:ops@example.com").is_err());
    }
}
