//! Session error taxonomy.
//!
//! Nothing here is fatal to the process. Each variant maps to a well-defined
//! session outcome:
//! - `Acquisition`: source could not be opened, connection goes to `error`
//! - `Transport`: inference channel failed, the fallback generator takes over
//! - `Parse`: one inbound message is dropped, the session continues
//! - `Validation`: request rejected before any state change
//! - `InvalidState`: operation not legal in the current state, nothing changes
//! - `Storage`: the key-value store failed, logged and otherwise ignored

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to acquire {source_kind}: {reason}")]
    Acquisition {
        source_kind: &'static str,
        reason: String,
        hint: &'static str,
    },

    #[error("inference link failure: {0}")]
    Transport(String),

    #[error("malformed inference message: {0}")]
    Parse(String),

    #[error("{message}")]
    Validation {
        message: String,
        hint: &'static str,
    },

    #[error("cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: String,
        hint: &'static str,
    },

    #[error("storage failure: {0}")]
    Storage(String),
}

impl SessionError {
    pub fn validation(message: impl Into<String>, hint: &'static str) -> Self {
        Self::Validation {
            message: message.into(),
            hint,
        }
    }

    /// Remediation hint shown next to the error.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Acquisition { hint, .. }
            | Self::Validation { hint, .. }
            | Self::InvalidState { hint, .. } => Some(hint),
            Self::Transport(_) => Some("check that the detection service is running"),
            Self::Parse(_) | Self::Storage(_) => None,
        }
    }

    /// True when the failure should be surfaced to the operator.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            Self::Acquisition { .. } | Self::Validation { .. } | Self::InvalidState { .. }
        )
    }
}

impl From<anyhow::Error> for SessionError {
    fn from(err: anyhow::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_visible_errors_carry_hints() {
        let err = SessionError::validation("stream URL is empty", "enter a valid stream URL");
        assert!(err.is_user_visible());
        assert_eq!(err.hint(), Some("enter a valid stream URL"));
        assert_eq!(err.to_string(), "stream URL is empty");

        let err = SessionError::Acquisition {
            source_kind: "camera",
            reason: "permission denied".into(),
            hint: "check camera permissions",
        };
        assert!(err.is_user_visible());
        assert_eq!(err.to_string(), "failed to acquire camera: permission denied");
    }

    #[test]
    fn parse_errors_are_internal() {
        let err = SessionError::Parse("expected array".into());
        assert!(!err.is_user_visible());
        assert!(err.hint().is_none());
    }
}
