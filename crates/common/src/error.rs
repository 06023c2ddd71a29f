//! Error types shared across EFV crates.

/// Top-level error type for EFV operations.
///
/// Capture failures that belong to a running sequence are not errors: they
/// are reported through the capture callback. This type covers the
/// synchronous paths only.
#[derive(Debug, thiserror::Error)]
pub enum EfvError {
    #[error("Submission rejected: {message}")]
    SubmissionRejected { message: String },

    #[error("Invalid state for {operation}: session is {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    #[error("Surface error: {message}")]
    Surface { message: String },

    #[error("Relay error: {message}")]
    Relay { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result type alias using EfvError.
pub type EfvResult<T> = Result<T, EfvError>;

impl EfvError {
    pub fn submission_rejected(msg: impl Into<String>) -> Self {
        Self::SubmissionRejected {
            message: msg.into(),
        }
    }

    pub fn invalid_state(operation: &'static str, state: impl std::fmt::Debug) -> Self {
        Self::InvalidState {
            operation,
            state: format!("{state:?}"),
        }
    }

    pub fn surface(msg: impl Into<String>) -> Self {
        Self::Surface {
            message: msg.into(),
        }
    }

    pub fn relay(msg: impl Into<String>) -> Self {
        Self::Relay {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Whether the error came from the request channel refusing a request.
    pub fn is_submission_rejected(&self) -> bool {
        matches!(self, Self::SubmissionRejected { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_state_message() {
        #[derive(Debug)]
        #[allow(dead_code)]
        enum State {
            Configuring,
        }
        let err = EfvError::invalid_state("start_repeating", State::Configuring);
        assert_eq!(
            err.to_string(),
            "Invalid state for start_repeating: session is Configuring"
        );
    }

    #[test]
    fn test_submission_rejected_predicate() {
        assert!(EfvError::submission_rejected("device closed").is_submission_rejected());
        assert!(!EfvError::unsupported("no extension").is_submission_rejected());
    }
}
