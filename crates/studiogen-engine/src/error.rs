use thiserror::Error;

/// Error surface of the remote model, as far as it can be recovered from an
/// HTTP response. Google APIs wrap details in a nested `error` object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteFailure {
    pub http_status: Option<u16>,
    pub code: Option<i64>,
    pub status: Option<String>,
    pub message: String,
    pub nested: Option<Box<RemoteFailure>>,
}

impl RemoteFailure {
    pub fn with_http_status(http_status: u16, message: impl Into<String>) -> Self {
        Self {
            http_status: Some(http_status),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.http_status == Some(429)
            || self.code == Some(429)
            || message_signals_rate_limit(&self.message)
            || self.status.as_deref() == Some("RESOURCE_EXHAUSTED")
            || self
                .nested
                .as_deref()
                .map(RemoteFailure::is_rate_limited)
                .unwrap_or(false)
    }

    pub fn is_server_overload(&self) -> bool {
        self.http_status == Some(503)
    }
}

impl std::fmt::Display for RemoteFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.http_status, self.status.as_deref()) {
            (Some(code), Some(status)) => write!(f, "({code} {status}) {}", self.message),
            (Some(code), None) => write!(f, "({code}) {}", self.message),
            (None, Some(status)) => write!(f, "({status}) {}", self.message),
            (None, None) => f.write_str(&self.message),
        }
    }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("API Key is missing")]
    MissingCredential,

    #[error("failed to read reference image {source_label}: {message}")]
    Encode {
        source_label: String,
        message: String,
    },

    #[error("No image data found in response. The model might have returned only text.")]
    NoImageInResponse,

    #[error("remote model request failed {0}")]
    Remote(RemoteFailure),

    #[error("remote model transport failed: {0}")]
    Transport(String),

    #[error("generation cancelled")]
    Cancelled,
}

impl GenerationError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingCredential => "missing_credential",
            Self::Encode { .. } => "encode_error",
            Self::NoImageInResponse => "no_image_in_response",
            Self::Remote(failure) if failure.is_rate_limited() => "rate_limited",
            Self::Remote(failure) if failure.is_server_overload() => "server_overload",
            Self::Remote(_) => "remote_error",
            Self::Transport(_) => "transport_error",
            Self::Cancelled => "cancelled",
        }
    }
}

/// The one place where transient failures are recognised. Rate limits (429,
/// `RESOURCE_EXHAUSTED`, "quota") and server overload (503) are retried;
/// everything else is fatal.
pub fn is_transient(err: &GenerationError) -> bool {
    match err {
        GenerationError::Remote(failure) => {
            failure.is_rate_limited() || failure.is_server_overload()
        }
        GenerationError::Transport(message) => message_signals_rate_limit(message),
        GenerationError::MissingCredential
        | GenerationError::Encode { .. }
        | GenerationError::NoImageInResponse
        | GenerationError::Cancelled => false,
    }
}

fn message_signals_rate_limit(message: &str) -> bool {
    message.contains("429") || message.contains("quota")
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("unknown slot id: {0}")]
    UnknownSlot(String),
}

#[cfg(test)]
mod tests {
    use super::{is_transient, GenerationError, RemoteFailure};

    fn remote(failure: RemoteFailure) -> GenerationError {
        GenerationError::Remote(failure)
    }

    #[test]
    fn rate_limit_signals_are_transient() {
        assert!(is_transient(&remote(RemoteFailure::with_http_status(
            429, "slow down"
        ))));
        assert!(is_transient(&remote(RemoteFailure {
            code: Some(429),
            message: "too many".to_string(),
            ..Default::default()
        })));
        assert!(is_transient(&remote(RemoteFailure {
            message: "Quota exceeded: 429".to_string(),
            ..Default::default()
        })));
        assert!(is_transient(&remote(RemoteFailure {
            message: "You exceeded your current quota".to_string(),
            ..Default::default()
        })));
        assert!(is_transient(&remote(RemoteFailure {
            status: Some("RESOURCE_EXHAUSTED".to_string()),
            ..Default::default()
        })));
    }

    #[test]
    fn nested_error_objects_are_inspected() {
        let failure = RemoteFailure {
            http_status: Some(400),
            message: "request rejected".to_string(),
            nested: Some(Box::new(RemoteFailure {
                status: Some("RESOURCE_EXHAUSTED".to_string()),
                message: "per-minute limit".to_string(),
                ..Default::default()
            })),
            ..Default::default()
        };
        assert!(is_transient(&remote(failure)));
    }

    #[test]
    fn server_overload_is_transient() {
        let err = remote(RemoteFailure::with_http_status(503, "overloaded"));
        assert!(is_transient(&err));
        assert_eq!(err.kind(), "server_overload");
    }

    #[test]
    fn everything_else_is_fatal() {
        assert!(!is_transient(&GenerationError::NoImageInResponse));
        assert!(!is_transient(&GenerationError::MissingCredential));
        assert!(!is_transient(&GenerationError::Encode {
            source_label: "a.png".to_string(),
            message: "gone".to_string(),
        }));
        assert!(!is_transient(&remote(RemoteFailure::with_http_status(
            401,
            "API key not valid"
        ))));
        assert!(!is_transient(&remote(RemoteFailure::with_http_status(
            500, "internal"
        ))));
        assert!(!is_transient(&GenerationError::Transport(
            "connection refused".to_string()
        )));
        assert!(!is_transient(&GenerationError::Cancelled));
    }

    #[test]
    fn missing_credential_message_is_stable() {
        assert_eq!(
            GenerationError::MissingCredential.to_string(),
            "API Key is missing"
        );
    }

    #[test]
    fn remote_failure_display_includes_status() {
        let failure = RemoteFailure {
            http_status: Some(429),
            status: Some("RESOURCE_EXHAUSTED".to_string()),
            message: "quota".to_string(),
            ..Default::default()
        };
        assert_eq!(failure.to_string(), "(429 RESOURCE_EXHAUSTED) quota");
    }
}
