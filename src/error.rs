//! Error types for Coach Flux

use thiserror::Error;

/// Errors that cross the pipeline boundary.
///
/// Parse degradation and redaction failures are recovered inside the core and
/// never show up here.
#[derive(Debug, Error)]
pub enum CoachError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Rate limit exceeded for {key}, retry in {retry_after_secs}s")]
    AdmissionDenied { key: String, retry_after_secs: u64 },

    #[error("Generative backend failed: {0}")]
    UpstreamGeneration(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoachError {
    /// Whether the caller may try the same request again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoachError::AdmissionDenied { .. } | CoachError::UpstreamGeneration(_)
        )
    }

    /// Stable code for the transport layer.
    pub fn code(&self) -> &'static str {
        match self {
            CoachError::Validation(_) => "VALIDATION_ERROR",
            CoachError::AdmissionDenied { .. } => "ADMISSION_DENIED",
            CoachError::UpstreamGeneration(_) => "UPSTREAM_GENERATION_ERROR",
            CoachError::Config(_) => "CONFIG_ERROR",
            CoachError::Json(_) => "JSON_ERROR",
            CoachError::InvalidPattern(_) => "PATTERN_ERROR",
            CoachError::Io(_) => "IO_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_variants() {
        let denied = CoachError::AdmissionDenied {
            key: "plan:abc".to_string(),
            retry_after_secs: 12,
        };
        assert!(denied.is_retryable());
        assert!(CoachError::UpstreamGeneration("timeout".into()).is_retryable());
        assert!(!CoachError::Validation("empty".into()).is_retryable());
    }

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(CoachError::Validation("x".into()).code(), "VALIDATION_ERROR");
        assert_eq!(
            CoachError::UpstreamGeneration("x".into()).code(),
            "UPSTREAM_GENERATION_ERROR"
        );
        let denied = CoachError::AdmissionDenied {
            key: "events:a".into(),
            retry_after_secs: 1,
        };
        assert_eq!(denied.code(), "ADMISSION_DENIED");
        assert!(denied.to_string().contains("events:a"));
    }
}
