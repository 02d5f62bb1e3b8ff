use thiserror::Error;

/// Detailed error types for structured output operations.
///
/// Malformed model output never surfaces here: the generation loop turns it
/// into violations on a [`GenerationResult`](crate::GenerationResult). These
/// variants cover preconditions, backend transport failures and conversions.
#[derive(Debug, Error)]
pub enum StructuredError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Context error: {0}")]
    Context(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Backend returned no content")]
    EmptyResponse,

    #[error("Backend call timed out after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Rate limited: retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String },

    #[error("Generation failed after {attempts} attempts: {violations}")]
    GenerationFailed { attempts: usize, violations: String },
}

impl StructuredError {
    /// Build the error for a non-success HTTP status and its response body.
    pub fn from_status(status: u16, body: &str, retry_after: Option<&str>) -> Self {
        let message = api_error_message(body);
        match status {
            429 => Self::RateLimited {
                retry_after_secs: retry_after
                    .and_then(parse_duration_string)
                    .or_else(|| parse_retry_delay_from_error(body))
                    .unwrap_or(1),
            },
            500..=599 => Self::ServiceUnavailable { message },
            _ => Self::Api { status, message },
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. }
            | Self::ServiceUnavailable { .. }
            | Self::Timeout { .. }
            | Self::EmptyResponse
            | Self::Backend(_) => true,
            Self::Http(err) => err.is_timeout() || err.is_connect(),
            _ => false,
        }
    }

    /// Get suggested retry delay in seconds, if applicable.
    pub fn retry_delay(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            Self::ServiceUnavailable { .. } => Some(2),
            _ => None,
        }
    }
}

/// Pull `error.message` out of an OpenAI-style error body, falling back to the raw text.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            json.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

/// Parse retry delay from an API error response body.
fn parse_retry_delay_from_error(description: &str) -> Option<u64> {
    // Handles: "Please try again in 20s.", "Please retry in 488.04ms"
    let lower = api_error_message(description).to_lowercase();
    for marker in ["try again in ", "retry in "] {
        if let Some(idx) = lower.find(marker) {
            let remainder = &lower[idx + marker.len()..];
            let end = remainder
                .find(|c: char| !c.is_numeric() && c != '.' && c != 'm' && c != 's')
                .unwrap_or(remainder.len());
            let duration_str = remainder[..end].trim_end_matches('.');
            if let Some(secs) = parse_duration_string(duration_str) {
                return Some(secs);
            }
        }
    }
    None
}

/// Parse duration strings like "44s", "44.5s", "500ms" or a bare `Retry-After` seconds value.
fn parse_duration_string(s: &str) -> Option<u64> {
    let s = s.trim();

    if let Some(ms_part) = s.strip_suffix("ms") {
        if let Ok(ms) = ms_part.parse::<f64>() {
            if ms <= 0.0 {
                return Some(0);
            }
            let secs = (ms / 1000.0).ceil() as u64;
            return Some(secs.max(1));
        }
    }

    if let Some(s_part) = s.strip_suffix('s') {
        if let Ok(secs) = s_part.parse::<f64>() {
            return Some(secs.ceil() as u64);
        }
    }

    s.parse::<u64>().ok()
}

pub type Result<T> = std::result::Result<T, StructuredError>;

/// Extension trait for adding context to errors.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn with_context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<StructuredError>> ResultExt<T> for std::result::Result<T, E> {
    fn with_context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let base_err = e.into();
            StructuredError::Context(format!("{}: {}", context.into(), base_err))
        })
    }
}
