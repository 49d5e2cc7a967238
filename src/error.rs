use thiserror::Error;

/// Type alias for Result with AutoReplyError
pub type Result<T> = std::result::Result<T, AutoReplyError>;

/// Error types for the auto-reply service
#[derive(Error, Debug)]
pub enum AutoReplyError {
    /// Gmail returned a failure that maps to no more specific case
    #[error("Gmail API error: {0}")]
    ApiError(String),

    /// OAuth credential could not be obtained or refreshed
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// HTTP 429; carries the provider's requested wait
    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    /// Connection problems, timeouts, interrupted transfers
    #[error("Network error: {0}")]
    NetworkError(String),

    /// HTTP 5xx
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// HTTP 404
    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// HTTP 400
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// HTTP 403
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// Provider payload missing required structure (id, thread id)
    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    /// AI completion call failed (recovered by the composer fallback)
    #[error("Completion error: {0}")]
    CompletionError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Configuration file missing required values or unparseable
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Persisted log/status files unreadable or corrupt
    #[error("State error: {0}")]
    StateError(String),
}

impl AutoReplyError {
    /// Whether a retry of the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AutoReplyError::RateLimitExceeded { .. }
                | AutoReplyError::ServerError { .. }
                | AutoReplyError::NetworkError(_)
        )
    }

    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }
}

/// Seconds to wait, taken from a response's Retry-After header.
///
/// The header allows two forms: a bare delay in seconds and an HTTP-date.
/// A missing, unreadable, or already-elapsed value yields a 5 second
/// default.
fn parse_retry_after_header<B>(response: &hyper::Response<B>) -> u64 {
    const DEFAULT_RETRY_AFTER: u64 = 5;

    let raw = match response
        .headers()
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
    {
        Some(raw) => raw,
        None => return DEFAULT_RETRY_AFTER,
    };

    if let Ok(seconds) = raw.parse::<u64>() {
        return seconds;
    }

    // HTTP-date form: wait until the named instant
    if let Ok(when) = httpdate::parse_http_date(raw) {
        if let Ok(wait) = when.duration_since(std::time::SystemTime::now()) {
            return wait.as_secs();
        }
    }

    DEFAULT_RETRY_AFTER
}

impl From<google_gmail1::Error> for AutoReplyError {
    fn from(error: google_gmail1::Error) -> Self {
        use google_gmail1::Error as Gmail;

        match error {
            Gmail::Failure(ref response) => {
                let status = response.status();
                let message = format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown")
                );

                match status.as_u16() {
                    429 => AutoReplyError::RateLimitExceeded {
                        retry_after: parse_retry_after_header(response),
                    },
                    404 => AutoReplyError::MessageNotFound("Resource not found".to_string()),
                    400 => AutoReplyError::BadRequest(message),
                    403 => AutoReplyError::Forbidden(message),
                    500..=599 => AutoReplyError::ServerError {
                        status: status.as_u16(),
                        message,
                    },
                    _ => AutoReplyError::ApiError(message),
                }
            }
            Gmail::BadRequest(ref body) => AutoReplyError::BadRequest(body.to_string()),
            Gmail::HttpError(ref err) => {
                AutoReplyError::NetworkError(format!("Connection error: {}", err))
            }
            Gmail::Io(err) => AutoReplyError::NetworkError(err.to_string()),
            other => AutoReplyError::ApiError(other.to_string()),
        }
    }
}

impl From<async_openai::error::OpenAIError> for AutoReplyError {
    fn from(error: async_openai::error::OpenAIError) -> Self {
        AutoReplyError::CompletionError(error.to_string())
    }
}
