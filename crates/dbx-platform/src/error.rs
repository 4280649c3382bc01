//! Error taxonomy for platform calls

use thiserror::Error;

/// Error code the platform returns for a missing run, scope or cluster
pub const RESOURCE_DOES_NOT_EXIST: &str = "RESOURCE_DOES_NOT_EXIST";

/// Error code the platform returns when creating something that exists
pub const RESOURCE_ALREADY_EXISTS: &str = "RESOURCE_ALREADY_EXISTS";

/// Errors returned by [`crate::DatabricksApi`] operations
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The referenced run, scope or cluster does not exist
    #[error("{operation}: not found: {message}")]
    NotFound {
        /// Operation that failed
        operation: &'static str,
        /// Platform message
        message: String,
    },

    /// The resource being created already exists
    #[error("{operation}: already exists: {message}")]
    AlreadyExists {
        /// Operation that failed
        operation: &'static str,
        /// Platform message
        message: String,
    },

    /// Non-success response
    #[error("{operation}: HTTP {status} {}: {message}", error_code.as_deref().unwrap_or("-"))]
    Api {
        /// Operation that failed
        operation: &'static str,
        /// HTTP status code
        status: u16,
        /// Platform error code, if the body carried one
        error_code: Option<String>,
        /// Platform message or raw body
        message: String,
    },

    /// The request never produced a response
    #[error("{operation}: transport error: {source}")]
    Transport {
        /// Operation that failed
        operation: &'static str,
        /// Underlying HTTP client error
        #[source]
        source: reqwest::Error,
    },

    /// A success response whose body could not be decoded
    #[error("{operation}: malformed response: {message}")]
    Malformed {
        /// Operation that failed
        operation: &'static str,
        /// Decode failure
        message: String,
    },

    /// Invalid client configuration
    #[error("invalid platform configuration: {0}")]
    Config(String),
}

#[derive(serde::Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl PlatformError {
    /// Classify a non-success response
    ///
    /// Only the platform's error code marks a resource as missing or existing.
    /// A bare 404 is what a wrong host or path prefix answers, so it stays an
    /// [`PlatformError::Api`] error.
    pub(crate) fn from_response(operation: &'static str, status: u16, body: &[u8]) -> Self {
        let (error_code, message) = match serde_json::from_slice::<ErrorBody>(body) {
            Ok(parsed) => (
                parsed.error_code,
                parsed
                    .message
                    .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned()),
            ),
            Err(_) => (None, String::from_utf8_lossy(body).into_owned()),
        };

        match error_code.as_deref() {
            Some(RESOURCE_ALREADY_EXISTS) => Self::AlreadyExists { operation, message },
            Some(RESOURCE_DOES_NOT_EXIST) => Self::NotFound { operation, message },
            _ => Self::Api {
                operation,
                status,
                error_code,
                message,
            },
        }
    }

    /// True when the platform reported the target as missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True when the platform reported the target as already existing
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Whether retrying the same call later can succeed without a spec change
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::NotFound { .. }
            | Self::AlreadyExists { .. }
            | Self::Malformed { .. }
            | Self::Config(_) => false,
        }
    }
}
