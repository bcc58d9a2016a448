//! Error types for the embedding system

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Error type for all embedding operations.
///
/// Retry decisions in the remote provider are made on these variants:
/// [`Http`](Self::Http) transport failures and [`Api`](Self::Api) errors with a
/// 429 or 5xx status are transient, everything else is final.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// Error when provider configuration is invalid
    #[error("Invalid embedding configuration: {message}")]
    InvalidConfig { message: String },

    /// Transport-level failure talking to a remote provider
    #[error("HTTP request failed: {source}")]
    Http {
        #[from]
        source: reqwest::Error,
    },

    /// The remote provider answered with a non-success status
    #[error("Embedding API returned {status}: {body}")]
    Api { status: u16, body: String },

    /// The remote provider answered with a body we could not use
    #[error("Invalid embedding response: {message}")]
    InvalidResponse { message: String },

    /// Provider state could not be exported or imported
    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },

    /// The caller cancelled the request
    #[error("Embedding request cancelled")]
    Cancelled,
}

impl EmbedError {
    /// Create an invalid configuration error with a custom message.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create an invalid response error with a custom message.
    pub fn invalid_response<S: Into<String>>(message: S) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// Whether a request that failed with this error may succeed if retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http { source } => {
                source.is_timeout() || source.is_connect() || source.is_request() || source.is_body()
            }
            Self::Api { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let rate_limited = EmbedError::Api {
            status: 429,
            body: String::new(),
        };
        let unavailable = EmbedError::Api {
            status: 503,
            body: String::new(),
        };
        let unauthorized = EmbedError::Api {
            status: 401,
            body: String::new(),
        };
        assert!(rate_limited.is_transient());
        assert!(unavailable.is_transient());
        assert!(!unauthorized.is_transient());
        assert!(!EmbedError::Cancelled.is_transient());
        assert!(!EmbedError::invalid_response("bad").is_transient());
    }

    #[test]
    fn test_state_decode_failure_is_serialization() {
        let err: EmbedError = serde_json::from_str::<Vec<f32>>("not json").unwrap_err().into();
        assert!(matches!(err, EmbedError::Serialization { .. }));
        assert!(!err.is_transient());
        assert!(err.to_string().starts_with("Serialization error"));
    }
}
