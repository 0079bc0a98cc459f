//! Error taxonomy for outbound security-service calls.

use thiserror::Error;

/// Failure of one outbound HTTP call.
///
/// Cloneable: the deduplication registry hands a single settled result to
/// every caller that joined the in-flight operation.
#[derive(Debug, Clone, Error)]
pub enum HttpError {
    #[error("security service returned status {status}")]
    Status { status: u16, body: String },

    #[error("request to {0} timed out")]
    Timeout(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl HttpError {
    /// Retryable failures carry no HTTP response (network error, timeout)
    /// or a 5xx status. 4xx responses and decode failures never retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Network(_) => true,
            Self::Status { status, .. } => (500..=599).contains(status),
            Self::Decode(_) | Self::InvalidUrl(_) => false,
        }
    }

    /// The HTTP status, when the failure carries a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

/// Failure of a gateway operation.
#[derive(Debug, Clone, Error)]
pub enum SecurityError {
    #[error("user {0} not found")]
    NotFound(String),

    #[error(transparent)]
    Http(#[from] HttpError),
}

impl SecurityError {
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Http(e) => e.is_not_found(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_errors_are_retryable() {
        for status in [500, 502, 503, 599] {
            let err = HttpError::Status {
                status,
                body: String::new(),
            };
            assert!(err.is_retryable(), "{status} should be retryable");
        }
    }

    #[test]
    fn test_client_errors_are_not_retryable() {
        for status in [400, 401, 404, 422] {
            let err = HttpError::Status {
                status,
                body: String::new(),
            };
            assert!(!err.is_retryable(), "{status} must not be retryable");
        }
    }

    #[test]
    fn test_no_response_failures_are_retryable() {
        assert!(HttpError::Timeout("http://x".into()).is_retryable());
        assert!(HttpError::Network("connection refused".into()).is_retryable());
        assert!(!HttpError::Decode("bad json".into()).is_retryable());
    }

    #[test]
    fn test_not_found_detection() {
        let err = HttpError::Status {
            status: 404,
            body: String::new(),
        };
        assert!(err.is_not_found());
        assert!(SecurityError::from(err).is_not_found());
        assert!(SecurityError::NotFound("u1".into()).is_not_found());

        let err = SecurityError::from(HttpError::Status {
            status: 500,
            body: String::new(),
        });
        assert!(!err.is_not_found());
    }
}
