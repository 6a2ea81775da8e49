use std::fmt;

use crate::persist::PersistError;

pub const GENERIC_FAILURE: &str = "request failed";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// No response within the deadline. Never retried.
    #[error("request timed out")]
    Timeout,
    /// Connection-level failure. The only retryable kind.
    #[error("network error: {0}")]
    Network(String),
    /// Non-2xx response; `detail` is the backend's `{detail}` body when present.
    #[error("{}", ApiDetail(.detail.as_deref()))]
    Api { status: u16, detail: Option<String> },
    #[error("failed to decode response: {0}")]
    Decode(String),
    /// A `stage: "error"` frame, or a stream that ended without binding a chat.
    #[error("{0}")]
    Stream(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("cancelled")]
    Cancelled,
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
    #[error("persist error: {0}")]
    Persist(#[from] PersistError),
}

impl ClientError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Network(_))
    }

    /// HTTP status for API errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

struct ApiDetail<'a>(Option<&'a str>);

impl fmt::Display for ApiDetail<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(detail) if !detail.is_empty() => f.write_str(detail),
            _ => f.write_str(GENERIC_FAILURE),
        }
    }
}

pub(crate) fn map_reqwest_error(err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        return ClientError::Timeout;
    }
    if err.is_decode() {
        return ClientError::Decode(err.to_string());
    }
    ClientError::Network(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::ClientError;

    #[test]
    fn api_error_shows_detail_verbatim_or_generic() {
        let with_detail = ClientError::Api {
            status: 404,
            detail: Some("Chat ID 'x' not found".into()),
        };
        assert_eq!(with_detail.to_string(), "Chat ID 'x' not found");

        let without = ClientError::Api {
            status: 502,
            detail: None,
        };
        assert_eq!(without.to_string(), "request failed");
    }

    #[test]
    fn only_network_errors_retry() {
        assert!(ClientError::Network("reset".into()).is_retryable());
        assert!(!ClientError::Timeout.is_retryable());
        assert!(!ClientError::Api {
            status: 500,
            detail: None
        }
        .is_retryable());
    }
}
