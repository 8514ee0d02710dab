//! Error types for Firebase client operations.

use std::error::Error as StdError;
use std::io;
use thiserror::Error;

/// Result type for Firebase client operations.
pub type Result<T> = std::result::Result<T, FireError>;

/// Boxed error used at the connector boundary.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Errors that can occur while talking to the database.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FireError {
    /// Dialing or waiting for response headers exceeded the timeout budget.
    #[error("request timed out: {source}")]
    Timeout {
        #[source]
        source: BoxError,
    },

    #[error("malformed event stream: {0}")]
    Decode(String),

    /// The server answered with a non-2xx status. `body` is the raw response text.
    #[error("{body}")]
    Remote { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid database URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("a watch is already active on this location")]
    AlreadyWatching,

    #[error("watch stopped before the stream was established")]
    Stopped,

    #[error("server cancelled the event stream{}", reason_suffix(.0))]
    StreamCancelled(Option<String>),

    #[error("server revoked authorization for the event stream{}", reason_suffix(.0))]
    AuthRevoked(Option<String>),

    #[error("configuration error: {0}")]
    Config(String),
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason
        .as_deref()
        .map(|r| format!(": {}", r))
        .unwrap_or_default()
}

impl From<reqwest::Error> for FireError {
    fn from(err: reqwest::Error) -> Self {
        if is_timeout_error(&err) {
            FireError::Timeout {
                source: Box::new(err),
            }
        } else {
            FireError::Transport(err)
        }
    }
}

impl FireError {
    pub(crate) fn timeout(source: impl Into<BoxError>) -> Self {
        FireError::Timeout {
            source: source.into(),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, FireError::Timeout { .. })
    }

    #[inline]
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, FireError::Remote { .. })
    }

    /// HTTP status of a [`FireError::Remote`] error.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            FireError::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this error ends a watch for a reason the server chose.
    #[must_use]
    pub fn is_stream_control(&self) -> bool {
        matches!(
            self,
            FireError::StreamCancelled(_) | FireError::AuthRevoked(_)
        )
    }
}

/// Marker error produced when the connection phase exhausts the budget.
#[derive(Debug, Error)]
#[error("connection not established within {budget:?}")]
pub struct DialTimeout {
    pub budget: std::time::Duration,
}

/// Walks the source chain looking for a timeout reported by any layer.
pub(crate) fn is_timeout_error(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.is::<DialTimeout>() || e.is::<tokio::time::error::Elapsed>() {
            return true;
        }
        if let Some(req) = e.downcast_ref::<reqwest::Error>() {
            if req.is_timeout() {
                return true;
            }
        }
        if let Some(io) = e.downcast_ref::<io::Error>() {
            if io.kind() == io::ErrorKind::TimedOut {
                return true;
            }
        }
        current = e.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Debug, Error)]
    #[error("outer")]
    struct Outer(#[source] BoxError);

    #[test]
    fn test_dial_timeout_detected_through_chain() {
        let inner: BoxError = Box::new(DialTimeout {
            budget: Duration::from_millis(1),
        });
        let outer = Outer(inner);
        assert!(is_timeout_error(&outer));
    }

    #[test]
    fn test_io_timed_out_detected() {
        let err = io::Error::new(io::ErrorKind::TimedOut, "slow");
        assert!(is_timeout_error(&err));
    }

    #[test]
    fn test_other_io_error_not_timeout() {
        let err = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        assert!(!is_timeout_error(&err));
    }

    #[test]
    fn test_remote_error_displays_body() {
        let err = FireError::Remote {
            status: 401,
            body: "{\"error\" : \"Permission denied\"}".into(),
        };
        assert_eq!(err.to_string(), "{\"error\" : \"Permission denied\"}");
        assert_eq!(err.status(), Some(401));
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_stream_control_messages() {
        let err = FireError::AuthRevoked(Some("credential is no longer valid".into()));
        assert!(err.is_stream_control());
        assert_eq!(
            err.to_string(),
            "server revoked authorization for the event stream: credential is no longer valid"
        );
        assert_eq!(
            FireError::StreamCancelled(None).to_string(),
            "server cancelled the event stream"
        );
    }
}
