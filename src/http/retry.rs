//! Retry policy for requests that die with their connection.
//!
//! A request is retried at most once, on a fresh connection, and only when
//! the failure came from the transport before any response byte arrived.

use crate::base::neterror::NetError;
use crate::http::h1::Progress;

/// Why a failed attempt may be replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    /// Server closed connection unexpectedly
    ConnectionReset,
    /// Connection was closed during request
    ConnectionClosed,
    /// Stream ended before a response head
    EmptyResponse,
    /// HTTP/2 server refused the stream or shut the connection down
    Http2ServerRefusedStream,
}

impl RetryReason {
    /// Map a NetError to a RetryReason, if the error is retryable.
    pub fn from_error(error: &NetError) -> Option<Self> {
        if !error.is_transport() {
            return None;
        }
        Some(match error {
            NetError::UnexpectedEof => Self::EmptyResponse,
            NetError::Refused | NetError::GoAway { .. } => Self::Http2ServerRefusedStream,
            NetError::Io {
                kind: std::io::ErrorKind::ConnectionReset,
                ..
            } => Self::ConnectionReset,
            _ => Self::ConnectionClosed,
        })
    }
}

/// Methods that may be replayed after their bytes hit the wire.
pub fn is_idempotent(method: &str) -> bool {
    matches!(
        method.to_ascii_uppercase().as_str(),
        "GET" | "HEAD" | "OPTIONS" | "TRACE" | "PUT" | "DELETE"
    )
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Replays after the first attempt (default: 1)
    pub max_attempts: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 1 }
    }
}

impl RetryConfig {
    /// Create a config with no retries.
    pub fn no_retry() -> Self {
        Self { max_attempts: 0 }
    }

    /// Whether the failed attempt number `attempt` (0 based) may be
    /// replayed.
    pub fn should_retry(
        &self,
        error: &NetError,
        progress: Progress,
        method: &str,
        attempt: usize,
    ) -> Option<RetryReason> {
        if attempt >= self.max_attempts || progress.response_started {
            return None;
        }
        let reason = RetryReason::from_error(error)?;
        if progress.request_written && !is_idempotent(method) {
            return None;
        }
        Some(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNSENT: Progress = Progress {
        request_written: false,
        response_started: false,
    };
    const SENT: Progress = Progress {
        request_written: true,
        response_started: false,
    };

    #[test]
    fn test_retry_once_only() {
        let config = RetryConfig::default();
        assert_eq!(
            config.should_retry(&NetError::ConnectionClosed, SENT, "GET", 0),
            Some(RetryReason::ConnectionClosed)
        );
        assert_eq!(config.should_retry(&NetError::ConnectionClosed, SENT, "GET", 1), None);
    }

    #[test]
    fn test_post_retried_only_when_unsent() {
        let config = RetryConfig::default();
        assert!(config
            .should_retry(&NetError::UnexpectedEof, UNSENT, "POST", 0)
            .is_some());
        assert!(config
            .should_retry(&NetError::UnexpectedEof, SENT, "POST", 0)
            .is_none());
        assert!(config
            .should_retry(&NetError::UnexpectedEof, SENT, "PUT", 0)
            .is_some());
    }

    #[test]
    fn test_no_retry_after_response_bytes() {
        let started = Progress {
            request_written: true,
            response_started: true,
        };
        assert!(RetryConfig::default()
            .should_retry(&NetError::UnexpectedEof, started, "GET", 0)
            .is_none());
    }

    #[test]
    fn test_request_errors_not_retried() {
        let config = RetryConfig::default();
        for err in [
            NetError::Cancelled,
            NetError::Timeout,
            NetError::StreamReset { code: 2 },
            NetError::BadStatusLine("x".into()),
        ] {
            assert!(config.should_retry(&err, UNSENT, "GET", 0).is_none(), "{:?}", err);
        }
        assert!(RetryConfig::no_retry()
            .should_retry(&NetError::ConnectionClosed, UNSENT, "GET", 0)
            .is_none());
    }

    #[test]
    fn test_refused_stream_reason() {
        assert_eq!(
            RetryReason::from_error(&NetError::Refused),
            Some(RetryReason::Http2ServerRefusedStream)
        );
    }
}
