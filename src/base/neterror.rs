use std::io;
use thiserror::Error;

/// Broad grouping of [`NetError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Configuration,
    Dial,
    Tls,
    Http1,
    Http2,
    Lifecycle,
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum NetError {
    // Configuration Errors
    #[error("Unknown profile: {0}")]
    UnknownProfile(String),
    #[error("Bad proxy URL: {0}")]
    BadProxyUrl(String),
    #[error("A browser profile is required when TLS is enabled")]
    MissingProfile,
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid header: {0}")]
    InvalidHeader(String),
    #[error("Profile cannot be encoded: {0}")]
    ProfileEncodeError(String),
    #[error("Invalid client options: {0}")]
    InvalidOptions(String),

    // Dial Errors
    #[error("Dial timed out")]
    DialTimeout,
    #[error("Host unreachable: {0}")]
    Unreachable(String),
    #[error("Proxy unreachable: {0}")]
    ProxyUnreachable(String),
    #[error("Proxy refused the tunnel (status {status})")]
    ProxyRefused { status: u16 },
    #[error("Proxy authentication failed")]
    ProxyAuthFailed,

    // TLS Errors
    #[error("TLS handshake failed: {0}")]
    TlsHandshakeFailed(String),
    #[error("Server selected ALPN protocol outside the profile: {0}")]
    AlpnMismatch(String),
    #[error("Certificate invalid: {0}")]
    CertificateInvalid(String),
    #[error("ClientHello does not match the profile template: {0}")]
    FingerprintMismatch(String),

    // HTTP/1.1 Errors
    #[error("Bad status line: {0}")]
    BadStatusLine(String),
    #[error("Header parse error: {0}")]
    HeaderParseError(String),
    #[error("Unexpected end of stream")]
    UnexpectedEof,
    #[error("Invalid chunked encoding")]
    InvalidChunkedEncoding,

    // HTTP/2 Errors
    #[error("HTTP/2 protocol error: {0}")]
    ProtocolError(String),
    #[error("HTTP/2 flow control error")]
    FlowControlError,
    #[error("HTTP/2 stream reset by peer (code {code})")]
    StreamReset { code: u32 },
    #[error("HTTP/2 GOAWAY received (code {code}, last stream {last_stream_id})")]
    GoAway { code: u32, last_stream_id: u32 },
    #[error("HPACK compression error: {0}")]
    CompressionError(String),
    #[error("HTTP/2 stream refused")]
    Refused,

    // Request Lifecycle Errors
    #[error("Request cancelled")]
    Cancelled,
    #[error("Request timed out")]
    Timeout,
    #[error("Body read failed: {0}")]
    BodyReadFailed(String),
    #[error("Unknown content encoding: {0}")]
    UnknownContentEncoding(String),
    #[error("Content decoding failed: {0}")]
    ContentDecodingFailed(String),
    #[error("Cookie not found: {0}")]
    CookieNotFound(String),
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("I/O error ({kind:?}): {message}")]
    Io { kind: io::ErrorKind, message: String },
}

impl NetError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            NetError::UnknownProfile(_)
            | NetError::BadProxyUrl(_)
            | NetError::MissingProfile
            | NetError::InvalidUrl(_)
            | NetError::InvalidHeader(_)
            | NetError::ProfileEncodeError(_)
            | NetError::InvalidOptions(_) => ErrorCategory::Configuration,

            NetError::DialTimeout
            | NetError::Unreachable(_)
            | NetError::ProxyUnreachable(_)
            | NetError::ProxyRefused { .. }
            | NetError::ProxyAuthFailed => ErrorCategory::Dial,

            NetError::TlsHandshakeFailed(_)
            | NetError::AlpnMismatch(_)
            | NetError::CertificateInvalid(_)
            | NetError::FingerprintMismatch(_) => ErrorCategory::Tls,

            NetError::BadStatusLine(_)
            | NetError::HeaderParseError(_)
            | NetError::UnexpectedEof
            | NetError::InvalidChunkedEncoding => ErrorCategory::Http1,

            NetError::ProtocolError(_)
            | NetError::FlowControlError
            | NetError::StreamReset { .. }
            | NetError::GoAway { .. }
            | NetError::CompressionError(_)
            | NetError::Refused => ErrorCategory::Http2,

            NetError::Cancelled
            | NetError::Timeout
            | NetError::BodyReadFailed(_)
            | NetError::UnknownContentEncoding(_)
            | NetError::ContentDecodingFailed(_)
            | NetError::CookieNotFound(_)
            | NetError::ConnectionClosed
            | NetError::Io { .. } => ErrorCategory::Lifecycle,
        }
    }

    /// Errors produced by a broken or stale connection rather than by the
    /// request itself. Only these are candidates for a retry.
    pub fn is_transport(&self) -> bool {
        match self {
            NetError::ConnectionClosed | NetError::UnexpectedEof | NetError::Refused => true,
            NetError::GoAway { code, .. } => *code == 0,
            NetError::Io { kind, .. } => matches!(
                kind,
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::NotConnected
            ),
            _ => false,
        }
    }
}

impl From<io::Error> for NetError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => NetError::UnexpectedEof,
            kind => NetError::Io {
                kind,
                message: err.to_string(),
            },
        }
    }
}
