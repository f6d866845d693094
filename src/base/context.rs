//! Ergonomic error context helpers.
//!
//! Provides extension traits for adding context to `Result` types,
//! converting IO errors into context-rich `NetError` variants.

use crate::base::neterror::NetError;
use std::io;

/// Extension trait for adding context to IO Results.
pub trait IoResultExt<T> {
    /// Map a failed connect to the target into [`NetError::Unreachable`].
    ///
    /// # Example
    /// ```ignore
    /// use mimicnet::base::context::IoResultExt;
    ///
    /// let stream = TcpStream::connect(addr).await
    ///     .connection_context("example.com", 443)?;
    /// // Error: "Host unreachable: example.com:443: connection refused"
    /// ```
    fn connection_context(self, host: &str, port: u16) -> Result<T, NetError>;

    /// Map a failed connect to a proxy into [`NetError::ProxyUnreachable`].
    fn proxy_context(self, host: &str, port: u16) -> Result<T, NetError>;

    /// Map a failed body read into [`NetError::BodyReadFailed`].
    fn body_context(self) -> Result<T, NetError>;
}

impl<T> IoResultExt<T> for Result<T, io::Error> {
    fn connection_context(self, host: &str, port: u16) -> Result<T, NetError> {
        self.map_err(|e| NetError::Unreachable(format!("{}:{}: {}", host, port, e)))
    }

    fn proxy_context(self, host: &str, port: u16) -> Result<T, NetError> {
        self.map_err(|e| NetError::ProxyUnreachable(format!("{}:{}: {}", host, port, e)))
    }

    fn body_context(self) -> Result<T, NetError> {
        self.map_err(|e| NetError::BodyReadFailed(e.to_string()))
    }
}
