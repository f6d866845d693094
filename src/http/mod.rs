//! HTTP engines and the request path above them.
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`h1`] | HTTP/1.1 framing over an exclusive connection |
//! | [`h2`] | HTTP/2 framing, HPACK and the connection driver |
//! | [`transport`] | Protocol selection and dialing per [`Transport`](transport::Transport) |
//! | [`roundtripper`] | Pooling, retry, timeout and cancellation |
//! | [`orderedheaders`] | Insertion-ordered header list and order resolution |
//! | [`decoder`] | Content-Encoding decoding |

pub mod decoder;
pub mod h1;
pub mod h2;
pub mod h2settings;
pub mod orderedheaders;
pub mod request;
pub mod requestbody;
pub mod response;
pub mod retry;
pub mod roundtripper;
pub mod transport;

// Re-exports for convenience
pub use h2settings::H2Settings;
pub use orderedheaders::{HeaderFilter, HeaderList};
pub use request::Request;
pub use requestbody::RequestBody;
pub use response::{RawResponse, Response};
pub use roundtripper::RoundTripper;
pub use transport::{Connection, Connector, Transport};
