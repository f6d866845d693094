//! HTTP/2 engine.
//!
//! - [`frame`]: frame layout and validation
//! - [`hpack`]: header compression with a deterministic encoder
//! - [`huffman`]: the RFC 7541 Huffman code
//! - [`connection`]: the connection driver and its handle

pub mod connection;
pub mod frame;
pub mod hpack;
pub mod huffman;

pub use connection::{H2Config, H2Connection, H2Driver, H2Handle, H2Head, StreamFlags};
