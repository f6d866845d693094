//! Base types and error handling.
//!
//! - [`NetError`](neterror::NetError): the crate-wide error taxonomy
//! - [`IoResultExt`](context::IoResultExt): context helpers for IO errors

pub mod context;
pub mod neterror;
