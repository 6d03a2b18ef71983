//! HTTP/1.x request parsing and response writing (spec.md §4.F).

pub mod connection;
pub mod request;

pub use connection::Connection;
pub use request::{Method, Request};
