//! Transport layer for the allocation engine.
//!
//! Currently provides HTTP transport via axum.

pub mod http;

pub use http::{ServerConfig, serve, serve_on};
