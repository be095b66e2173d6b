//! HTTP transport: JSON routes over the allocation service.

mod routes;
mod server;

pub use routes::routes;
pub use server::{ServerConfig, serve, serve_on};
