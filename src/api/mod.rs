//! HTTP/WebSocket surface of the game service.
//!
//! One WebSocket endpoint carries the whole game protocol; `/health` and
//! `/metrics` serve plumbing.

pub mod events;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod websocket;

pub use handlers::AppState;
pub use server::ApiServer;
