//! hostmon daemon: HTTP surface and process lifecycle for the metrics agent.

pub mod api;
pub mod shutdown;

pub use api::{router, serve, AppState};
