//! HTTP API handlers

mod health;
mod status;

pub use health::{health_check, health_routes};
pub use status::song_status;
