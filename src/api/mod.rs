pub mod auth;
pub mod client;
pub mod models;
mod player;

pub use player::{previous_restarts, PREVIOUS_RESTART_THRESHOLD_MS};
