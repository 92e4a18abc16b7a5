//! HTTP route handlers.

pub mod admin;
pub mod devices;
pub mod health;
pub mod leaderboard;
pub mod sync;
pub mod user;
