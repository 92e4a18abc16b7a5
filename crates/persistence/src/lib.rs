//! Persistence layer for the Cribble backend.
//!
//! This crate contains:
//! - Database connection management
//! - Entity definitions (database row mappings)
//! - Repository implementations
//! - `PgStore`, the Postgres implementation of the domain storage ports

pub mod db;
pub mod entities;
pub mod metrics;
pub mod repositories;
pub mod store;

pub use store::{map_sqlx_error, PgStore};
