//! Domain layer for the Cribble backend.
//!
//! This crate contains:
//! - Domain models (UsageEvent, Device, Account, scores, leaderboard)
//! - Storage ports implemented by the persistence crate
//! - The ingestion and scoring pipeline services
//! - Domain error types
//! - An in-memory store used by tests and local tooling

pub mod errors;
pub mod memory;
pub mod models;
pub mod ports;
pub mod services;

pub use errors::{DomainError, StoreError};
