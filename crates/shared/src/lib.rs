//! Shared utilities for the Cribble backend.
//!
//! This crate provides small, dependency-light helpers used by every other crate:
//! - Timestamp window checks with clock-skew tolerance
//! - Domain (host) normalization
//! - UTC calendar-day helpers
//! - Constant-time secret comparison

pub mod secret;
pub mod time;
pub mod validation;
