//! Database entity definitions.
//!
//! Entities are direct mappings to database rows.

pub mod account;
pub mod device;
pub mod event;

pub use account::AccountEntity;
pub use device::DeviceEntity;
pub use event::{EventEntity, EventKeyEntity};
