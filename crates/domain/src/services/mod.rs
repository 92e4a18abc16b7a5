//! Ingestion and scoring services.

pub mod anomaly_cleanup;
pub mod deduplicator;
pub mod device_registry;
pub mod event_validator;
pub mod leaderboard;
pub mod scoring;
pub mod sync;
pub mod user_agent;

pub use device_registry::{
    AtomicOrFallbackRegistrar, DeviceRegistrar, DeviceRegistry, RegistrationPath,
    RegistrationReceipt, Removal,
};
pub use event_validator::{EventValidator, Rejection};
pub use leaderboard::LeaderboardService;
pub use sync::{SyncOutcome, SyncService};
