//! Repository implementations for database operations.

pub mod account;
pub mod device;
pub mod event;
pub mod score;

pub use account::AccountRepository;
pub use device::DeviceRepository;
pub use event::EventRepository;
pub use score::ProcedureRepository;
