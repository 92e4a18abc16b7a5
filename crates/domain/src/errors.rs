//! Domain error types.

use thiserror::Error;
use uuid::Uuid;

/// Errors reported by a storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// A referenced row does not exist.
    #[error("referenced row not found: {0}")]
    NotFound(String),

    /// The requested operation is not available on this backend.
    #[error("operation unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(String),
}

/// Errors produced by domain services.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Malformed or out-of-range input for a whole request.
    #[error("{0}")]
    Validation(String),

    /// Device not active or not owned by the resolved account.
    #[error("{0}")]
    Authorization(String),

    #[error("{0}")]
    NotFound(String),

    /// The account referenced by a registration does not exist.
    #[error("User {0} does not exist. Please ensure you are logged in properly.")]
    AccountNotFound(i64),

    /// Registration finished but the device could not be confirmed active.
    #[error("Device registration failed for {0}")]
    RegistrationUnconfirmed(Uuid),

    #[error("invalid device state transition: {0}")]
    InvalidTransition(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_not_found_message() {
        let err = DomainError::AccountNotFound(42);
        assert_eq!(
            err.to_string(),
            "User 42 does not exist. Please ensure you are logged in properly."
        );
    }

    #[test]
    fn test_store_error_converts() {
        let err: DomainError = StoreError::Database("connection reset".into()).into();
        assert!(matches!(err, DomainError::Store(StoreError::Database(_))));
        assert_eq!(err.to_string(), "database error: connection reset");
    }
}
