use sea_orm::error::DbErr;
use sea_orm::TransactionError;

/// Error taxonomy shared by every service in the crate.
///
/// Validation and business-rule errors are raised before any mutation;
/// `Database` covers storage faults, which always roll the surrounding
/// transaction back. Every variant carries enough context for the caller
/// to render an actionable message.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Audit entry {0} has already been reverted")]
    AlreadyReverted(i64),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

/// Unwraps sea-orm's transaction wrapper so `?` works on
/// `db.transaction(..)` results inside service methods.
impl From<TransactionError<ServiceError>> for ServiceError {
    fn from(err: TransactionError<ServiceError>) -> Self {
        match err {
            TransactionError::Connection(db_err) => ServiceError::Database(db_err),
            TransactionError::Transaction(service_err) => service_err,
        }
    }
}

impl ServiceError {
    /// Wraps a string-based storage failure without losing the `Database`
    /// classification.
    pub fn db_error(message: impl Into<String>) -> Self {
        ServiceError::Database(DbErr::Custom(message.into()))
    }

    /// True for errors the caller caused (bad input, wrong state or role),
    /// false for faults of the storage layer itself.
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            ServiceError::Database(_) | ServiceError::EventError(_) | ServiceError::Internal(_)
        )
    }
}
