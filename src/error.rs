use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;
use tracing::error;

/// Constraint that keeps a member from holding two bookings on one slot.
pub const USER_SLOT_CONSTRAINT: &str = "bookings_user_slot_key";
/// Constraint that keeps booking codes unique.
pub const BOOKING_CODE_CONSTRAINT: &str = "bookings_booking_code_key";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Slot is fully booked")]
    SlotFull,
    #[error("Slot was already booked by this member")]
    DuplicateBooking,
    #[error("Booking or slot does not exist")]
    NotFound,
    #[error("Store failure, retry the request: {0}")]
    TransientStoreFailure(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl LedgerError {
    /// Only store failures are worth retrying unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::TransientStoreFailure(_))
    }
}

impl From<DieselError> for LedgerError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => LedgerError::NotFound,
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, ref info)
                if info.constraint_name() == Some(USER_SLOT_CONSTRAINT) =>
            {
                LedgerError::DuplicateBooking
            }
            err => {
                error!(?err, "Database operation failed");
                LedgerError::TransientStoreFailure(err.to_string())
            }
        }
    }
}

impl From<diesel::r2d2::PoolError> for LedgerError {
    fn from(err: diesel::r2d2::PoolError) -> Self {
        error!(?err, "Connection pool failure");
        LedgerError::TransientStoreFailure(err.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_diesel_not_found() {
        assert_eq!(LedgerError::from(DieselError::NotFound), LedgerError::NotFound);
    }

    #[test]
    fn test_rollback_is_transient() {
        let err = LedgerError::from(DieselError::RollbackTransaction);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_only_store_failures_are_retryable() {
        assert!(!LedgerError::SlotFull.is_retryable());
        assert!(!LedgerError::DuplicateBooking.is_retryable());
        assert!(!LedgerError::NotFound.is_retryable());
        assert!(!LedgerError::InvalidInput("date".into()).is_retryable());
    }
}
