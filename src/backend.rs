use crate::{
    error::LedgerError,
    stats::{self, BookingStats},
    types::{Booking, BookingDetails, Slot, SlotUpdate},
};
use chrono::NaiveDate;
use futures::stream::BoxStream;
use uuid::Uuid;

/// Authoritative owner of slot occupancy and bookings.
///
/// `book` and `cancel` are the only mutating operations. Each one either
/// commits completely or leaves slots and bookings untouched.
pub trait SlotLedger: Clone + Send + Sync + 'static {
    /// Creates the fixed windows of `date` unless they exist and returns all of them.
    fn ensure_day_slots(&self, date: NaiveDate) -> Result<Vec<Slot>, LedgerError>;
    /// Slots of `date`, ordered by start time.
    fn slots(&self, date: NaiveDate) -> Result<Vec<Slot>, LedgerError>;
    fn book(&self, user_id: Uuid, slot_id: Uuid) -> Result<Booking, LedgerError>;
    fn cancel(&self, booking_id: Uuid) -> Result<(), LedgerError>;
    /// Newest booking first.
    fn user_bookings(&self, user_id: Uuid) -> Result<Vec<BookingDetails>, LedgerError>;
    fn booking_by_code(&self, code: &str) -> Result<BookingDetails, LedgerError>;
    fn slot_updates(&self, date: NaiveDate) -> BoxStream<'static, SlotUpdate>;

    fn booking_stats(
        &self,
        user_id: Uuid,
        window_days: u32,
        today: NaiveDate,
    ) -> Result<BookingStats, LedgerError> {
        let bookings = self.user_bookings(user_id)?;
        stats::aggregate(&bookings, today, window_days)
    }
}
