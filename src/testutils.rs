use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

use chrono::{NaiveDate, Utc};
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::{
    backend::SlotLedger,
    configuration::Configuration,
    error::LedgerError,
    events::SlotEvents,
    types::{day_windows, Booking, BookingDetails, Slot, SlotUpdate},
};

pub const TEST_ADMIN_PASSWORD: &str = "123";
pub const TEST_BOOKING_CODE: &str = "ABCDEFGH";

#[derive(Clone)]
pub struct TestConfiguration;

impl Configuration for TestConfiguration {
    fn admin_password(&self) -> String {
        TEST_ADMIN_PASSWORD.into()
    }

    fn database_url(&self) -> Option<String> {
        None
    }

    fn port(&self) -> String {
        "0".into()
    }
}

pub struct MockSlotLedgerInner {
    pub failure: Mutex<Option<LedgerError>>,
    pub calls_to_ensure_day_slots: AtomicU64,
    pub calls_to_slots: AtomicU64,
    pub calls_to_book: AtomicU64,
    pub calls_to_cancel: AtomicU64,
    pub calls_to_user_bookings: AtomicU64,
    pub calls_to_booking_by_code: AtomicU64,
    pub slots: Mutex<Vec<Slot>>,
    pub bookings: Mutex<Vec<BookingDetails>>,
    pub events: SlotEvents,
}

/// Counts ledger calls and answers with canned data.
#[derive(Clone)]
pub struct MockSlotLedger(pub Arc<MockSlotLedgerInner>);

impl MockSlotLedgerInner {
    fn new() -> Self {
        Self {
            failure: Mutex::default(),
            calls_to_ensure_day_slots: AtomicU64::default(),
            calls_to_slots: AtomicU64::default(),
            calls_to_book: AtomicU64::default(),
            calls_to_cancel: AtomicU64::default(),
            calls_to_user_bookings: AtomicU64::default(),
            calls_to_booking_by_code: AtomicU64::default(),
            slots: Mutex::default(),
            bookings: Mutex::default(),
            events: SlotEvents::default(),
        }
    }
}

impl MockSlotLedger {
    pub fn new() -> Self {
        Self(Arc::new(MockSlotLedgerInner::new()))
    }

    /// Every following ledger call fails with `failure`.
    pub fn fail_with(&self, failure: LedgerError) {
        *self.0.failure.lock().unwrap() = Some(failure);
    }

    pub fn add_day(&self, date: NaiveDate) -> Vec<Slot> {
        let slots: Vec<Slot> = day_windows()
            .into_iter()
            .map(|(start, end)| Slot::new(date, start, end))
            .collect();
        self.0.slots.lock().unwrap().extend(slots.clone());
        slots
    }

    pub fn add_booking(&self, user_id: Uuid, slot_id: Uuid) -> BookingDetails {
        let (start, end) = day_windows()[0];
        let mut slot = Slot::new(Utc::now().date_naive(), start, end);
        slot.id = slot_id;
        let booking = Booking {
            id: Uuid::new_v4(),
            user_id,
            slot_id,
            booking_code: TEST_BOOKING_CODE.into(),
            created_at: Utc::now(),
        };
        let details = BookingDetails::new(booking, &slot);
        self.0.bookings.lock().unwrap().push(details.clone());
        details
    }

    fn result(&self) -> Result<(), LedgerError> {
        match self.0.failure.lock().unwrap().clone() {
            None => Ok(()),
            Some(failure) => Err(failure),
        }
    }

    fn slots_of(&self, date: NaiveDate) -> Vec<Slot> {
        self.0
            .slots
            .lock()
            .unwrap()
            .iter()
            .filter(|slot| slot.slot_date == date)
            .cloned()
            .collect()
    }
}

impl SlotLedger for MockSlotLedger {
    fn ensure_day_slots(&self, date: NaiveDate) -> Result<Vec<Slot>, LedgerError> {
        self.0
            .calls_to_ensure_day_slots
            .fetch_add(1, Ordering::SeqCst);
        self.result()?;
        Ok(self.slots_of(date))
    }

    fn slots(&self, date: NaiveDate) -> Result<Vec<Slot>, LedgerError> {
        self.0.calls_to_slots.fetch_add(1, Ordering::SeqCst);
        self.result()?;
        Ok(self.slots_of(date))
    }

    fn book(&self, user_id: Uuid, slot_id: Uuid) -> Result<Booking, LedgerError> {
        self.0.calls_to_book.fetch_add(1, Ordering::SeqCst);
        self.result()?;
        Ok(Booking {
            id: Uuid::new_v4(),
            user_id,
            slot_id,
            booking_code: TEST_BOOKING_CODE.into(),
            created_at: Utc::now(),
        })
    }

    fn cancel(&self, _booking_id: Uuid) -> Result<(), LedgerError> {
        self.0.calls_to_cancel.fetch_add(1, Ordering::SeqCst);
        self.result()
    }

    fn user_bookings(&self, user_id: Uuid) -> Result<Vec<BookingDetails>, LedgerError> {
        self.0
            .calls_to_user_bookings
            .fetch_add(1, Ordering::SeqCst);
        self.result()?;
        Ok(self
            .0
            .bookings
            .lock()
            .unwrap()
            .iter()
            .filter(|booking| booking.user_id == user_id)
            .cloned()
            .collect())
    }

    fn booking_by_code(&self, code: &str) -> Result<BookingDetails, LedgerError> {
        self.0
            .calls_to_booking_by_code
            .fetch_add(1, Ordering::SeqCst);
        self.result()?;
        self.0
            .bookings
            .lock()
            .unwrap()
            .iter()
            .find(|booking| booking.booking_code == code)
            .cloned()
            .ok_or(LedgerError::NotFound)
    }

    fn slot_updates(&self, date: NaiveDate) -> BoxStream<'static, SlotUpdate> {
        self.0.events.subscribe(date)
    }
}
