use crate::{
    backend::SlotLedger,
    booking_code::{self, with_unique_code, CodeGenerator, RandomCodes},
    error::LedgerError,
    events::SlotEvents,
    types::{day_windows, Booking, BookingDetails, Slot, SlotUpdate},
};
use chrono::{NaiveDate, NaiveTime, Utc};
use futures::stream::BoxStream;
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::{error, info};
use uuid::Uuid;

#[derive(Debug, Default)]
struct LedgerState {
    slots: HashMap<Uuid, Slot>,
    day_index: HashMap<(NaiveDate, NaiveTime), Uuid>,
    bookings: HashMap<Uuid, Booking>,
    booking_codes: HashMap<String, Uuid>,
    held: HashSet<(Uuid, Uuid)>,
}

impl LedgerState {
    fn slots_of(&self, date: NaiveDate) -> Vec<Slot> {
        let mut slots: Vec<Slot> = self
            .slots
            .values()
            .filter(|slot| slot.slot_date == date)
            .cloned()
            .collect();
        slots.sort_unstable_by(|a, b| a.slot_start_time.cmp(&b.slot_start_time));
        slots
    }

    fn details(&self, booking: &Booking) -> Result<BookingDetails, LedgerError> {
        let slot = self.slots.get(&booking.slot_id).ok_or_else(|| {
            error!(booking_id = %booking.id, "Booking references a missing slot");
            LedgerError::TransientStoreFailure("Booking references a missing slot".into())
        })?;
        Ok(BookingDetails::new(booking.clone(), slot))
    }
}

/// In-process ledger. The whole state sits behind one mutex, so every
/// operation runs as if it were a serializable transaction.
#[derive(Clone)]
pub struct LocalLedger {
    state: Arc<Mutex<LedgerState>>,
    events: SlotEvents,
    codes: Arc<dyn CodeGenerator>,
}

impl Default for LocalLedger {
    fn default() -> Self {
        Self::with_code_generator(RandomCodes)
    }
}

impl LocalLedger {
    pub fn with_code_generator(codes: impl CodeGenerator + 'static) -> Self {
        Self {
            state: Arc::new(Mutex::default()),
            events: SlotEvents::default(),
            codes: Arc::new(codes),
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, LedgerState>, LedgerError> {
        self.state.lock().map_err(|err| {
            error!(%err, "Ledger state is poisoned");
            LedgerError::TransientStoreFailure("Ledger state is poisoned".into())
        })
    }
}

impl SlotLedger for LocalLedger {
    fn ensure_day_slots(&self, date: NaiveDate) -> Result<Vec<Slot>, LedgerError> {
        let mut guard = self.state()?;
        let state = &mut *guard;
        for (start, end) in day_windows() {
            if state.day_index.contains_key(&(date, start)) {
                continue;
            }
            let slot = Slot::new(date, start, end);
            state.day_index.insert((date, start), slot.id);
            state.slots.insert(slot.id, slot);
        }
        Ok(state.slots_of(date))
    }

    fn slots(&self, date: NaiveDate) -> Result<Vec<Slot>, LedgerError> {
        Ok(self.state()?.slots_of(date))
    }

    fn book(&self, user_id: Uuid, slot_id: Uuid) -> Result<Booking, LedgerError> {
        let (booking, slot) = {
            let mut guard = self.state()?;
            let state = &mut *guard;

            let Some(slot) = state.slots.get_mut(&slot_id) else {
                info!(%slot_id, "Slot does not exist and can't therefore not be booked");
                return Err(LedgerError::NotFound);
            };
            if state.held.contains(&(user_id, slot_id)) {
                info!(%user_id, %slot_id, "Slot was already booked by this member");
                return Err(LedgerError::DuplicateBooking);
            }
            if slot.is_full() {
                info!(%user_id, %slot_id, "Slot is fully booked");
                return Err(LedgerError::SlotFull);
            }

            let codes = &state.booking_codes;
            let booking_code = with_unique_code(&*self.codes, |code| {
                Ok((!codes.contains_key(&code)).then_some(code))
            })?;

            let booking = Booking {
                id: Uuid::new_v4(),
                user_id,
                slot_id,
                booking_code,
                created_at: Utc::now(),
            };
            slot.current_bookings += 1;
            state
                .booking_codes
                .insert(booking.booking_code.clone(), booking.id);
            state.held.insert((user_id, slot_id));
            state.bookings.insert(booking.id, booking.clone());
            (booking, slot.clone())
        };
        self.events.publish(&slot);
        Ok(booking)
    }

    fn cancel(&self, booking_id: Uuid) -> Result<(), LedgerError> {
        let slot = {
            let mut guard = self.state()?;
            let state = &mut *guard;

            let Some(slot_id) = state.bookings.get(&booking_id).map(|booking| booking.slot_id)
            else {
                info!(%booking_id, "Booking does not exist and can't therefore not be cancelled");
                return Err(LedgerError::NotFound);
            };
            let Some(slot) = state.slots.get_mut(&slot_id) else {
                error!(%booking_id, %slot_id, "Booking references a missing slot");
                return Err(LedgerError::TransientStoreFailure(
                    "Booking references a missing slot".into(),
                ));
            };
            slot.current_bookings -= 1;
            let slot = slot.clone();

            if let Some(booking) = state.bookings.remove(&booking_id) {
                state.booking_codes.remove(&booking.booking_code);
                state.held.remove(&(booking.user_id, booking.slot_id));
            }
            slot
        };
        self.events.publish(&slot);
        Ok(())
    }

    fn user_bookings(&self, user_id: Uuid) -> Result<Vec<BookingDetails>, LedgerError> {
        let state = self.state()?;
        let mut bookings = state
            .bookings
            .values()
            .filter(|booking| booking.user_id == user_id)
            .map(|booking| state.details(booking))
            .collect::<Result<Vec<_>, _>>()?;
        bookings.sort_unstable_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookings)
    }

    fn booking_by_code(&self, code: &str) -> Result<BookingDetails, LedgerError> {
        if !booking_code::is_well_formed(code) {
            return Err(LedgerError::InvalidInput(format!("Malformed booking code {code}")));
        }
        let state = self.state()?;
        let booking = state
            .booking_codes
            .get(code)
            .and_then(|booking_id| state.bookings.get(booking_id))
            .ok_or(LedgerError::NotFound)?;
        state.details(booking)
    }

    fn slot_updates(&self, date: NaiveDate) -> BoxStream<'static, SlotUpdate> {
        self.events.subscribe(date)
    }
}
