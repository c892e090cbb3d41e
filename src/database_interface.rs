use crate::{
    backend::SlotLedger,
    booking_code::{self, with_unique_code, CodeGenerator, RandomCodes},
    error::{LedgerError, BOOKING_CODE_CONSTRAINT},
    events::SlotEvents,
    schema::{bookings, daily_slots},
    types::{day_windows, Booking, BookingDetails, Slot, SlotUpdate, SLOT_CAPACITY},
};
use chrono::{NaiveDate, NaiveTime};
use diesel::{
    r2d2::{ConnectionManager, Pool, PooledConnection},
    result::{DatabaseErrorKind, Error as DieselError},
    Connection, ExpressionMethods, Insertable, OptionalExtension, PgConnection, QueryDsl,
    RunQueryDsl, SelectableHelper,
};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use futures::stream::BoxStream;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

type ConnectionPool = Pool<ConnectionManager<PgConnection>>;

#[derive(Insertable)]
#[diesel(table_name = daily_slots)]
struct NewSlot {
    slot_date: NaiveDate,
    slot_start_time: NaiveTime,
    slot_end_time: NaiveTime,
    max_capacity: i32,
}

#[derive(Insertable)]
#[diesel(table_name = bookings)]
struct NewBooking<'a> {
    user_id: Uuid,
    slot_id: Uuid,
    booking_code: &'a str,
}

/// PostgreSQL backed ledger. Capacity checks run under a row lock on the
/// slot, uniqueness is enforced by the table constraints.
#[derive(Clone)]
pub struct DatabaseInterface {
    pool: ConnectionPool,
    events: SlotEvents,
    codes: Arc<dyn CodeGenerator>,
}

impl DatabaseInterface {
    pub fn new(database_url: &str) -> Result<Self, LedgerError> {
        let manager = ConnectionManager::<PgConnection>::new(database_url);
        let pool = Pool::builder().build(manager)?;
        pool.get()?.run_pending_migrations(MIGRATIONS).map_err(|err| {
            error!(%err, "Failed to run database migrations");
            LedgerError::TransientStoreFailure(err.to_string())
        })?;
        Ok(Self {
            pool,
            events: SlotEvents::default(),
            codes: Arc::new(RandomCodes),
        })
    }

    fn connection(&self) -> Result<PooledConnection<ConnectionManager<PgConnection>>, LedgerError> {
        Ok(self.pool.get()?)
    }

    fn insert_booking(
        &self,
        connection: &mut PgConnection,
        user_id: Uuid,
        slot_id: Uuid,
    ) -> Result<Booking, LedgerError> {
        with_unique_code(&*self.codes, |code| {
            let new_booking = NewBooking {
                user_id,
                slot_id,
                booking_code: &code,
            };
            // Savepoint, so a code collision does not abort the outer transaction.
            let inserted = connection.transaction(|connection| {
                diesel::insert_into(bookings::table)
                    .values(&new_booking)
                    .returning(Booking::as_returning())
                    .get_result(connection)
            });
            match inserted {
                Ok(booking) => Ok(Some(booking)),
                Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info))
                    if info.constraint_name() == Some(BOOKING_CODE_CONSTRAINT) =>
                {
                    Ok(None)
                }
                Err(err) => Err(err.into()),
            }
        })
    }
}

impl SlotLedger for DatabaseInterface {
    fn ensure_day_slots(&self, date: NaiveDate) -> Result<Vec<Slot>, LedgerError> {
        let mut connection = self.connection()?;
        let new_slots: Vec<NewSlot> = day_windows()
            .into_iter()
            .map(|(slot_start_time, slot_end_time)| NewSlot {
                slot_date: date,
                slot_start_time,
                slot_end_time,
                max_capacity: SLOT_CAPACITY,
            })
            .collect();

        let created = diesel::insert_into(daily_slots::table)
            .values(&new_slots)
            .on_conflict((daily_slots::slot_date, daily_slots::slot_start_time))
            .do_nothing()
            .execute(&mut *connection)?;
        if created > 0 {
            info!(%date, created, "Created daily slots");
        }
        drop(connection);

        self.slots(date)
    }

    fn slots(&self, date: NaiveDate) -> Result<Vec<Slot>, LedgerError> {
        let mut connection = self.connection()?;
        let slots = daily_slots::table
            .filter(daily_slots::slot_date.eq(date))
            .order(daily_slots::slot_start_time.asc())
            .select(Slot::as_select())
            .load(&mut *connection)?;
        Ok(slots)
    }

    fn book(&self, user_id: Uuid, slot_id: Uuid) -> Result<Booking, LedgerError> {
        let mut connection = self.connection()?;
        let (booking, slot) = connection.transaction::<_, LedgerError, _>(|connection| {
            // Concurrent bookings of this slot queue up behind this lock.
            let slot = daily_slots::table
                .find(slot_id)
                .select(Slot::as_select())
                .for_update()
                .first(connection)
                .optional()?
                .ok_or(LedgerError::NotFound)?;

            let held: i64 = bookings::table
                .filter(bookings::user_id.eq(user_id))
                .filter(bookings::slot_id.eq(slot_id))
                .count()
                .get_result(connection)?;
            if held > 0 {
                info!(%user_id, %slot_id, "Slot was already booked by this member");
                return Err(LedgerError::DuplicateBooking);
            }
            if slot.is_full() {
                info!(%user_id, %slot_id, "Slot is fully booked");
                return Err(LedgerError::SlotFull);
            }

            let booking = self.insert_booking(connection, user_id, slot_id)?;
            let slot = diesel::update(daily_slots::table.find(slot_id))
                .set(daily_slots::current_bookings.eq(daily_slots::current_bookings + 1))
                .returning(Slot::as_returning())
                .get_result(connection)?;
            Ok((booking, slot))
        })?;

        self.events.publish(&slot);
        Ok(booking)
    }

    fn cancel(&self, booking_id: Uuid) -> Result<(), LedgerError> {
        let mut connection = self.connection()?;
        let slot = connection.transaction::<_, LedgerError, _>(|connection| {
            let slot_id: Uuid = diesel::delete(bookings::table.find(booking_id))
                .returning(bookings::slot_id)
                .get_result(connection)
                .optional()?
                .ok_or_else(|| {
                    info!(%booking_id, "Booking does not exist and can't therefore not be cancelled");
                    LedgerError::NotFound
                })?;

            let slot = diesel::update(daily_slots::table.find(slot_id))
                .set(daily_slots::current_bookings.eq(daily_slots::current_bookings - 1))
                .returning(Slot::as_returning())
                .get_result(connection)?;
            Ok(slot)
        })?;

        self.events.publish(&slot);
        Ok(())
    }

    fn user_bookings(&self, user_id: Uuid) -> Result<Vec<BookingDetails>, LedgerError> {
        let mut connection = self.connection()?;
        let rows: Vec<(Booking, Slot)> = bookings::table
            .inner_join(daily_slots::table)
            .filter(bookings::user_id.eq(user_id))
            .order(bookings::created_at.desc())
            .select((Booking::as_select(), Slot::as_select()))
            .load(&mut *connection)?;
        Ok(rows
            .into_iter()
            .map(|(booking, slot)| BookingDetails::new(booking, &slot))
            .collect())
    }

    fn booking_by_code(&self, code: &str) -> Result<BookingDetails, LedgerError> {
        if !booking_code::is_well_formed(code) {
            return Err(LedgerError::InvalidInput(format!("Malformed booking code {code}")));
        }
        let mut connection = self.connection()?;
        let (booking, slot): (Booking, Slot) = bookings::table
            .inner_join(daily_slots::table)
            .filter(bookings::booking_code.eq(code))
            .select((Booking::as_select(), Slot::as_select()))
            .first(&mut *connection)?;
        Ok(BookingDetails::new(booking, &slot))
    }

    fn slot_updates(&self, date: NaiveDate) -> BoxStream<'static, SlotUpdate> {
        self.events.subscribe(date)
    }
}
