use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use diesel::{Queryable, Selectable};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Seats per slot.
pub const SLOT_CAPACITY: i32 = 50;
pub const SLOTS_PER_DAY: usize = 9;
const FIRST_SLOT_HOUR: i64 = 5;
const SLOT_HOURS: i64 = 2;

/// The fixed windows every day is split into: 05:00-07:00 up to 21:00-23:00.
pub fn day_windows() -> Vec<(NaiveTime, NaiveTime)> {
    (0..SLOTS_PER_DAY as i64)
        .map(|index| {
            let start = NaiveTime::default() + Duration::hours(FIRST_SLOT_HOUR + index * SLOT_HOURS);
            (start, start + Duration::hours(SLOT_HOURS))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = crate::schema::daily_slots)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Slot {
    pub id: Uuid,
    pub slot_date: NaiveDate,
    pub slot_start_time: NaiveTime,
    pub slot_end_time: NaiveTime,
    pub current_bookings: i32,
    pub max_capacity: i32,
}

impl Slot {
    pub fn new(slot_date: NaiveDate, slot_start_time: NaiveTime, slot_end_time: NaiveTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            slot_date,
            slot_start_time,
            slot_end_time,
            current_bookings: 0,
            max_capacity: SLOT_CAPACITY,
        }
    }

    pub fn is_full(&self) -> bool {
        self.current_bookings >= self.max_capacity
    }

    pub fn available(&self) -> i32 {
        self.max_capacity - self.current_bookings
    }

    /// Share of occupied seats in percent.
    pub fn occupancy_percent(&self) -> f64 {
        if self.max_capacity <= 0 {
            return 100.0;
        }
        f64::from(self.current_bookings) * 100.0 / f64::from(self.max_capacity)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = crate::schema::bookings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub slot_id: Uuid,
    pub booking_code: String,
    pub created_at: DateTime<Utc>,
}

/// A booking together with the window it reserves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingDetails {
    pub id: Uuid,
    pub user_id: Uuid,
    pub slot_id: Uuid,
    pub booking_code: String,
    pub created_at: DateTime<Utc>,
    pub slot_date: NaiveDate,
    pub slot_start_time: NaiveTime,
    pub slot_end_time: NaiveTime,
}

impl BookingDetails {
    pub fn new(booking: Booking, slot: &Slot) -> Self {
        Self {
            id: booking.id,
            user_id: booking.user_id,
            slot_id: booking.slot_id,
            booking_code: booking.booking_code,
            created_at: booking.created_at,
            slot_date: slot.slot_date,
            slot_start_time: slot.slot_start_time,
            slot_end_time: slot.slot_end_time,
        }
    }

    pub fn hours(&self) -> i64 {
        (self.slot_end_time - self.slot_start_time).num_hours()
    }
}

/// Published after a booking or cancellation changed a slot's count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotUpdate {
    pub slot_id: Uuid,
    pub slot_date: NaiveDate,
    pub current_bookings: i32,
    pub max_capacity: i32,
}

impl From<&Slot> for SlotUpdate {
    fn from(slot: &Slot) -> Self {
        Self {
            slot_id: slot.id,
            slot_date: slot.slot_date,
            current_bookings: slot.current_bookings,
            max_capacity: slot.max_capacity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    Plenty,
    Limited,
    Scarce,
    Full,
}

/// Member facing view of a slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotAvailability {
    #[serde(flatten)]
    pub slot: Slot,
    pub available: i32,
    pub availability: Availability,
}

impl From<Slot> for SlotAvailability {
    fn from(slot: Slot) -> Self {
        let available = slot.available();
        let free_percent = 100.0 - slot.occupancy_percent();
        let availability = if available <= 0 {
            Availability::Full
        } else if free_percent >= 70.0 {
            Availability::Plenty
        } else if free_percent >= 30.0 {
            Availability::Limited
        } else {
            Availability::Scarce
        };
        Self {
            slot,
            available,
            availability,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OccupancyLevel {
    Low,
    Moderate,
    High,
}

/// Administrative view of a slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotOccupancy {
    #[serde(flatten)]
    pub slot: Slot,
    pub percentage: f64,
    pub level: OccupancyLevel,
}

impl From<Slot> for SlotOccupancy {
    fn from(slot: Slot) -> Self {
        let percentage = slot.occupancy_percent();
        let level = if percentage > 70.0 {
            OccupancyLevel::High
        } else if percentage > 40.0 {
            OccupancyLevel::Moderate
        } else {
            OccupancyLevel::Low
        };
        Self {
            slot,
            percentage,
            level,
        }
    }
}
