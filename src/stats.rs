//! Workout statistics derived from a member's bookings.

use crate::{error::LedgerError, types::BookingDetails};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Windows longer than this are reported per week instead of per day.
pub const WEEKLY_THRESHOLD_DAYS: u32 = 60;
pub const MAX_WINDOW_DAYS: u32 = 730;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Daily,
    Weekly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsBucket {
    pub start: NaiveDate,
    pub workouts: u32,
    pub hours: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingStats {
    pub window_days: u32,
    pub total_workouts: u32,
    pub total_hours: i64,
    pub avg_per_week: f64,
    pub granularity: Granularity,
    pub buckets: Vec<StatsBucket>,
}

pub fn aggregate(
    bookings: &[BookingDetails],
    today: NaiveDate,
    window_days: u32,
) -> Result<BookingStats, LedgerError> {
    if !(1..=MAX_WINDOW_DAYS).contains(&window_days) {
        return Err(LedgerError::InvalidInput(format!(
            "Statistics window must span 1 to {MAX_WINDOW_DAYS} days, got {window_days}"
        )));
    }
    let window_start = today - Duration::days(i64::from(window_days));

    let mut per_day: BTreeMap<NaiveDate, (u32, i64)> = BTreeMap::new();
    for booking in bookings
        .iter()
        .filter(|booking| booking.slot_date >= window_start && booking.slot_date <= today)
    {
        let entry = per_day.entry(booking.slot_date).or_default();
        entry.0 += 1;
        entry.1 += booking.hours();
    }

    let total_workouts = per_day.values().map(|(workouts, _)| workouts).sum::<u32>();
    let total_hours = per_day.values().map(|(_, hours)| hours).sum::<i64>();
    let weeks = f64::from(window_days) / 7.0;
    let avg_per_week = (f64::from(total_workouts) / weeks * 10.0).round() / 10.0;

    let (granularity, span) = if window_days > WEEKLY_THRESHOLD_DAYS {
        (Granularity::Weekly, 7)
    } else {
        (Granularity::Daily, 1)
    };

    let mut buckets = Vec::new();
    let mut end = today;
    while end >= window_start {
        let start = (end - Duration::days(span - 1)).max(window_start);
        let (workouts, hours) = per_day
            .range(start..=end)
            .fold((0u32, 0i64), |(workouts, hours), (_, (w, h))| (workouts + w, hours + h));
        buckets.push(StatsBucket {
            start,
            workouts,
            hours,
        });
        end = start - Duration::days(1);
    }
    buckets.reverse();

    Ok(BookingStats {
        window_days,
        total_workouts,
        total_hours,
        avg_per_week,
        granularity,
        buckets,
    })
}
