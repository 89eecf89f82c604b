//! Rolling-window math for resources and contact timing.
//!
//! Windows are calendar days in a resource's configured timezone, carried as
//! a plain UTC offset in minutes. All math is pure so the validator's hot
//! path never consults a timezone database.

use chrono::{DateTime, Datelike, TimeDelta, Timelike, Utc};

use crate::ids::ResourceId;

/// A shared physical sending asset: domain, phone number, channel seat.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Resource {
    pub id: ResourceId,
    pub label: String,
    /// Hard cap on sends per calendar day.
    pub daily_limit: i32,
    /// Minutes east of UTC for the resource's configured timezone.
    pub utc_offset_minutes: i32,
}

/// One counter row per (resource, window).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResourceCounter {
    pub resource_id: ResourceId,
    pub window_start: DateTime<Utc>,
    pub count: i32,
    pub hard_limit: i32,
}

impl ResourceCounter {
    pub fn remaining(&self) -> i32 {
        (self.hard_limit - self.count).max(0)
    }
}

/// UTC instant of the most recent local midnight at the given offset.
pub fn window_start(now: DateTime<Utc>, utc_offset_minutes: i32) -> DateTime<Utc> {
    let offset = TimeDelta::minutes(i64::from(utc_offset_minutes));
    let local = now + offset;
    let since_midnight = TimeDelta::hours(i64::from(local.hour()))
        + TimeDelta::minutes(i64::from(local.minute()))
        + TimeDelta::seconds(i64::from(local.second()))
        + TimeDelta::nanoseconds(i64::from(local.nanosecond()));
    now - since_midnight
}

/// UTC instant of the following local midnight (start of the next window).
pub fn next_window_start(now: DateTime<Utc>, utc_offset_minutes: i32) -> DateTime<Utc> {
    window_start(now, utc_offset_minutes) + TimeDelta::days(1)
}

/// Allowed local contact hours, applied per record locale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ContactWindow {
    /// First allowed local hour, inclusive.
    pub start_hour: u8,
    /// Last allowed local hour, exclusive.
    pub end_hour: u8,
    /// Skip Saturday and Sunday in the record's locale.
    pub weekdays_only: bool,
}

impl Default for ContactWindow {
    fn default() -> Self {
        Self {
            start_hour: 8,
            end_hour: 18,
            weekdays_only: true,
        }
    }
}

impl ContactWindow {
    /// Whether `now` falls inside the window for a locale at the given
    /// offset. Records with an unknown locale are checked against UTC.
    pub fn contains(&self, now: DateTime<Utc>, utc_offset_minutes: Option<i32>) -> bool {
        let offset = TimeDelta::minutes(i64::from(utc_offset_minutes.unwrap_or(0)));
        let local = now + offset;
        if self.weekdays_only && matches!(local.weekday().number_from_monday(), 6 | 7) {
            return false;
        }
        let hour = local.hour() as u8;
        hour >= self.start_hour && hour < self.end_hour
    }
}
