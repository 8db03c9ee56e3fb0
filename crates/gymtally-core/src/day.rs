//! Gym-local day boundary rule.
//!
//! Daily attendance caps, streak continuity, and weekly goal buckets all
//! depend on which calendar day an instant falls on. That question is
//! answered here, once, against a fixed UTC offset taken from configuration
//! (never the device timezone), so every module counts days the same way.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Maps UTC instants to gym-local calendar days.
///
/// All attendance semantics (one reward per day, streak day D vs D-1,
/// ISO-week bucketing) are defined in terms of this mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayBoundary {
    offset: FixedOffset,
}

/// ISO week bucket a gym-local day falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsoWeekKey {
    /// ISO week-numbering year (differs from calendar year around Jan 1)
    pub year: i32,

    /// ISO week number, 1-53
    pub week: u32,

    /// Monday of this week, as a gym-local date
    pub week_start: NaiveDate,
}

impl DayBoundary {
    /// Offset applied when configuration does not override it.
    pub const DEFAULT_UTC_OFFSET_HOURS: i32 = -3;

    /// Build a boundary for a whole-hour UTC offset.
    ///
    /// Returns `None` when the offset is outside chrono's representable
    /// range (beyond +/- 23 hours).
    pub fn from_offset_hours(hours: i32) -> Option<Self> {
        FixedOffset::east_opt(hours * 3600).map(|offset| Self { offset })
    }

    /// The gym-local calendar day the instant falls on.
    pub fn local_day(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }

    /// Half-open UTC interval `[start, end)` covering one gym-local day.
    pub fn day_bounds(&self, day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let midnight = day.and_time(NaiveTime::MIN);
        // Unambiguous for fixed offsets; there is no DST fold to resolve.
        let start = self
            .offset
            .from_local_datetime(&midnight)
            .single()
            .unwrap_or_else(|| self.offset.from_utc_datetime(&midnight))
            .with_timezone(&Utc);
        (start, start + Duration::days(1))
    }

    /// ISO week bucket for the gym-local day of the instant.
    pub fn iso_week(&self, at: DateTime<Utc>) -> IsoWeekKey {
        self.iso_week_of(self.local_day(at))
    }

    /// ISO week bucket for an already-resolved gym-local day.
    pub fn iso_week_of(&self, day: NaiveDate) -> IsoWeekKey {
        let iso = day.iso_week();
        let week_start = NaiveDate::from_isoywd_opt(iso.year(), iso.week(), Weekday::Mon)
            .unwrap_or(day);
        IsoWeekKey {
            year: iso.year(),
            week: iso.week(),
            week_start,
        }
    }
}

impl Default for DayBoundary {
    fn default() -> Self {
        let offset = FixedOffset::east_opt(Self::DEFAULT_UTC_OFFSET_HOURS * 3600)
            .unwrap_or(FixedOffset::east_opt(0).unwrap());
        Self { offset }
    }
}
