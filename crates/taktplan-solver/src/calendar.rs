//! Business-hours calendar over the planning horizon.
//!
//! The solver works in integer minute offsets from the schedule start. The
//! calendar pre-computes, once per solve, the attended segments of the whole
//! horizon: per-day work windows minus the lunch break, with holidays masked
//! out. A segment is a maximal span in which attended work may run without
//! interruption; a span "fits" only if it lies inside a single segment.

use chrono::{DateTime, Timelike, Utc};
use taktplan_core::{SchedulingError, MINUTES_PER_DAY};

/// Work-hour rules from the business constraints.
#[derive(Clone, Debug, PartialEq)]
pub struct BusinessHours {
    /// Hour the workday opens, 0..=23.
    pub work_start_hour: u8,
    /// Hour the workday closes, 1..=24; must exceed `work_start_hour`.
    pub work_end_hour: u8,
    pub lunch_start_hour: u8,
    /// 15..=120 minutes.
    pub lunch_duration_minutes: u16,
    /// Holiday days within the horizon, 1-indexed from the schedule start day.
    pub holiday_days: Vec<u16>,
    pub enforce: bool,
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            work_start_hour: 7,
            work_end_hour: 16,
            lunch_start_hour: 12,
            lunch_duration_minutes: 45,
            holiday_days: Vec::new(),
            enforce: true,
        }
    }
}

impl BusinessHours {
    pub fn validate(&self, horizon_days: u16) -> Result<(), SchedulingError> {
        if self.work_start_hour > 23 {
            return Err(SchedulingError::configuration("work_start_hour", "must be 0..=23"));
        }
        if self.work_end_hour < 1 || self.work_end_hour > 24 {
            return Err(SchedulingError::configuration("work_end_hour", "must be 1..=24"));
        }
        if self.work_end_hour <= self.work_start_hour {
            return Err(SchedulingError::configuration(
                "work_end_hour",
                "must be after work_start_hour",
            ));
        }
        if self.lunch_duration_minutes < 15 || self.lunch_duration_minutes > 120 {
            return Err(SchedulingError::configuration(
                "lunch_duration_minutes",
                "must be 15..=120",
            ));
        }
        for &day in &self.holiday_days {
            if day == 0 || day > horizon_days {
                return Err(SchedulingError::validation(
                    "holiday_days",
                    format!("day {day} lies outside the {horizon_days}-day horizon"),
                ));
            }
        }
        Ok(())
    }
}

/// Pre-computed attended segments over the horizon, in minute offsets.
#[derive(Clone, Debug)]
pub struct BusinessCalendar {
    horizon_minutes: i64,
    enforce: bool,
    segments: Vec<(i64, i64)>,
}

impl BusinessCalendar {
    /// Build the horizon mask. `schedule_start` anchors offset 0; work
    /// windows are aligned to wall-clock days around it.
    pub fn build(hours: &BusinessHours, horizon_days: u16, schedule_start: DateTime<Utc>) -> Self {
        let horizon_minutes = i64::from(horizon_days) * MINUTES_PER_DAY;
        if !hours.enforce {
            return Self {
                horizon_minutes,
                enforce: false,
                segments: vec![(0, horizon_minutes)],
            };
        }

        let start_mod = i64::from(schedule_start.hour()) * 60 + i64::from(schedule_start.minute());
        let work_start = i64::from(hours.work_start_hour) * 60;
        let work_end = i64::from(hours.work_end_hour) * 60;
        let lunch_start = i64::from(hours.lunch_start_hour) * 60;
        let lunch_end = lunch_start + i64::from(hours.lunch_duration_minutes);

        // Work window minus the lunch interval.
        let mut day_windows: Vec<(i64, i64)> = Vec::new();
        if lunch_end <= work_start || lunch_start >= work_end {
            day_windows.push((work_start, work_end));
        } else {
            if work_start < lunch_start {
                day_windows.push((work_start, lunch_start));
            }
            if lunch_end < work_end {
                day_windows.push((lunch_end, work_end));
            }
        }

        let mut segments = Vec::new();
        // One extra day on each side so windows that straddle offset 0 or the
        // horizon end are clipped rather than lost.
        let day_count = i64::from(horizon_days) + 2;
        for day in 0..day_count {
            // Wall day index relative to the schedule start day.
            let wall_day = day - 1;
            if hours.holiday_days.iter().any(|&h| i64::from(h) - 1 == wall_day) {
                continue;
            }
            for &(ws, we) in &day_windows {
                let seg_start = wall_day * MINUTES_PER_DAY + ws - start_mod;
                let seg_end = wall_day * MINUTES_PER_DAY + we - start_mod;
                let clipped = (seg_start.max(0), seg_end.min(horizon_minutes));
                if clipped.0 < clipped.1 {
                    segments.push(clipped);
                }
            }
        }
        segments.sort_unstable();
        segments.dedup();

        Self { horizon_minutes, enforce: true, segments }
    }

    /// Calendar that treats the whole horizon as attended.
    pub fn unrestricted(horizon_minutes: i64) -> Self {
        Self { horizon_minutes, enforce: false, segments: vec![(0, horizon_minutes)] }
    }

    pub const fn horizon_minutes(&self) -> i64 {
        self.horizon_minutes
    }

    pub const fn is_enforced(&self) -> bool {
        self.enforce
    }

    pub fn segments(&self) -> &[(i64, i64)] {
        &self.segments
    }

    /// Whether any attended work is possible at all.
    pub fn has_attended_capacity(&self) -> bool {
        self.segments.iter().any(|(s, e)| e > s)
    }

    /// Longest single attended segment.
    pub fn longest_segment(&self) -> i64 {
        self.segments.iter().map(|(s, e)| e - s).max().unwrap_or(0)
    }

    /// Whether `[start, start + len)` lies inside one attended segment.
    pub fn fits(&self, start: i64, len: i64) -> bool {
        if len == 0 {
            return start >= 0 && start <= self.horizon_minutes;
        }
        let idx = self.segments.partition_point(|&(_, e)| e < start + len);
        self.segments
            .get(idx)
            .is_some_and(|&(s, e)| s <= start && start + len <= e)
    }

    /// Earliest `t >= earliest` at which a span of `len` minutes fits inside
    /// a single attended segment.
    pub fn next_fit(&self, earliest: i64, len: i64) -> Option<i64> {
        if len == 0 {
            return (earliest <= self.horizon_minutes).then_some(earliest);
        }
        for &(s, e) in &self.segments {
            if e - s < len {
                continue;
            }
            let candidate = earliest.max(s);
            if candidate + len <= e {
                return Some(candidate);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn monday_8am() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()
    }

    fn hours_8_to_16() -> BusinessHours {
        BusinessHours {
            work_start_hour: 8,
            work_end_hour: 16,
            lunch_start_hour: 12,
            lunch_duration_minutes: 45,
            holiday_days: vec![],
            enforce: true,
        }
    }

    #[test]
    fn validation_rejects_inverted_hours() {
        let mut hours = hours_8_to_16();
        hours.work_end_hour = 8;
        let err = hours.validate(30).unwrap_err();
        assert_eq!(err.code(), "CONFIGURATION_ERROR");
    }

    #[test]
    fn validation_rejects_holiday_outside_horizon() {
        let mut hours = hours_8_to_16();
        hours.holiday_days = vec![31];
        let err = hours.validate(30).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        hours.holiday_days = vec![30];
        assert!(hours.validate(30).is_ok());
    }

    #[test]
    fn day_one_segments_from_8am_start() {
        let cal = BusinessCalendar::build(&hours_8_to_16(), 2, monday_8am());
        // Schedule starts exactly at work start: morning block is offset 0.
        assert!(cal.segments().contains(&(0, 240))); // 08:00-12:00
        assert!(cal.segments().contains(&(285, 480))); // 12:45-16:00
    }

    #[test]
    fn holiday_masks_whole_day() {
        let mut hours = hours_8_to_16();
        hours.holiday_days = vec![2]; // second horizon day
        let cal = BusinessCalendar::build(&hours, 3, monday_8am());
        let day2_morning = MINUTES_PER_DAY; // 08:00 next day, offset 1440
        assert!(!cal.fits(day2_morning, 60));
        // Day 3 still works.
        assert!(cal.fits(2 * MINUTES_PER_DAY, 60));
    }

    #[test]
    fn all_holidays_leave_no_capacity() {
        let mut hours = hours_8_to_16();
        hours.holiday_days = vec![1, 2];
        let cal = BusinessCalendar::build(&hours, 2, monday_8am());
        assert!(!cal.has_attended_capacity());
        assert_eq!(cal.next_fit(0, 30), None);
    }

    #[test]
    fn span_may_not_cross_lunch() {
        let cal = BusinessCalendar::build(&hours_8_to_16(), 1, monday_8am());
        // 11:30 + 60min would cross the 12:00 lunch.
        assert!(!cal.fits(210, 60));
        assert_eq!(cal.next_fit(210, 60), Some(285)); // resumes 12:45
    }

    #[test]
    fn unenforced_calendar_is_one_segment() {
        let mut hours = hours_8_to_16();
        hours.enforce = false;
        let cal = BusinessCalendar::build(&hours, 2, monday_8am());
        assert_eq!(cal.segments(), &[(0, 2 * MINUTES_PER_DAY)]);
        assert!(cal.fits(100, 1000));
    }

    #[test]
    fn zero_length_span_always_fits_inside_horizon() {
        let cal = BusinessCalendar::build(&hours_8_to_16(), 1, monday_8am());
        assert!(cal.fits(700, 0));
        assert_eq!(cal.next_fit(700, 0), Some(700));
    }

    #[test]
    fn next_fit_skips_too_short_segments() {
        let cal = BusinessCalendar::build(&hours_8_to_16(), 1, monday_8am());
        // Morning block is 240 minutes; a 250-minute span needs more. The
        // afternoon block (195 min) is too short as well on a 1-day horizon.
        assert_eq!(cal.next_fit(0, 250), None);
        assert_eq!(cal.longest_segment(), 240);
    }

    #[test]
    fn midnight_start_keeps_wall_alignment() {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();
        let cal = BusinessCalendar::build(&hours_8_to_16(), 1, start);
        // Work opens at offset 480 (08:00).
        assert_eq!(cal.next_fit(0, 60), Some(480));
    }
}
