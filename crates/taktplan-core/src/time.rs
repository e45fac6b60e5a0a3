//! Working-time value objects: [`Duration`] and [`TimeWindow`].
//!
//! All solver arithmetic runs in whole minutes. `Duration` is a non-negative
//! minute count closed under addition; `TimeWindow` is either an absolute
//! instant pair or a relative minutes-of-day pair. The two window flavours
//! never mix: combining them is an error, not a coercion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minutes in a calendar day.
pub const MINUTES_PER_DAY: i64 = 24 * 60;

/// A non-negative span of time with minute granularity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Duration {
    minutes: i64,
}

impl Duration {
    pub const fn zero() -> Self {
        Self { minutes: 0 }
    }

    /// Build from minutes; negative input clamps to zero.
    pub fn minutes(m: i64) -> Self {
        Self { minutes: m.max(0) }
    }

    pub fn hours(h: i64) -> Self {
        Self::minutes(h * 60)
    }

    pub fn days(d: i64) -> Self {
        Self::minutes(d * MINUTES_PER_DAY)
    }

    pub const fn as_minutes(&self) -> i64 {
        self.minutes
    }

    pub fn as_hours(&self) -> f64 {
        self.minutes as f64 / 60.0
    }

    pub fn as_days(&self) -> f64 {
        self.minutes as f64 / MINUTES_PER_DAY as f64
    }

    pub const fn is_zero(&self) -> bool {
        self.minutes == 0
    }

    /// Subtraction that refuses to go negative.
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        if rhs.minutes > self.minutes {
            None
        } else {
            Some(Self { minutes: self.minutes - rhs.minutes })
        }
    }
}

impl std::ops::Add for Duration {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self { minutes: self.minutes + rhs.minutes }
    }
}

impl std::iter::Sum for Duration {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, d| acc + d)
    }
}

impl std::fmt::Display for Duration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}min", self.minutes)
    }
}

/// Errors raised by [`TimeWindow`] construction and combination.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeWindowError {
    #[error("window start must precede its end")]
    EmptyWindow,

    #[error("relative window minutes must lie within a single day (0..=1440)")]
    OutOfDay,

    #[error("cannot combine an absolute window with a relative one")]
    MixedKinds,

    #[error("shift or extension would push the window outside its valid range")]
    OutOfRange,
}

/// A half-open `[start, end)` span of time.
///
/// `Absolute` windows are anchored to instants (a planning horizon, a
/// maintenance slot); `Relative` windows repeat daily in minutes from
/// midnight (an operator shift, a lunch break).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeWindow {
    Absolute {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    Relative {
        start_minute: u16,
        end_minute: u16,
    },
}

impl TimeWindow {
    pub fn absolute(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, TimeWindowError> {
        if start >= end {
            return Err(TimeWindowError::EmptyWindow);
        }
        Ok(Self::Absolute { start, end })
    }

    pub fn relative(start_minute: u16, end_minute: u16) -> Result<Self, TimeWindowError> {
        if start_minute >= end_minute {
            return Err(TimeWindowError::EmptyWindow);
        }
        if end_minute > MINUTES_PER_DAY as u16 {
            return Err(TimeWindowError::OutOfDay);
        }
        Ok(Self::Relative { start_minute, end_minute })
    }

    pub fn duration(&self) -> Duration {
        match self {
            Self::Absolute { start, end } => Duration::minutes((*end - *start).num_minutes()),
            Self::Relative { start_minute, end_minute } => {
                Duration::minutes(i64::from(*end_minute) - i64::from(*start_minute))
            }
        }
    }

    fn bounds_minutes(&self) -> Option<(i64, i64)> {
        match self {
            Self::Relative { start_minute, end_minute } => {
                Some((i64::from(*start_minute), i64::from(*end_minute)))
            }
            Self::Absolute { .. } => None,
        }
    }

    fn same_kind(&self, other: &Self) -> Result<(), TimeWindowError> {
        match (self, other) {
            (Self::Absolute { .. }, Self::Absolute { .. })
            | (Self::Relative { .. }, Self::Relative { .. }) => Ok(()),
            _ => Err(TimeWindowError::MixedKinds),
        }
    }

    pub fn overlaps(&self, other: &Self) -> Result<bool, TimeWindowError> {
        self.same_kind(other)?;
        Ok(match (self, other) {
            (Self::Absolute { start: s1, end: e1 }, Self::Absolute { start: s2, end: e2 }) => {
                s1 < e2 && s2 < e1
            }
            _ => {
                let (s1, e1) = self.bounds_minutes().unwrap_or_default();
                let (s2, e2) = other.bounds_minutes().unwrap_or_default();
                s1 < e2 && s2 < e1
            }
        })
    }

    /// Overlapping region of two windows of the same kind, if any.
    pub fn intersection(&self, other: &Self) -> Result<Option<Self>, TimeWindowError> {
        if !self.overlaps(other)? {
            return Ok(None);
        }
        Ok(Some(match (self, other) {
            (Self::Absolute { start: s1, end: e1 }, Self::Absolute { start: s2, end: e2 }) => {
                Self::Absolute { start: (*s1).max(*s2), end: (*e1).min(*e2) }
            }
            (Self::Relative { start_minute: s1, end_minute: e1 },
             Self::Relative { start_minute: s2, end_minute: e2 }) => {
                Self::Relative { start_minute: (*s1).max(*s2), end_minute: (*e1).min(*e2) }
            }
            _ => unreachable!("overlaps already rejected mixed kinds"),
        }))
    }

    /// Smallest window covering both, when they overlap or touch.
    pub fn union(&self, other: &Self) -> Result<Option<Self>, TimeWindowError> {
        self.same_kind(other)?;
        Ok(match (self, other) {
            (Self::Absolute { start: s1, end: e1 }, Self::Absolute { start: s2, end: e2 }) => {
                if s1 <= e2 && s2 <= e1 {
                    Some(Self::Absolute { start: (*s1).min(*s2), end: (*e1).max(*e2) })
                } else {
                    None
                }
            }
            (Self::Relative { start_minute: s1, end_minute: e1 },
             Self::Relative { start_minute: s2, end_minute: e2 }) => {
                if s1 <= e2 && s2 <= e1 {
                    Some(Self::Relative { start_minute: (*s1).min(*s2), end_minute: (*e1).max(*e2) })
                } else {
                    None
                }
            }
            _ => unreachable!("same_kind already rejected mixed kinds"),
        })
    }

    pub fn contains(&self, other: &Self) -> Result<bool, TimeWindowError> {
        self.same_kind(other)?;
        Ok(match (self, other) {
            (Self::Absolute { start: s1, end: e1 }, Self::Absolute { start: s2, end: e2 }) => {
                s1 <= s2 && e2 <= e1
            }
            _ => {
                let (s1, e1) = self.bounds_minutes().unwrap_or_default();
                let (s2, e2) = other.bounds_minutes().unwrap_or_default();
                s1 <= s2 && e2 <= e1
            }
        })
    }

    pub fn contains_instant(&self, at: DateTime<Utc>) -> bool {
        match self {
            Self::Absolute { start, end } => *start <= at && at < *end,
            Self::Relative { .. } => false,
        }
    }

    /// Translate the whole window by `minutes` (negative shifts left).
    pub fn shift_by_minutes(&self, minutes: i64) -> Result<Self, TimeWindowError> {
        match self {
            Self::Absolute { start, end } => Ok(Self::Absolute {
                start: *start + chrono::Duration::minutes(minutes),
                end: *end + chrono::Duration::minutes(minutes),
            }),
            Self::Relative { start_minute, end_minute } => {
                let s = i64::from(*start_minute) + minutes;
                let e = i64::from(*end_minute) + minutes;
                if s < 0 || e > MINUTES_PER_DAY {
                    return Err(TimeWindowError::OutOfRange);
                }
                Ok(Self::Relative { start_minute: s as u16, end_minute: e as u16 })
            }
        }
    }

    /// Move only the end of the window by `minutes` (negative shrinks).
    pub fn extend_by_minutes(&self, minutes: i64) -> Result<Self, TimeWindowError> {
        match self {
            Self::Absolute { start, end } => {
                let new_end = *end + chrono::Duration::minutes(minutes);
                if new_end <= *start {
                    return Err(TimeWindowError::EmptyWindow);
                }
                Ok(Self::Absolute { start: *start, end: new_end })
            }
            Self::Relative { start_minute, end_minute } => {
                let e = i64::from(*end_minute) + minutes;
                if e <= i64::from(*start_minute) {
                    return Err(TimeWindowError::EmptyWindow);
                }
                if e > MINUTES_PER_DAY {
                    return Err(TimeWindowError::OutOfRange);
                }
                Ok(Self::Relative { start_minute: *start_minute, end_minute: e as u16 })
            }
        }
    }
}
