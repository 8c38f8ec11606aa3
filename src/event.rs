//! # Tidal Event Records
//!
//! One [`TidalEvent`] is one predicted high or low water. Records decoded
//! from a document always have `is_valid == true`; the query functions hand
//! back [`TidalEvent::invalid`] when nothing matches, so callers must check
//! validity before using a returned record.

use crate::timestamp::CalendarTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single high or low water prediction.
///
/// Memory layout is fixed apart from the raw `date_time` text, which keeps
/// the API's original string for display and debugging.
///
/// # Example
/// ```
/// use admiralty_tides::TidalEvent;
///
/// let missing = TidalEvent::invalid();
/// assert!(!missing.is_valid);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TidalEvent {
    /// False for the "not found" sentinel returned by queries
    pub is_valid: bool,
    /// True for high water, false for low water
    pub is_high_tide: bool,
    /// Timestamp exactly as delivered by the API (GMT)
    pub date_time: String,
    /// Parsed form of `date_time`
    pub timestamp: CalendarTime,
    /// Ordering key derived from `timestamp`
    pub epoch_seconds: i64,
    /// Predicted height in metres
    pub height_m: f64,
}

impl TidalEvent {
    /// The sentinel returned when a query finds no matching event.
    pub fn invalid() -> Self {
        Self::default()
    }

    /// Label used by the renderer and logs.
    pub fn kind(&self) -> &'static str {
        if self.is_high_tide {
            "High"
        } else {
            "Low"
        }
    }

    /// Hours and minutes between this event and `time` (epoch seconds).
    pub fn time_from(&self, time: i64) -> Elapsed {
        duration_between(self.epoch_seconds, time)
    }
}

/// Absolute elapsed time between two instants, split into hours and minutes.
///
/// Leftover seconds are truncated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Elapsed {
    pub hours: u64,
    pub minutes: u64,
}

impl fmt::Display for Elapsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}h {:02}m", self.hours, self.minutes)
    }
}

/// Split the distance between `event_time` and `query_time` into hours and minutes.
///
/// Order of the arguments does not matter; the caller already knows whether
/// the event lies before or after the query instant.
pub fn duration_between(event_time: i64, query_time: i64) -> Elapsed {
    let seconds = event_time.abs_diff(query_time);
    Elapsed {
        hours: seconds / 3_600,
        minutes: (seconds % 3_600) / 60,
    }
}
