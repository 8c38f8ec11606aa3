//! # Fixed-Layout Timestamp Parsing
//!
//! The Admiralty API reports event times as ISO 8601 style strings in GMT:
//!
//! ```text
//! 2018-10-17T17:25:00
//! 2018-10-17T17:25:00.123
//! ```
//!
//! Extraction is purely positional. Each field is read from a fixed byte
//! range and converted with C `atol` semantics:
//!
//! | Field  | Range      |
//! |--------|------------|
//! | year   | `[0, 4)`   |
//! | month  | `[5, 7)`   |
//! | day    | `[8, 10)`  |
//! | hour   | `[11, 13)` |
//! | minute | `[14, 16)` |
//! | second | `[17, 19)` |
//!
//! Separators, field ranges and overall length are not validated. Anything
//! after offset 19 (fractional seconds, zone suffix) is ignored. Ranges that
//! run past the end of a short string are clamped to its length, so a
//! truncated timestamp parses with zeros for the missing fields.
//!
//! Malformed input never fails: it produces a deterministic value that
//! callers can range-check with [`CalendarTime::is_plausible`].

use chrono::{Months, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of the `YYYY-MM-DDTHH:MM:SS` prefix every complete timestamp has.
pub const TIMESTAMP_LEN: usize = 19;

const YEAR: (usize, usize) = (0, 4);
const MONTH: (usize, usize) = (5, 7);
const DAY: (usize, usize) = (8, 10);
const HOUR: (usize, usize) = (11, 13);
const MINUTE: (usize, usize) = (14, 16);
const SECOND: (usize, usize) = (17, 19);

/// Broken-down wall-clock time as reported by the API.
///
/// Fields are signed so that garbage input (for example a `-1` in the month
/// columns) survives parsing unchanged instead of wrapping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CalendarTime {
    /// Full calendar year (e.g. 2018)
    pub year: i32,
    /// Month of year, 1 = January
    pub month: i32,
    /// Day of month, starting at 1
    pub day: i32,
    pub hour: i32,
    pub minute: i32,
    pub second: i32,
}

impl CalendarTime {
    /// True when every field lies in its calendar range and the date exists.
    pub fn is_plausible(&self) -> bool {
        self.to_naive().is_some()
    }

    /// Convert to a `chrono` value if the fields form a real date and time.
    pub fn to_naive(&self) -> Option<NaiveDateTime> {
        let month = u32::try_from(self.month).ok()?;
        let day = u32::try_from(self.day).ok()?;
        let hour = u32::try_from(self.hour).ok()?;
        let minute = u32::try_from(self.minute).ok()?;
        let second = u32::try_from(self.second).ok()?;
        NaiveDate::from_ymd_opt(self.year, month, day)?.and_hms_opt(hour, minute, second)
    }

    /// Seconds since 1970-01-01T00:00:00 on the API's reference time scale.
    ///
    /// Out-of-range fields are normalised arithmetically: month 13 is January
    /// of the following year, day 0 is the last day of the previous month, and
    /// hours, minutes and seconds are simply multiplied out. The result is
    /// therefore always defined and monotonic in each field.
    pub fn epoch_seconds(&self) -> i64 {
        let days = epoch_days(self.year, self.month, self.day).unwrap_or(0);
        days * 86_400
            + i64::from(self.hour) * 3_600
            + i64::from(self.minute) * 60
            + i64::from(self.second)
    }
}

impl fmt::Display for CalendarTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

/// Parse a `YYYY-MM-DDTHH:MM:SS[...]` timestamp.
///
/// # Example
/// ```
/// use admiralty_tides::timestamp::parse;
///
/// let tm = parse("2018-10-17T17:25:00");
/// assert_eq!((tm.year, tm.month, tm.day), (2018, 10, 17));
/// assert_eq!((tm.hour, tm.minute, tm.second), (17, 25, 0));
/// ```
pub fn parse(text: &str) -> CalendarTime {
    let bytes = text.as_bytes();
    CalendarTime {
        year: field(bytes, YEAR),
        month: field(bytes, MONTH),
        day: field(bytes, DAY),
        hour: field(bytes, HOUR),
        minute: field(bytes, MINUTE),
        second: field(bytes, SECOND),
    }
}

/// True if `text` is long enough to contain every field.
pub fn is_complete(text: &str) -> bool {
    text.len() >= TIMESTAMP_LEN
}

fn field(bytes: &[u8], (start, end): (usize, usize)) -> i32 {
    let end = end.min(bytes.len());
    let start = start.min(end);
    leading_int(&bytes[start..end])
}

/// C `atol`: optional whitespace, optional sign, then as many digits as follow.
fn leading_int(bytes: &[u8]) -> i32 {
    let mut rest = bytes;
    while let [b, tail @ ..] = rest {
        if !b.is_ascii_whitespace() {
            break;
        }
        rest = tail;
    }

    let negative = match rest.first() {
        Some(b'-') => {
            rest = &rest[1..];
            true
        }
        Some(b'+') => {
            rest = &rest[1..];
            false
        }
        _ => false,
    };

    // At most four digits reach here, so this cannot overflow
    let value = rest
        .iter()
        .take_while(|b| b.is_ascii_digit())
        .fold(0i32, |acc, b| acc * 10 + i32::from(b - b'0'));

    if negative {
        -value
    } else {
        value
    }
}

fn epoch_days(year: i32, month: i32, day: i32) -> Option<i64> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
    let jan_first = NaiveDate::from_ymd_opt(year, 1, 1)?;

    let month_offset = month - 1;
    let month_start = if month_offset >= 0 {
        jan_first.checked_add_months(Months::new(month_offset.unsigned_abs()))?
    } else {
        jan_first.checked_sub_months(Months::new(month_offset.unsigned_abs()))?
    };

    let days = (month_start - epoch).num_days();
    Some(days + i64::from(day) - 1)
}
