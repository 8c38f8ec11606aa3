//! # Tidal Event Decoder
//!
//! The listener half of the decode. [`TidalEventDecoder`] receives
//! primitive parse events from the JSON adapter and assembles them into
//! [`TidalEvent`] records inside its own [`EventStore`].
//!
//! ## Session Lifecycle
//!
//! ```text
//!   start_document   reset store cursor/count, clear key and report
//!                    (fires before any input is examined)
//!   start_object     open a candidate record for the cursor slot
//!   key / value      fill the candidate from EventType, DateTime, Height
//!   end_object       commit the candidate (capacity policy in store.rs)
//!   end_document     publish the count
//! ```
//!
//! Objects and arrays nested inside a record are skipped: their keys and
//! values never reach the candidate, and they never open a record of their
//! own. Unknown keys are ignored so new API fields pass through harmlessly.
//!
//! ## Tolerant Decoding
//!
//! The decoder never fails. A non-numeric height becomes `0.0`, a short
//! timestamp parses with zeros for its missing fields, and an unrecognised
//! event type counts as low water. Each case is logged and tallied in the
//! [`DecodeReport`] so callers can see what was patched over.

use crate::event::TidalEvent;
use crate::listener::JsonListener;
use crate::store::{EventStore, MAX_EVENTS};
use crate::timestamp;
use crate::tokenizer::{self, TokenizeError};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

const HIGH_WATER: &str = "HighWater";
const LOW_WATER: &str = "LowWater";

/// What a new record starts from when its object omits a field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PartialRecordPolicy {
    /// Start from the slot's previous occupant, so missing fields keep
    /// whatever that record held. Matches deployed clients.
    #[default]
    RetainStale,
    /// Start from an all-zero record.
    Reset,
}

/// Tally of one decode session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeReport {
    /// Events published to the store
    pub events: usize,
    /// Records that overwrote the last slot after the store filled up
    pub dropped: usize,
    /// Heights that were not entirely numeric
    pub malformed_heights: usize,
    /// Timestamps shorter than `YYYY-MM-DDTHH:MM:SS`
    pub truncated_timestamps: usize,
    /// `EventType` values other than `HighWater`/`LowWater`
    pub unknown_event_types: usize,
    /// Records earlier than the record committed before them
    pub out_of_order: usize,
}

impl DecodeReport {
    /// True if any value had to be defaulted or any record reordered or dropped.
    pub fn has_warnings(&self) -> bool {
        self.dropped
            + self.malformed_heights
            + self.truncated_timestamps
            + self.unknown_event_types
            + self.out_of_order
            > 0
    }
}

/// Keys the decoder reacts to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Field {
    EventType,
    DateTime,
    Height,
    Other,
}

impl From<&str> for Field {
    fn from(key: &str) -> Self {
        match key {
            "EventType" => Field::EventType,
            "DateTime" => Field::DateTime,
            "Height" => Field::Height,
            _ => Field::Other,
        }
    }
}

/// Streaming decoder for the tidal events document.
///
/// One decoder owns one store and handles one session at a time; run
/// concurrent fetches with separate decoders.
#[derive(Clone, Debug)]
pub struct TidalEventDecoder<const N: usize = MAX_EVENTS> {
    store: EventStore<N>,
    policy: PartialRecordPolicy,
    current_key: Option<Field>,
    candidate: Option<TidalEvent>,
    /// Containers opened inside the current record and not yet closed
    nested: usize,
    report: DecodeReport,
}

impl<const N: usize> Default for TidalEventDecoder<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> TidalEventDecoder<N> {
    pub fn new() -> Self {
        Self::with_policy(PartialRecordPolicy::default())
    }

    pub fn with_policy(policy: PartialRecordPolicy) -> Self {
        Self {
            store: EventStore::new(),
            policy,
            current_key: None,
            candidate: None,
            nested: 0,
            report: DecodeReport::default(),
        }
    }

    pub fn policy(&self) -> PartialRecordPolicy {
        self.policy
    }

    /// Events from the last completed session.
    pub fn store(&self) -> &EventStore<N> {
        &self.store
    }

    /// Tally of the current or last session.
    pub fn report(&self) -> DecodeReport {
        self.report
    }

    /// Decode a complete document held in memory.
    ///
    /// The session starts before the bytes are examined, so on failure the
    /// store is always empty.
    ///
    /// # Errors
    /// Returns the adapter's error if `bytes` is not a well-formed document.
    pub fn decode_document(&mut self, bytes: &[u8]) -> Result<DecodeReport, TokenizeError> {
        tokenizer::parse_slice(bytes, self)?;
        Ok(self.report)
    }

    fn in_record_scope(&self) -> bool {
        self.candidate.is_some() && self.nested == 0
    }

    fn apply(&mut self, field: Field, value: &str) {
        let Some(record) = self.candidate.as_mut() else {
            return;
        };

        match field {
            Field::EventType => {
                record.is_high_tide = value == HIGH_WATER;
                if value != HIGH_WATER && value != LOW_WATER {
                    self.report.unknown_event_types += 1;
                    warn!(event_type = value, "unrecognised event type, treating as low water");
                }
            }
            Field::DateTime => {
                record.date_time = value.to_owned();
                record.timestamp = timestamp::parse(value);
                record.epoch_seconds = record.timestamp.epoch_seconds();
                if !timestamp::is_complete(value) {
                    self.report.truncated_timestamps += 1;
                    warn!(date_time = value, "truncated timestamp, missing fields set to zero");
                }
            }
            Field::Height => {
                let (height, clean) = parse_height(value);
                record.height_m = height;
                if !clean {
                    self.report.malformed_heights += 1;
                    warn!(height = value, parsed = height, "malformed height");
                }
            }
            Field::Other => {}
        }
    }

    fn commit_candidate(&mut self, record: TidalEvent) {
        if let Some(previous) = self.store.last_committed() {
            if record.epoch_seconds < previous.epoch_seconds {
                self.report.out_of_order += 1;
                warn!(
                    date_time = %record.date_time,
                    previous = %previous.date_time,
                    "event earlier than its predecessor"
                );
            }
        }

        let slot = self.store.commit(record);
        let dropped = self.store.overflowed();
        if dropped > 0 {
            debug!(slot, dropped, "store full, overwrote last slot");
        } else {
            debug!(slot, "committed event");
        }
    }
}

impl<const N: usize> JsonListener for TidalEventDecoder<N> {
    fn start_document(&mut self) {
        debug!("start document");
        self.store.reset();
        self.current_key = None;
        self.candidate = None;
        self.nested = 0;
        self.report = DecodeReport::default();
    }

    fn end_document(&mut self) {
        self.store.seal();
        self.report.events = self.store.count();
        self.report.dropped = self.store.overflowed();
        debug!(events = self.report.events, "end document");

        if self.report.dropped > 0 {
            warn!(
                capacity = N,
                dropped = self.report.dropped,
                "forecast larger than store, later events overwrote the last slot"
            );
        }
    }

    fn start_object(&mut self) {
        if self.candidate.is_some() {
            self.nested += 1;
            trace!(depth = self.nested, "skipping nested object");
            return;
        }

        debug!(slot = self.store.cursor(), "start object");
        let mut record = match self.policy {
            PartialRecordPolicy::RetainStale => self.store.slot_at_cursor().clone(),
            PartialRecordPolicy::Reset => TidalEvent::default(),
        };
        record.is_valid = true;
        self.candidate = Some(record);
        self.current_key = None;
    }

    fn end_object(&mut self) {
        if self.nested > 0 {
            self.nested -= 1;
            return;
        }
        debug!("end object");
        if let Some(record) = self.candidate.take() {
            self.commit_candidate(record);
        }
    }

    fn start_array(&mut self) {
        if self.candidate.is_some() {
            self.nested += 1;
        }
        trace!("start array");
    }

    fn end_array(&mut self) {
        if self.candidate.is_some() && self.nested > 0 {
            self.nested -= 1;
        }
        trace!("end array");
    }

    fn key(&mut self, key: &str) {
        if !self.in_record_scope() {
            return;
        }
        debug!(key, "key");
        self.current_key = Some(Field::from(key));
    }

    fn value(&mut self, value: &str) {
        if !self.in_record_scope() {
            return;
        }
        debug!(value, "value");
        if let Some(field) = self.current_key {
            self.apply(field, value);
        }
    }
}

/// C `atof` coercion: the longest numeric prefix, or `0.0`.
///
/// The flag is false when anything besides surrounding whitespace had to be
/// discarded, or when the result was not finite.
fn parse_height(text: &str) -> (f64, bool) {
    let trimmed = text.trim();
    let end = numeric_prefix_len(trimmed.as_bytes());
    match trimmed[..end].parse::<f64>() {
        Ok(height) if height.is_finite() => (height, end == trimmed.len()),
        _ => (0.0, false),
    }
}

fn numeric_prefix_len(bytes: &[u8]) -> usize {
    let digits_from = |mut i: usize| {
        while bytes.get(i).is_some_and(u8::is_ascii_digit) {
            i += 1;
        }
        i
    };

    let mut i = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        i += 1;
    }
    let int_end = digits_from(i);
    let mut mantissa_digits = int_end - i;
    i = int_end;

    if bytes.get(i) == Some(&b'.') {
        let frac_end = digits_from(i + 1);
        mantissa_digits += frac_end - (i + 1);
        i = frac_end;
    }
    if mantissa_digits == 0 {
        return 0;
    }

    if matches!(bytes.get(i), Some(b'e' | b'E')) {
        let mut j = i + 1;
        if matches!(bytes.get(j), Some(b'+' | b'-')) {
            j += 1;
        }
        let exp_end = digits_from(j);
        if exp_end > j {
            i = exp_end;
        }
    }
    i
}
