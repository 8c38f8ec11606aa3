//! # Temporal Queries
//!
//! Nearest-event lookups over a populated [`EventStore`]. Events are stored
//! in the order the API delivers them, which is chronological, so both
//! lookups are binary searches over `epoch_seconds`.
//!
//! - [`EventStore::find_previous`]: latest event at or before `t`
//! - [`EventStore::find_next`]: earliest event at or after `t`
//!
//! An event exactly at `t` satisfies both. When several events share the
//! matching instant the lowest-indexed one wins. The `*_event` variants
//! return [`TidalEvent::invalid`] instead of `None`.

use crate::event::TidalEvent;
use crate::store::EventStore;

impl<const N: usize> EventStore<N> {
    /// The latest event with `epoch_seconds <= time`.
    pub fn find_previous(&self, time: i64) -> Option<&TidalEvent> {
        let events = self.events();
        let end = events.partition_point(|e| e.epoch_seconds <= time);
        let latest = events[..end].last()?.epoch_seconds;
        // Step back to the first of any events sharing that instant
        let first = events[..end].partition_point(|e| e.epoch_seconds < latest);
        events.get(first)
    }

    /// The earliest event with `epoch_seconds >= time`.
    pub fn find_next(&self, time: i64) -> Option<&TidalEvent> {
        let events = self.events();
        events.get(events.partition_point(|e| e.epoch_seconds < time))
    }

    /// Like [`find_previous`](Self::find_previous), returning the invalid
    /// sentinel when `time` precedes every event.
    pub fn previous_event(&self, time: i64) -> TidalEvent {
        self.find_previous(time)
            .cloned()
            .unwrap_or_else(TidalEvent::invalid)
    }

    /// Like [`find_next`](Self::find_next), returning the invalid sentinel
    /// when `time` follows every event.
    pub fn next_event(&self, time: i64) -> TidalEvent {
        self.find_next(time)
            .cloned()
            .unwrap_or_else(TidalEvent::invalid)
    }

    /// True if every published event is at or after its predecessor.
    pub fn is_chronological(&self) -> bool {
        self.events()
            .windows(2)
            .all(|w| w[0].epoch_seconds <= w[1].epoch_seconds)
    }
}
