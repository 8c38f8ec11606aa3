//! # Bounded Event Store
//!
//! Fixed-capacity, append-only storage for one decoded forecast. The backing
//! array is allocated once and reused for every fetch cycle, so memory use
//! never grows with the size of the API response.
//!
//! ## Capacity Policy
//!
//! Records are written at a cursor that advances after each commit until it
//! reaches the last slot. From then on every further commit overwrites that
//! last slot, so an oversized forecast keeps its first `N - 1` events plus
//! the most recent one. Nothing is reported as an error; the number of
//! overwritten records is available from [`EventStore::overflowed`].
//!
//! The published [`EventStore::count`] only changes when a decode session
//! is sealed, so readers never observe a half-populated forecast count.

use crate::event::TidalEvent;

/// Number of tidal events kept per forecast.
///
/// Seven days of semidiurnal tides is roughly 28 events, so this covers the
/// longest horizon the API serves.
pub const MAX_EVENTS: usize = 30;

/// Append-only sequence of at most `N` events in source order.
#[derive(Clone, Debug)]
pub struct EventStore<const N: usize = MAX_EVENTS> {
    slots: [TidalEvent; N],
    cursor: usize,
    committed: usize,
    count: usize,
}

impl<const N: usize> Default for EventStore<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> EventStore<N> {
    const NON_EMPTY: () = assert!(N > 0, "EventStore capacity must be at least one");

    pub fn new() -> Self {
        let () = Self::NON_EMPTY;
        Self {
            slots: std::array::from_fn(|_| TidalEvent::default()),
            cursor: 0,
            committed: 0,
            count: 0,
        }
    }

    /// Maximum number of events this store can hold.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Start a new decode session. Slot contents are left in place.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.committed = 0;
        self.count = 0;
    }

    /// Index of the slot the next commit will write.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// The record currently occupying the cursor slot.
    pub fn slot_at_cursor(&self) -> &TidalEvent {
        &self.slots[self.cursor]
    }

    /// Write `record` at the cursor and return the slot it landed in.
    ///
    /// The cursor advances unless it is already on the last slot.
    pub fn commit(&mut self, record: TidalEvent) -> usize {
        let slot = self.cursor;
        self.slots[slot] = record;
        self.committed += 1;
        if self.cursor < N - 1 {
            self.cursor += 1;
        }
        slot
    }

    /// The most recently committed record in this session.
    pub fn last_committed(&self) -> Option<&TidalEvent> {
        match self.committed {
            0 => None,
            n if n >= N => Some(&self.slots[N - 1]),
            n => Some(&self.slots[n - 1]),
        }
    }

    /// Publish the session's records: `count` becomes the number committed,
    /// clamped to the capacity.
    pub fn seal(&mut self) {
        self.count = self.committed.min(N);
    }

    /// Records committed in this session beyond the capacity.
    pub fn overflowed(&self) -> usize {
        self.committed.saturating_sub(N)
    }

    /// Number of events published by the last completed session.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Event at `index`, or `None` if `index >= count()`.
    pub fn get(&self, index: usize) -> Option<&TidalEvent> {
        self.events().get(index)
    }

    /// The published events in chronological order.
    pub fn events(&self) -> &[TidalEvent] {
        &self.slots[..self.count]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TidalEvent> {
        self.events().iter()
    }
}

impl<'a, const N: usize> IntoIterator for &'a EventStore<N> {
    type Item = &'a TidalEvent;
    type IntoIter = std::slice::Iter<'a, TidalEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(epoch_seconds: i64) -> TidalEvent {
        TidalEvent {
            is_valid: true,
            epoch_seconds,
            ..TidalEvent::default()
        }
    }

    fn filled<const N: usize>(epochs: &[i64]) -> EventStore<N> {
        let mut store = EventStore::<N>::new();
        for &epoch in epochs {
            store.commit(event(epoch));
        }
        store.seal();
        store
    }

    #[test]
    fn new_store_is_empty() {
        let store: EventStore = EventStore::new();
        assert_eq!(store.capacity(), MAX_EVENTS);
        assert_eq!(store.count(), 0);
        assert!(store.is_empty());
        assert!(store.get(0).is_none());
        assert!(store.last_committed().is_none());
    }

    #[test]
    fn commit_advances_cursor() {
        let mut store = EventStore::<4>::new();
        assert_eq!(store.commit(event(1)), 0);
        assert_eq!(store.commit(event(2)), 1);
        assert_eq!(store.cursor(), 2);
        assert_eq!(store.last_committed().unwrap().epoch_seconds, 2);
    }

    #[test]
    fn count_is_published_on_seal() {
        let mut store = EventStore::<4>::new();
        store.commit(event(1));
        store.commit(event(2));
        assert_eq!(store.count(), 0);

        store.seal();
        assert_eq!(store.count(), 2);
        assert_eq!(store.get(1).unwrap().epoch_seconds, 2);
        assert!(store.get(2).is_none());
    }

    #[test]
    fn exactly_full_store_counts_every_event() {
        let store = filled::<3>(&[1, 2, 3]);
        assert_eq!(store.count(), 3);
        assert_eq!(store.overflowed(), 0);
    }

    #[test]
    fn overflow_overwrites_last_slot() {
        let store = filled::<3>(&[1, 2, 3, 4, 5]);
        assert_eq!(store.count(), 3);
        assert_eq!(store.overflowed(), 2);

        let epochs: Vec<i64> = store.iter().map(|e| e.epoch_seconds).collect();
        assert_eq!(epochs, vec![1, 2, 5]);
        assert_eq!(store.cursor(), 2);
        assert_eq!(store.last_committed().unwrap().epoch_seconds, 5);
    }

    #[test]
    fn reset_hides_previous_session() {
        let mut store = filled::<4>(&[1, 2, 3, 4]);
        store.reset();
        assert_eq!(store.count(), 0);
        assert_eq!(store.cursor(), 0);

        store.commit(event(10));
        store.seal();
        assert_eq!(store.events().len(), 1);
        assert_eq!(store.events()[0].epoch_seconds, 10);

        // Slot contents survive a reset
        store.reset();
        assert_eq!(store.slot_at_cursor().epoch_seconds, 10);
    }

    #[test]
    fn single_slot_store() {
        let store = filled::<1>(&[7, 8, 9]);
        assert_eq!(store.count(), 1);
        assert_eq!(store.events()[0].epoch_seconds, 9);
    }
}
