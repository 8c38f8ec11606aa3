//! # Admiralty Tides Core Library
//!
//! A client for the UK Admiralty tidal events API built for small,
//! memory-constrained hosts. The response body is capped in size and read
//! as JSON events straight into a fixed-capacity store, with no document
//! tree in between. Nearest-event queries are answered from that store.
//!
//! ## Data Flow
//!
//! ```text
//! body bytes ─▶ serde_json adapter ─▶ TidalEventDecoder ─▶ EventStore ─▶ queries
//!               (tokenizer.rs)        (decoder.rs)         (store.rs)    (query.rs)
//! ```
//!
//! 1. **Fetch**: [`client::AdmiraltyApiClient`] resolves the host, sends the
//!    request and collects the body in a [`tokenizer::BodyBuffer`]
//! 2. **Tokenize**: [`tokenizer::parse_slice`] (or [`tokenizer::parse_reader`]
//!    for cached files) turns the document into [`listener::JsonListener`]
//!    callbacks
//! 3. **Decode**: [`decoder::TidalEventDecoder`] builds [`TidalEvent`]s,
//!    parsing timestamps with [`timestamp::parse`]
//! 4. **Store**: [`store::EventStore`] keeps at most [`MAX_EVENTS`] events
//! 5. **Query**: `previous_event` / `next_event` find the tides either side
//!    of a given instant
//!
//! ## Memory Model
//! - **Fixed capacity**: the store is an array of [`MAX_EVENTS`] slots,
//!   reused for every fetch
//! - **Capacity drop**: events beyond the capacity overwrite the last slot
//!   instead of growing storage
//! - **Bounded input**: network bodies are refused past
//!   [`tokenizer::MAX_BODY_BYTES`], and cached files are streamed from disk
//!
//! # Example
//! ```
//! use admiralty_tides::decoder::TidalEventDecoder;
//!
//! let body = br#"[
//!     {"EventType": "HighWater", "DateTime": "2018-10-17T17:25:00", "Height": 4.52},
//!     {"EventType": "LowWater", "DateTime": "2018-10-17T23:41:00", "Height": 0.61}
//! ]"#;
//!
//! let mut decoder: TidalEventDecoder = TidalEventDecoder::new();
//! decoder.decode_document(body).unwrap();
//!
//! let store = decoder.store();
//! let first = store.get(0).unwrap();
//! let next = store.next_event(first.epoch_seconds + 60);
//! assert!(next.is_valid);
//! assert!(!next.is_high_tide);
//! ```

// Module declarations
pub mod cache;
pub mod client;
pub mod config;
pub mod decoder;
pub mod event;
pub mod listener;
pub mod query;
pub mod renderer;
pub mod store;
pub mod timestamp;
pub mod tokenizer;

pub use event::{duration_between, Elapsed, TidalEvent};
pub use store::{EventStore, MAX_EVENTS};
pub use timestamp::CalendarTime;
