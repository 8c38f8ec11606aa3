//! # End-to-End Decode Tests
//!
//! Feed whole response bodies through the tokenizer and decoder, then check
//! the resulting store and the nearest-event queries. Bodies are shaped like
//! real Admiralty responses, including the fields the decoder ignores.

use admiralty_tides::decoder::{PartialRecordPolicy, TidalEventDecoder};
use admiralty_tides::listener::JsonListener;
use admiralty_tides::timestamp;
use admiralty_tides::tokenizer::{BodyBuffer, TokenizeError};
use admiralty_tides::{EventStore, MAX_EVENTS};

/// One event as the API sends it.
fn api_object(high: bool, date_time: &str, height: f64) -> String {
    let kind = if high { "HighWater" } else { "LowWater" };
    format!(
        r#"{{
    "EventType": "{kind}",
    "DateTime": "{date_time}",
    "IsApproximateTime": false,
    "Height": {height},
    "IsApproximateHeight": false,
    "Filtered": false,
    "Date": "{date}T00:00:00"
  }}"#,
        date = &date_time[..10]
    )
}

/// A forecast of `count` alternating tides, 6h 12m apart, from 2018-10-17.
fn forecast(count: usize) -> (String, Vec<(bool, String, f64)>) {
    let start = chrono::NaiveDate::from_ymd_opt(2018, 10, 17)
        .unwrap()
        .and_hms_opt(5, 2, 0)
        .unwrap();
    let events: Vec<(bool, String, f64)> = (0..count)
        .map(|i| {
            let at = start + chrono::Duration::minutes(372 * i as i64);
            let high = i % 2 == 0;
            let height = if high { 4.5 + i as f64 * 0.01 } else { 0.8 - i as f64 * 0.01 };
            (high, at.format("%Y-%m-%dT%H:%M:%S").to_string(), height)
        })
        .collect();
    let objects: Vec<String> = events
        .iter()
        .map(|(high, dt, h)| api_object(*high, dt, *h))
        .collect();
    (format!("[\n  {}\n]", objects.join(",\n  ")), events)
}

fn decode(body: &str) -> TidalEventDecoder {
    let mut decoder = TidalEventDecoder::new();
    decoder
        .decode_document(body.as_bytes())
        .expect("body should decode");
    decoder
}

/// Every event of a well-formed forecast comes back in order, field for field.
#[test]
fn full_forecast_round_trips() {
    let (body, expected) = forecast(12);
    let decoder = decode(&body);
    let store = decoder.store();

    assert_eq!(store.count(), expected.len());
    for (i, (high, date_time, height)) in expected.iter().enumerate() {
        let event = store.get(i).unwrap();
        assert!(event.is_valid, "event {i} should be valid");
        assert_eq!(event.is_high_tide, *high, "event {i} type");
        assert_eq!(&event.date_time, date_time);
        assert_eq!(event.timestamp, timestamp::parse(date_time));
        assert!(
            (event.height_m - height).abs() < 1e-6,
            "event {i} height {} != {height}",
            event.height_m
        );
    }
    assert!(store.is_chronological());
    assert!(!decoder.report().has_warnings());
}

/// An oversized forecast fills the store and keeps the final event last.
#[test]
fn oversized_forecast_is_clamped() {
    let (body, expected) = forecast(MAX_EVENTS + 5);
    let decoder = decode(&body);
    let store = decoder.store();

    assert_eq!(store.count(), MAX_EVENTS);
    assert_eq!(decoder.report().dropped, 5);

    let last_stored = store.get(MAX_EVENTS - 1).unwrap();
    let (_, last_input, _) = expected.last().unwrap();
    assert_eq!(&last_stored.date_time, last_input);

    // Everything before the last slot is untouched
    let (_, penultimate, _) = &expected[MAX_EVENTS - 2];
    assert_eq!(&store.get(MAX_EVENTS - 2).unwrap().date_time, penultimate);
}

/// Queries over events at epoch seconds 100, 200 and 300.
#[test]
fn queries_find_neighbouring_events() {
    let body = format!(
        "[{},{},{}]",
        api_object(true, "1970-01-01T00:01:40", 4.0),
        api_object(false, "1970-01-01T00:03:20", 1.0),
        api_object(true, "1970-01-01T00:05:00", 4.2),
    );
    let decoder = decode(&body);
    let store = decoder.store();
    let seconds: Vec<i64> = store.iter().map(|e| e.epoch_seconds).collect();
    assert_eq!(seconds, vec![100, 200, 300]);

    assert_eq!(store.previous_event(250).epoch_seconds, 200);
    assert_eq!(store.next_event(250).epoch_seconds, 300);
    assert!(!store.previous_event(50).is_valid);
    assert!(!store.next_event(350).is_valid);

    // An exact match satisfies both directions
    assert_eq!(store.previous_event(200).epoch_seconds, 200);
    assert_eq!(store.next_event(200).epoch_seconds, 200);
    assert_eq!(store.previous_event(200), store.next_event(200));
}

/// A short session after a long one exposes nothing from the long one.
#[test]
fn later_session_does_not_see_earlier_records() {
    let mut decoder: TidalEventDecoder = TidalEventDecoder::new();
    let (long_body, long_events) = forecast(10);
    decoder.decode_document(long_body.as_bytes()).unwrap();
    assert_eq!(decoder.store().count(), 10);

    let (short_body, short_events) = forecast(2);
    decoder.decode_document(short_body.as_bytes()).unwrap();
    let store = decoder.store();

    assert_eq!(store.count(), 2);
    assert_eq!(store.iter().count(), 2);

    // Querying past the short forecast must not reach the old slots 2..10
    let last = &long_events[9].1;
    let far = timestamp::parse(last).epoch_seconds() + 60;
    assert_eq!(store.previous_event(far).date_time, short_events[1].1);
    assert!(!store.next_event(far).is_valid);
}

/// Decoding the same body twice gives the same store.
#[test]
fn repeated_decode_is_stable() {
    let (body, _) = forecast(6);
    let mut decoder: TidalEventDecoder = TidalEventDecoder::new();
    decoder.decode_document(body.as_bytes()).unwrap();
    let first: Vec<_> = decoder.store().events().to_vec();

    decoder.decode_document(body.as_bytes()).unwrap();
    assert_eq!(decoder.store().events(), first.as_slice());
}

/// Events sharing an instant resolve to the lowest index in both directions.
#[test]
fn ties_resolve_to_first_event() {
    let body = format!(
        "[{},{},{},{}]",
        api_object(false, "2018-10-17T06:00:00", 0.5),
        api_object(true, "2018-10-17T12:00:00", 4.0),
        api_object(false, "2018-10-17T12:00:00", 1.0),
        api_object(true, "2018-10-17T18:00:00", 4.1),
    );
    let decoder = decode(&body);
    let store = decoder.store();
    let noon = store.get(1).unwrap().epoch_seconds;
    assert_eq!(store.get(2).unwrap().epoch_seconds, noon);

    let previous = store.previous_event(noon);
    let next = store.next_event(noon);
    assert!(previous.is_high_tide, "previous should be index 1");
    assert!(next.is_high_tide, "next should be index 1");
    assert_eq!(previous.height_m, 4.0);

    // Just after noon both tied events are behind us; still index 1
    assert_eq!(store.previous_event(noon + 1).height_m, 4.0);
}

/// Chunk boundaries do not change the decoded result.
#[test]
fn fragmentation_does_not_change_result() {
    let (body, _) = forecast(8);
    let expected = decode(&body).store().events().to_vec();

    for chunk_size in [1, 2, 3, 7, 13, 64, 511] {
        let mut decoder: TidalEventDecoder = TidalEventDecoder::new();
        let mut buffer = BodyBuffer::new();
        for chunk in body.as_bytes().chunks(chunk_size) {
            buffer.push(chunk).unwrap();
        }
        buffer.parse_into(&mut decoder).unwrap();
        assert_eq!(
            decoder.store().events(),
            expected.as_slice(),
            "chunk size {chunk_size}"
        );
    }
}

/// A rejected body replaces a good forecast with an empty one, never a mix.
#[test]
fn rejected_body_clears_previous_forecast() {
    let (good, _) = forecast(6);
    let (second, _) = forecast(3);
    let cut = &second.as_bytes()[..second.len() / 2];

    let mut decoder: TidalEventDecoder = TidalEventDecoder::new();
    decoder.decode_document(good.as_bytes()).unwrap();
    assert_eq!(decoder.store().count(), 6);

    assert_eq!(decoder.decode_document(cut), Err(TokenizeError::UnexpectedEnd));
    assert_eq!(decoder.store().count(), 0, "truncated body must not publish");

    decoder.decode_document(good.as_bytes()).unwrap();
    let err = decoder
        .decode_document(b"<html>maintenance</html>")
        .unwrap_err();
    assert!(matches!(err, TokenizeError::Malformed { .. }), "got {err:?}");
    assert_eq!(decoder.store().count(), 0, "markup body must not publish");
    assert!(!decoder.store().previous_event(i64::MAX).is_valid);
}

/// A body over the size cap is refused before any parsing.
#[test]
fn oversized_body_is_refused() {
    let mut buffer = BodyBuffer::with_limit(16);
    buffer.push(b"[{\"EventType\":").unwrap();
    assert_eq!(
        buffer.push(b"\"HighWater\"}]"),
        Err(TokenizeError::TooLarge { limit: 16 })
    );
}

/// Partial records follow the configured policy.
#[test]
fn partial_record_policies_differ_only_on_missing_fields() {
    let (first, _) = forecast(2);
    let partial = r#"[
        {"EventType":"HighWater","DateTime":"2018-10-20T01:00:00","Height":3.3},
        {"EventType":"LowWater","DateTime":"2018-10-20T07:10:00"}
    ]"#;

    let mut stale = TidalEventDecoder::<4>::with_policy(PartialRecordPolicy::RetainStale);
    let mut reset = TidalEventDecoder::<4>::with_policy(PartialRecordPolicy::Reset);
    for decoder in [&mut stale, &mut reset] {
        decoder.decode_document(first.as_bytes()).unwrap();
        decoder.decode_document(partial.as_bytes()).unwrap();
    }

    assert_eq!(stale.store().get(0), reset.store().get(0));
    // Slot 1 previously held the first forecast's low water (0.79 m)
    assert!((stale.store().get(1).unwrap().height_m - 0.79).abs() < 1e-6);
    assert_eq!(reset.store().get(1).unwrap().height_m, 0.0);
}

/// A decoder driven by hand sees the same result as one fed bytes.
#[test]
fn manual_callbacks_match_tokenized_input() {
    let mut decoder = TidalEventDecoder::<2>::new();
    decoder.start_document();
    decoder.start_array();
    decoder.start_object();
    decoder.key("EventType");
    decoder.value("HighWater");
    decoder.key("DateTime");
    decoder.value("2018-10-17T17:25:00");
    decoder.key("Height");
    decoder.value("4.52");
    decoder.end_object();
    decoder.end_array();
    decoder.end_document();

    let store: &EventStore<2> = decoder.store();
    assert_eq!(store.count(), 1);
    let event = store.get(0).unwrap();
    assert!(event.is_high_tide);
    assert_eq!(event.timestamp.minute, 25);
    assert!((event.height_m - 4.52).abs() < 1e-6);
}
