//! # Forecast Terminal Rendering
//!
//! Renders the decoded forecast as an ASCII table for terminal output: one
//! row per event with a height bar, the upcoming event marked, and the
//! previous/next tide relative to a reference instant underneath.
//!
//! ```text
//! Newlyn (0113)
//! ──────────────────────────────────────────────────
//!   High  2018-10-17 17:25:00   4.52 m │████████████████████
//! ▶ Low   2018-10-17 23:41:00   0.61 m │█
//! ──────────────────────────────────────────────────
//! Previous: High 2018-10-17 17:25:00 (4.52 m), 1h 05m ago
//! Next:     Low  2018-10-17 23:41:00 (0.61 m), in 5h 11m
//! ```

use crate::event::TidalEvent;
use crate::store::EventStore;
use std::fmt::Write;

/// Width of the height bar for the highest tide in the forecast.
const BAR_WIDTH: usize = 20;
const RULE_WIDTH: usize = 50;

/// Render `store` as a table, with previous/next tide relative to `now`
/// (epoch seconds).
pub fn render_table<const N: usize>(
    store: &EventStore<N>,
    now: i64,
    title: &str,
    offline: bool,
) -> String {
    let mut out = String::new();
    let rule = "─".repeat(RULE_WIDTH);

    if offline {
        let _ = writeln!(out, "{title}  [offline: cached forecast]");
    } else {
        let _ = writeln!(out, "{title}");
    }
    let _ = writeln!(out, "{rule}");

    if store.is_empty() {
        let _ = writeln!(out, "No tidal events available");
        return out;
    }

    // Height bounds for bar scaling
    let (min_height, max_height) = store
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), event| {
            (min.min(event.height_m), max.max(event.height_m))
        });
    let range = max_height - min_height;
    let bar_for = |height: f64| {
        let scaled = if range > 0.0 {
            (height - min_height) / range
        } else {
            1.0
        };
        // At least one block so every row shows a bar
        1 + (scaled * (BAR_WIDTH - 1) as f64).round() as usize
    };

    let next = store.find_next(now);
    for event in store {
        let marker = match next {
            Some(upcoming) if std::ptr::eq(upcoming, event) => '▶',
            _ => ' ',
        };
        let _ = writeln!(
            out,
            "{marker} {:<4}  {}  {:>5.2} m │{}",
            event.kind(),
            event.timestamp,
            event.height_m,
            "█".repeat(bar_for(event.height_m))
        );
    }
    let _ = writeln!(out, "{rule}");

    let previous = store.previous_event(now);
    let next = store.next_event(now);
    let _ = writeln!(out, "Previous: {}", describe(&previous, now, "ago", false));
    let _ = writeln!(out, "Next:     {}", describe(&next, now, "in", true));
    out
}

fn describe(event: &TidalEvent, now: i64, word: &str, word_first: bool) -> String {
    if !event.is_valid {
        return "none in forecast".to_string();
    }
    let elapsed = event.time_from(now);
    let when = if word_first {
        format!("{word} {elapsed}")
    } else {
        format!("{elapsed} {word}")
    };
    format!(
        "{:<4} {} ({:.2} m), {when}",
        event.kind(),
        event.timestamp,
        event.height_m
    )
}

/// Print the forecast table to stdout.
pub fn draw_ascii<const N: usize>(store: &EventStore<N>, now: i64, title: &str, offline: bool) {
    print!("{}", render_table(store, now, title, offline));
}
