//! # JSON Event Adapter
//!
//! Drives a [`JsonListener`] from `serde_json`. A [`DeserializeSeed`] walks
//! the document with `deserialize_any` and turns every container boundary,
//! key and scalar into the matching callback, so no intermediate
//! `serde_json::Value` tree is built.
//!
//! ```text
//!   bytes ──▶ serde_json::Deserializer ──▶ Document / Node / Key seeds ──▶ JsonListener
//! ```
//!
//! Two entry points:
//! - [`parse_reader`] pulls from any [`Read`] (the cache replays files this way)
//! - [`parse_slice`] parses a complete buffer; network bodies are collected
//!   chunk by chunk in a size-capped [`BodyBuffer`] first
//!
//! ## Session Boundaries
//!
//! `start_document` fires before any input is examined, so every attempt
//! starts a fresh listener session whether or not the bytes turn out to be
//! JSON. `end_document` fires only after the whole input, trailing
//! whitespace included, has been accepted. A failed parse therefore never
//! publishes anything.
//!
//! Only an object or array may form the outer document. A leading UTF-8 BOM
//! is skipped. Scalars reach [`JsonListener::value`] as text: strings
//! unescaped, numbers in canonical form (`-0.1e1` arrives as `-1`), and the
//! literals as `true`, `false` and `null`.

use crate::listener::JsonListener;
use serde::de::{self, DeserializeSeed, Deserializer, MapAccess, SeqAccess, Visitor};
use serde_json::error::Category;
use std::fmt;
use std::io::{BufRead, BufReader, Read};
use thiserror::Error;

/// Largest response body accepted into a [`BodyBuffer`].
///
/// A seven day forecast is around 6 KiB.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Errors raised while reading a response body as JSON.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenizeError {
    /// Syntax error, or a scalar where the outer object or array belongs
    #[error("malformed JSON: {message}")]
    Malformed {
        line: usize,
        column: usize,
        message: String,
    },

    /// Input ended before the outer container closed
    #[error("unexpected end of input")]
    UnexpectedEnd,

    #[error("body larger than {limit} bytes")]
    TooLarge { limit: usize },

    /// The underlying reader failed
    #[error("reading body: {0}")]
    Io(String),
}

impl From<serde_json::Error> for TokenizeError {
    fn from(err: serde_json::Error) -> Self {
        match err.classify() {
            Category::Eof => TokenizeError::UnexpectedEnd,
            Category::Io => TokenizeError::Io(err.to_string()),
            Category::Syntax | Category::Data => TokenizeError::Malformed {
                line: err.line(),
                column: err.column(),
                message: err.to_string(),
            },
        }
    }
}

/// Parse a complete document held in memory.
///
/// # Errors
/// See [`TokenizeError`]. The listener has seen `start_document` even when
/// this fails.
pub fn parse_slice<L: JsonListener>(bytes: &[u8], listener: &mut L) -> Result<(), TokenizeError> {
    let bytes = bytes.strip_prefix(&UTF8_BOM).unwrap_or(bytes);
    drive(serde_json::Deserializer::from_slice(bytes), listener)
}

/// Parse a document pulled from `reader`.
///
/// # Errors
/// See [`TokenizeError`]. The listener has seen `start_document` even when
/// this fails.
pub fn parse_reader<R: Read, L: JsonListener>(
    reader: R,
    listener: &mut L,
) -> Result<(), TokenizeError> {
    let mut reader = BufReader::new(reader);
    let has_bom = match reader.fill_buf() {
        Ok(head) => head.starts_with(&UTF8_BOM),
        Err(err) => {
            listener.start_document();
            return Err(TokenizeError::Io(err.to_string()));
        }
    };
    if has_bom {
        reader.consume(UTF8_BOM.len());
    }
    drive(serde_json::Deserializer::from_reader(reader), listener)
}

fn drive<'de, R, L>(mut de: serde_json::Deserializer<R>, listener: &mut L) -> Result<(), TokenizeError>
where
    R: serde_json::de::Read<'de>,
    L: JsonListener,
{
    listener.start_document();
    Document {
        listener: &mut *listener,
    }
    .deserialize(&mut de)?;
    de.end()?;
    listener.end_document();
    Ok(())
}

/// Response body collected from transport chunks.
///
/// # Example
/// ```
/// use admiralty_tides::decoder::TidalEventDecoder;
/// use admiralty_tides::tokenizer::BodyBuffer;
///
/// let mut decoder: TidalEventDecoder = TidalEventDecoder::new();
/// let mut body = BodyBuffer::new();
///
/// // Chunk boundaries can fall anywhere, even inside a token
/// body.push(br#"[{"EventType":"High"#).unwrap();
/// body.push(br#"Water","Height":4.2}]"#).unwrap();
/// body.parse_into(&mut decoder).unwrap();
///
/// assert_eq!(decoder.store().count(), 1);
/// ```
#[derive(Debug)]
pub struct BodyBuffer {
    bytes: Vec<u8>,
    limit: usize,
}

impl Default for BodyBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl BodyBuffer {
    pub fn new() -> Self {
        Self::with_limit(MAX_BODY_BYTES)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(limit.min(8 * 1024)),
            limit,
        }
    }

    /// Append the next transport chunk.
    ///
    /// # Errors
    /// [`TokenizeError::TooLarge`] once the body would exceed the limit.
    pub fn push(&mut self, chunk: &[u8]) -> Result<(), TokenizeError> {
        if self.bytes.len() + chunk.len() > self.limit {
            return Err(TokenizeError::TooLarge { limit: self.limit });
        }
        self.bytes.extend_from_slice(chunk);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Parse the collected body into `listener`.
    ///
    /// # Errors
    /// See [`parse_slice`].
    pub fn parse_into<L: JsonListener>(&self, listener: &mut L) -> Result<(), TokenizeError> {
        parse_slice(&self.bytes, listener)
    }
}

/// The outer container. Scalars are rejected by the default visitor methods.
struct Document<'a, L> {
    listener: &'a mut L,
}

impl<'de, L: JsonListener> DeserializeSeed<'de> for Document<'_, L> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de, L: JsonListener> Visitor<'de> for Document<'_, L> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON object or array")
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<(), A::Error> {
        walk_object(self.listener, map)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, seq: A) -> Result<(), A::Error> {
        walk_array(self.listener, seq)
    }
}

/// Any value inside the document.
struct Node<'a, L> {
    listener: &'a mut L,
}

impl<'de, L: JsonListener> DeserializeSeed<'de> for Node<'_, L> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de, L: JsonListener> Visitor<'de> for Node<'_, L> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<(), E> {
        self.listener.value(if v { "true" } else { "false" });
        Ok(())
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<(), E> {
        self.listener.value(&v.to_string());
        Ok(())
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<(), E> {
        self.listener.value(&v.to_string());
        Ok(())
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<(), E> {
        self.listener.value(&v.to_string());
        Ok(())
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<(), E> {
        self.listener.value(v);
        Ok(())
    }

    fn visit_unit<E: de::Error>(self) -> Result<(), E> {
        self.listener.value("null");
        Ok(())
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<(), A::Error> {
        walk_object(self.listener, map)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, seq: A) -> Result<(), A::Error> {
        walk_array(self.listener, seq)
    }
}

/// An object key, handed over without allocating.
struct Key<'a, L> {
    listener: &'a mut L,
}

impl<'de, L: JsonListener> DeserializeSeed<'de> for Key<'_, L> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_str(self)
    }
}

impl<'de, L: JsonListener> Visitor<'de> for Key<'_, L> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an object key")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<(), E> {
        self.listener.key(v);
        Ok(())
    }
}

fn walk_object<'de, L: JsonListener, A: MapAccess<'de>>(
    listener: &mut L,
    mut map: A,
) -> Result<(), A::Error> {
    listener.start_object();
    while map
        .next_key_seed(Key {
            listener: &mut *listener,
        })?
        .is_some()
    {
        map.next_value_seed(Node {
            listener: &mut *listener,
        })?;
    }
    listener.end_object();
    Ok(())
}

fn walk_array<'de, L: JsonListener, A: SeqAccess<'de>>(
    listener: &mut L,
    mut seq: A,
) -> Result<(), A::Error> {
    listener.start_array();
    while seq
        .next_element_seed(Node {
            listener: &mut *listener,
        })?
        .is_some()
    {}
    listener.end_array();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};

    /// Listener that flattens every callback into a readable trace.
    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl JsonListener for Recorder {
        fn start_document(&mut self) {
            self.events.push("start_document".into());
        }
        fn end_document(&mut self) {
            self.events.push("end_document".into());
        }
        fn start_object(&mut self) {
            self.events.push("{".into());
        }
        fn end_object(&mut self) {
            self.events.push("}".into());
        }
        fn start_array(&mut self) {
            self.events.push("[".into());
        }
        fn end_array(&mut self) {
            self.events.push("]".into());
        }
        fn key(&mut self, key: &str) {
            self.events.push(format!("key:{key}"));
        }
        fn value(&mut self, value: &str) {
            self.events.push(format!("value:{value}"));
        }
    }

    const DOCUMENT: &str = r#"[
  {"EventType": "HighWater", "DateTime": "2018-10-17T17:25:00", "IsApproximateTime": false, "Height": 4.52, "Filtered": null},
  {"EventType": "LowWater", "DateTime": "2018-10-17T23:41:00.5", "Height": -0.1e1, "Tags": ["a\"b", "é🌊"]}
]"#;

    fn in_chunks(input: &[u8], chunk: usize) -> Result<Recorder, TokenizeError> {
        let mut recorder = Recorder::default();
        let mut body = BodyBuffer::new();
        for piece in input.chunks(chunk) {
            body.push(piece)?;
        }
        body.parse_into(&mut recorder)?;
        Ok(recorder)
    }

    fn error_of(input: &[u8]) -> TokenizeError {
        parse_slice(input, &mut Recorder::default()).unwrap_err()
    }

    #[test]
    fn emits_events_in_document_order() {
        let recorder = in_chunks(DOCUMENT.as_bytes(), DOCUMENT.len()).unwrap();
        let expected = vec![
            "start_document",
            "[",
            "{",
            "key:EventType",
            "value:HighWater",
            "key:DateTime",
            "value:2018-10-17T17:25:00",
            "key:IsApproximateTime",
            "value:false",
            "key:Height",
            "value:4.52",
            "key:Filtered",
            "value:null",
            "}",
            "{",
            "key:EventType",
            "value:LowWater",
            "key:DateTime",
            "value:2018-10-17T23:41:00.5",
            "key:Height",
            "value:-1",
            "key:Tags",
            "[",
            "value:a\"b",
            "value:é🌊",
            "]",
            "}",
            "]",
            "end_document",
        ];
        assert_eq!(recorder.events, expected);
    }

    #[test]
    fn fragmentation_does_not_change_events() {
        let whole = in_chunks(DOCUMENT.as_bytes(), DOCUMENT.len()).unwrap();
        for chunk in [1, 2, 3, 5, 7, 64] {
            let split = in_chunks(DOCUMENT.as_bytes(), chunk).unwrap();
            assert_eq!(split.events, whole.events, "chunk size {chunk}");
        }
    }

    #[test]
    fn multibyte_utf8_split_across_chunks() {
        let input = "[\"caf\u{e9} \u{1f30a}\"]".as_bytes();
        let recorder = in_chunks(input, 1).unwrap();
        assert_eq!(recorder.events[2], "value:caf\u{e9} \u{1f30a}");
    }

    #[test]
    fn reader_and_slice_agree() {
        let mut from_reader = Recorder::default();
        parse_reader(Cursor::new(DOCUMENT), &mut from_reader).unwrap();
        let from_slice = in_chunks(DOCUMENT.as_bytes(), DOCUMENT.len()).unwrap();
        assert_eq!(from_reader.events, from_slice.events);
    }

    #[test]
    fn skips_byte_order_mark() {
        let mut input = UTF8_BOM.to_vec();
        input.extend_from_slice(b"[]");
        let expected = vec!["start_document", "[", "]", "end_document"];

        assert_eq!(in_chunks(&input, 2).unwrap().events, expected);

        let mut recorder = Recorder::default();
        parse_reader(Cursor::new(&input), &mut recorder).unwrap();
        assert_eq!(recorder.events, expected);
    }

    #[test]
    fn partial_byte_order_mark_is_rejected() {
        assert!(matches!(
            error_of(b"\xEF[]"),
            TokenizeError::Malformed { line: 1, .. }
        ));

        let mut recorder = Recorder::default();
        let err = parse_reader(Cursor::new(b"\xEF\xBB[]"), &mut recorder).unwrap_err();
        assert!(matches!(err, TokenizeError::Malformed { .. }));
    }

    #[test]
    fn empty_object_document() {
        let recorder = in_chunks(b" {} \n", 1).unwrap();
        assert_eq!(
            recorder.events,
            vec!["start_document", "{", "}", "end_document"]
        );
    }

    #[test]
    fn rejects_scalar_document() {
        let mut recorder = Recorder::default();
        let err = parse_slice(b"42", &mut recorder).unwrap_err();
        assert!(matches!(err, TokenizeError::Malformed { line: 1, .. }));
        // The session started but never published
        assert_eq!(recorder.events, vec!["start_document"]);
    }

    #[test]
    fn rejects_malformed_input() {
        for input in [
            &b"[{]"[..],
            b"[nope]",
            br#"["\q"]"#,
            br#"["\ud83c"]"#,
            b"<html>maintenance</html>",
        ] {
            assert!(
                matches!(error_of(input), TokenizeError::Malformed { .. }),
                "{:?} should be malformed",
                String::from_utf8_lossy(input)
            );
        }
    }

    #[test]
    fn rejects_excessive_nesting() {
        let input = format!("{}{}", "[".repeat(200), "]".repeat(200));
        assert!(matches!(
            error_of(input.as_bytes()),
            TokenizeError::Malformed { .. }
        ));
    }

    #[test]
    fn trailing_whitespace_allowed_but_not_data() {
        let recorder = in_chunks(b"[]\r\n", 3).unwrap();
        assert_eq!(recorder.events.last().unwrap(), "end_document");

        let mut recorder = Recorder::default();
        let err = parse_slice(b"[] []", &mut recorder).unwrap_err();
        assert!(matches!(err, TokenizeError::Malformed { .. }));
        assert!(!recorder.events.contains(&"end_document".to_string()));
    }

    #[test]
    fn truncated_input_is_unexpected_end() {
        let mut recorder = Recorder::default();
        let err = parse_slice(br#"[{"Height": 1.5"#, &mut recorder).unwrap_err();
        assert_eq!(err, TokenizeError::UnexpectedEnd);
        assert_eq!(error_of(b""), TokenizeError::UnexpectedEnd);
    }

    #[test]
    fn body_buffer_enforces_limit() {
        let mut body = BodyBuffer::with_limit(4);
        body.push(b"[1,").unwrap();
        body.push(b"2").unwrap();
        assert_eq!(body.len(), 4);
        assert_eq!(body.push(b"]"), Err(TokenizeError::TooLarge { limit: 4 }));
        assert_eq!(body.as_bytes(), b"[1,2");
    }

    #[test]
    fn reader_failure_is_io_error() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("disk gone"))
            }
        }

        let mut recorder = Recorder::default();
        let err = parse_reader(Broken, &mut recorder).unwrap_err();
        assert!(matches!(err, TokenizeError::Io(ref message) if message.contains("disk gone")));
        assert_eq!(recorder.events, vec!["start_document"]);
    }
}
