//! Callback interface between the JSON adapter and whatever consumes its
//! events.
//!
//! The adapter calls these methods in document order, once per lexical
//! event. Scalars arrive through [`JsonListener::value`] as text (strings
//! unescaped, numbers and literals in canonical form); the listener does its
//! own coercion.

/// Receiver of primitive JSON parse events.
pub trait JsonListener {
    /// A new document is about to be read. Fires for every parse attempt,
    /// before any input is examined.
    fn start_document(&mut self);

    /// The whole document, trailing whitespace included, was accepted.
    fn end_document(&mut self);

    fn start_object(&mut self);

    fn end_object(&mut self);

    fn start_array(&mut self) {}

    fn end_array(&mut self) {}

    /// An object key; the next scalar or container is its value.
    fn key(&mut self, key: &str);

    /// A scalar value: string contents, number text, or `true`/`false`/`null`.
    fn value(&mut self, value: &str);
}
