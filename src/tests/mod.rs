//! Crate-level tests exercising the library through its public API.

mod decode_tests;
