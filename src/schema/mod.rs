//! Canonical market data types
//!
//! Provider-specific payloads are normalized to these types before they
//! reach the writer or storage.

mod tick;

pub use tick::*;
