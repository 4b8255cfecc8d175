//! Live streaming ingestion
//!
//! A long-lived loop over one provider's live feed: decode inbound
//! events into ticks, write each through the idempotent sink, and
//! reconnect after a fixed delay whenever the transport drops.

mod ingester;

pub use ingester::*;
