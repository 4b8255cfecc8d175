//! Historical backfill
//!
//! Plans a requested time range into provider-sized windows, fetches each
//! window with retry, and writes the resulting ticks through the
//! idempotent sink. Re-running over an overlapping range is always safe.

mod engine;
mod planner;
mod retry;

pub use engine::*;
pub use planner::*;
pub use retry::*;
