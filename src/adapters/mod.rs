//! Adapter implementations for port traits.
//!
//! - `live/` - Real image-host channels
//! - `recording/` - Record channel outcomes to cassettes
//! - `replaying/` - Replay channel outcomes from cassettes

pub mod live;
pub mod recording;
pub mod replaying;
