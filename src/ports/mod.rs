//! Port traits defining external boundaries.
//!
//! Each trait represents a boundary between the gateway core and an
//! external system. Implementations live in `src/adapters/` and `src/store/`.

pub mod channel;
pub mod history;

pub use channel::{Channel, UploadFuture, UploadResult, ValidatedFile};
pub use history::{HistoryEntry, HistorySink};
