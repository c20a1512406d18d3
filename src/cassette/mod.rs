//! Record/replay of channel calls, so uploads can be exercised without
//! touching the real image hosts.

pub mod format;
pub mod recorder;
pub mod replayer;
