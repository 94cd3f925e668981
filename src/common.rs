//! modules shared by the protocol engine and the audio graph

pub mod box_error;
pub mod config;
pub mod stream_time_stat;

use std::time::{SystemTime, UNIX_EPOCH};

/// microseconds since the epoch, used to drive all the soft timers
pub fn get_micro_time() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros()
}
