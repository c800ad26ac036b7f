use std::time::{Duration, SystemTime, UNIX_EPOCH};

// Time elapsed since the UNIX epoch, zero if the clock is behind it
pub fn since_epoch() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
}

// Current timestamp in milliseconds
pub fn get_timestamp() -> u64 {
    since_epoch().as_millis() as u64
}
