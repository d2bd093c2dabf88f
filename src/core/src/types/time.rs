//! Ledger time: unix seconds and calendar-day arithmetic

/// Unix timestamp in seconds
pub type Timestamp = u64;

/// Length of one accounting day
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Calendar day (UTC) a timestamp falls in
pub fn day_index(ts: Timestamp) -> u64 {
    ts / SECONDS_PER_DAY
}

/// First second of the day a timestamp falls in
pub fn day_start(ts: Timestamp) -> Timestamp {
    day_index(ts) * SECONDS_PER_DAY
}

/// Current wall-clock time
pub fn now() -> Timestamp {
    chrono::Utc::now().timestamp().max(0) as Timestamp
}
