use std::time::Duration;
use chrono::{DateTime, Utc};

/// How long the scheduler waits before its next tick.
///
/// Before the first tick (`last_elapsed` is `None`) the wait runs until the next
/// multiple of `frequency` counted from the Unix epoch (1970-01-01T00:00:00Z),
/// so a 60 minute frequency fires at the top of the hour. Frequencies that do
/// not divide a day evenly, such as 7 minutes, are not anchored to midnight:
/// their boundaries drift from one UTC day to the next. Landing exactly on a
/// boundary waits a full period. Afterwards the wait is `frequency` minus the time the previous tick
/// took, and zero once a tick took longer than the frequency.
pub fn next_wait(now: DateTime<Utc>, frequency: Duration, last_elapsed: Option<Duration>) -> Duration {
    if let Some(elapsed) = last_elapsed {
        return frequency.saturating_sub(elapsed);
    }

    let period = frequency.as_nanos();
    if period == 0 {
        return Duration::ZERO;
    }
    let since_epoch = match now.timestamp_nanos_opt() {
        Some(nanos) => nanos.rem_euclid(period as i64) as u128,
        None => 0,
    };
    let remaining = period - since_epoch;
    Duration::from_nanos(remaining as u64)
}
