//! Game time. The server runs at a fixed 20 ticks per second.

use std::time::Duration;

use tokio::time::sleep;

pub const TICKS_PER_SECOND: u64 = 20;

/// Length of a single game tick.
pub const TICK: Duration = Duration::from_millis(1000 / TICKS_PER_SECOND);

/// The wall-clock length of `n` ticks.
pub const fn ticks(n: u64) -> Duration {
    Duration::from_millis(n * (1000 / TICKS_PER_SECOND))
}

/// Suspends the calling task for `n` game ticks without blocking anything
/// else on the runtime.
pub async fn wait_for_ticks(n: u64) {
    sleep(ticks(n)).await;
}
