//! Background idle-session reaper.

use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::session::SharedSessionRegistry;

/// Every `period`, delete sessions idle for longer than `idle`.
pub fn spawn_sweeper(
    registry: SharedSessionRegistry,
    period: Duration,
    idle: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let removed = registry.sweep_expired(Instant::now(), idle);
            for id in &removed {
                tracing::info!(session = %id, "Reaping idle session");
            }
            tracing::debug!(
                sessions = registry.count(),
                removed = removed.len(),
                "Sweep tick"
            );
        }
    })
}
