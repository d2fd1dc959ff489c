//! Liveness monitor — ping idle connections, evict silent ones.
//!
//! DESIGN
//! ======
//! A single background task sweeps every registered connection once per
//! heartbeat period. Each connection carries an `alive` flag that the
//! connection task sets on every pong. Any inbound text frame also counts as
//! a reply, since a client that is talking is evidently reachable.
//!
//! - flag set: clear it and ask the connection task to ping.
//! - flag clear: nothing was heard since the previous sweep, so the
//!   connection is evicted. Registry cleanup and the `PRESENCE_LEAVE`
//!   announcements happen here, then the handle is closed, which ends the
//!   connection task wherever it is suspended.
//!
//! A connection therefore survives at most two periods of silence. The
//! first sweep fires one full period after start.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::connection::Control;
use crate::registry::ConnectionRegistry;
use crate::services::room::announce_departure;

/// Counts from one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub pinged: usize,
    pub evicted: usize,
}

/// Spawn the monitor. Returns a handle for shutdown.
pub fn spawn_liveness_monitor(registry: ConnectionRegistry, period: Duration) -> JoinHandle<()> {
    info!(period_secs = period.as_secs(), "liveness monitor configured");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let report = sweep(&registry);
            if report.evicted > 0 {
                info!(
                    evicted = report.evicted,
                    pinged = report.pinged,
                    remaining = registry.connection_count(),
                    "liveness: sweep evicted connections"
                );
            } else {
                debug!(pinged = report.pinged, "liveness: sweep");
            }
        }
    })
}

/// One pass over every registered connection.
pub fn sweep(registry: &ConnectionRegistry) -> SweepReport {
    let mut report = SweepReport::default();
    for conn in registry.connections() {
        if conn.take_alive() {
            conn.signal(Control::Ping);
            report.pinged += 1;
            continue;
        }

        let rooms = registry.unregister(conn.id);
        announce_departure(registry, &conn.identity, &rooms);
        conn.close();
        info!(conn_id = %conn.id, user_id = %conn.user_id(), rooms = rooms.len(), "liveness: heartbeat timeout");
        report.evicted += 1;
    }
    report
}

#[cfg(test)]
#[path = "liveness_test.rs"]
mod tests;
