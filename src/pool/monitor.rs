use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::pool::PoolCore;

// -----------------------------------------------------------------------------
// ----- HealthMonitor ---------------------------------------------------------

/// Background maintenance of idle sessions.
///
/// One periodic task per pool. Each tick probes exactly the sessions sitting
/// in the idle queue at that instant; leased sessions are structurally out of
/// reach, so a probe can never interleave with an in-flight gateway exchange.
/// Probe failures demote the session and are otherwise contained; repair is
/// deferred to the next `acquire`.
pub(crate) struct HealthMonitor {
    interval: Duration,
    pool: Weak<PoolCore>,
    cancel: CancellationToken,
}

// -----------------------------------------------------------------------------
// ----- HealthMonitor: Static -------------------------------------------------

impl HealthMonitor {
    /// Spawn the monitor loop. Holds only a weak pool reference, so an
    /// abandoned pool is torn down instead of being kept alive by its own
    /// monitor; the owning pool cancels and joins the handle on shutdown.
    pub(crate) fn spawn(
        interval: Duration,
        pool: Weak<PoolCore>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let monitor = Self {
            interval,
            pool,
            cancel,
        };
        tokio::spawn(monitor.run())
    }
}

// -----------------------------------------------------------------------------
// ----- HealthMonitor: Private ------------------------------------------------

impl HealthMonitor {
    async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    debug!("health monitor cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    let Some(pool) = self.pool.upgrade() else {
                        debug!("pool dropped; health monitor exiting");
                        break;
                    };
                    let probed = pool.probe_idle();
                    debug!("health tick probed {probed} idle sessions");
                }
            }
        }
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
