use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{Semaphore, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout_at;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::errors::PoolError;
use crate::gateway::{GatewayConnector, GatewaySession, GatewayTarget, SessionSnapshot};

use super::identity::IdentityAllocator;
use super::monitor::HealthMonitor;
use super::retry::{RetryConfig, RetryPolicy};

// -----------------------------------------------------------------------------
// ----- PoolConfig ------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub capacity: usize,
    pub client_id_base: i32,
    pub client_id_spread: u16,
    pub heartbeat_interval: Duration,
    /// A session whose newest heartbeat (or connect) is older than this no
    /// longer counts as healthy.
    pub stale_after: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: 5,
            client_id_base: 1,
            client_id_spread: 4,
            heartbeat_interval: Duration::from_secs(30),
            stale_after: Duration::from_secs(60),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- ConnectionPool --------------------------------------------------------

/// Fixed-capacity leasing of gateway sessions.
///
/// Callers bracket every gateway operation with `acquire`/lease-drop. Sessions
/// connect lazily on first lease; broken sessions are repaired on the way out
/// of the idle queue, never behind the caller's back with a different slot.
/// Waiters are served in arrival order (the permit queue is fair), so a
/// saturated pool cannot starve anyone.
#[derive(Clone)]
pub struct ConnectionPool {
    core: Arc<PoolCore>,
}

pub(crate) struct PoolCore {
    target: GatewayTarget,
    config: PoolConfig,
    connector: Arc<dyn GatewayConnector>,
    retry: RetryPolicy,
    identity: IdentityAllocator,
    slots: Vec<Arc<GatewaySession>>,
    /// FIFO of unleased slot indices. Health ticks iterate this under the
    /// lock, which is what keeps a probe from ever racing a dequeue.
    idle: Mutex<VecDeque<usize>>,
    /// One permit per queued slot; fair, so waiters wake in arrival order.
    idle_permits: Semaphore,
    initialized: AtomicBool,
    monitor: Mutex<Option<MonitorHandle>>,
}

struct MonitorHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Who gets the slot when a repair connect outlives the caller's patience.
/// All transitions happen under the mutex, so the slot is claimed exactly once.
enum HandoffState {
    Waiting,
    Abandoned,
    Done(Result<(), PoolError>),
}

// -----------------------------------------------------------------------------
// ----- ConnectionPool: Static ------------------------------------------------

impl ConnectionPool {
    pub fn new(
        target: GatewayTarget,
        config: PoolConfig,
        retry: RetryConfig,
        connector: Arc<dyn GatewayConnector>,
    ) -> Self {
        let slots = (0..config.capacity)
            .map(|i| Arc::new(GatewaySession::new(i)))
            .collect();
        let identity = IdentityAllocator::new(config.client_id_base, config.client_id_spread);

        Self {
            core: Arc::new(PoolCore {
                target,
                config,
                connector,
                retry: RetryPolicy::new(retry),
                identity,
                slots,
                idle: Mutex::new(VecDeque::new()),
                idle_permits: Semaphore::new(0),
                initialized: AtomicBool::new(false),
                monitor: Mutex::new(None),
            }),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- ConnectionPool: Lifecycle ---------------------------------------------

impl ConnectionPool {
    /// Seed the idle queue and start the health monitor. Calling twice is a
    /// no-op. Sessions are not connected here; connection is lazy, on first
    /// lease. Must run inside a tokio runtime (spawns the monitor task).
    pub fn initialize(&self) {
        let core = &self.core;
        if core
            .initialized
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        // A previous shutdown leaves the queue drained; start from a clean
        // slate either way.
        core.drain_permits();
        {
            let mut idle = core.idle.lock();
            idle.clear();
            idle.extend(0..core.config.capacity);
        }
        core.idle_permits.add_permits(core.config.capacity);

        let cancel = CancellationToken::new();
        let task = HealthMonitor::spawn(
            core.config.heartbeat_interval,
            Arc::downgrade(core),
            cancel.clone(),
        );
        *core.monitor.lock() = Some(MonitorHandle { cancel, task });

        info!(
            "connection pool ready: capacity {} against {}",
            core.config.capacity, core.target
        );
    }

    /// Cancel and join the monitor, force-disconnect every session (leased
    /// ones included; in-flight callers will see failures on their next use),
    /// and drain the idle set. The pool may be initialized again afterwards.
    pub async fn shutdown(&self) {
        let core = &self.core;
        if core
            .initialized
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        info!("shutting down connection pool");

        let handle = core.monitor.lock().take();
        if let Some(MonitorHandle { cancel, task }) = handle {
            cancel.cancel();
            if let Err(e) = task.await {
                warn!("health monitor did not join cleanly: {e}");
            }
        }

        for session in &core.slots {
            session.disconnect();
        }

        core.idle.lock().clear();
        core.drain_permits();

        info!("connection pool shutdown complete");
    }
}

// -----------------------------------------------------------------------------
// ----- ConnectionPool: Leasing -----------------------------------------------

impl ConnectionPool {
    /// Lease a session, waiting up to `lease_timeout` for one to free up.
    ///
    /// An unhealthy or never-connected slot is repaired before handoff; the
    /// repair runs in its own task so a slow gateway dial cannot stall
    /// unrelated acquires, and so this call can keep its deadline even while
    /// the dial is still in flight. The dial itself is never aborted (the
    /// gateway handshake is not safely interruptible); its result lands on
    /// the session for the next consumer.
    pub async fn acquire(&self, lease_timeout: Duration) -> Result<PoolLease, PoolError> {
        let core = &self.core;
        if !core.initialized.load(Ordering::SeqCst) {
            self.initialize();
        }

        let deadline = tokio::time::Instant::now() + lease_timeout;

        let permit = match timeout_at(deadline, core.idle_permits.acquire()).await {
            Err(_elapsed) => {
                return Err(PoolError::Exhausted {
                    waited: lease_timeout,
                });
            }
            Ok(Err(_closed)) => {
                return Err(PoolError::Exhausted {
                    waited: lease_timeout,
                });
            }
            Ok(Ok(permit)) => permit,
        };
        permit.forget(); // the slot we pop below carries the capacity now

        // Dequeue, health-check and lease-mark atomically, so a concurrent
        // health tick or status snapshot never sees a half-granted lease.
        let index = {
            let mut idle = core.idle.lock();
            // An empty queue here means a shutdown swept it between our
            // permit grant and this dequeue; the caller just sees the pool
            // as unavailable.
            let Some(index) = idle.pop_front() else {
                return Err(PoolError::Exhausted {
                    waited: lease_timeout,
                });
            };
            if core.slots[index].is_healthy(core.config.stale_after) {
                core.slots[index].mark_leased();
                drop(idle);
                return Ok(PoolLease::new(self.core.clone(), index));
            }
            index
        };

        self.repair_then_lease(index, deadline, lease_timeout).await
    }

    /// Point-in-time snapshot; safe to call concurrently with anything.
    /// A slot mid-repair is neither idle nor leased and shows as `repairing`.
    pub fn status(&self) -> PoolStatus {
        let core = &self.core;
        let idle = core.idle.lock().len();
        let sessions: Vec<SessionSnapshot> = core.slots.iter().map(|s| s.snapshot()).collect();
        let leased = sessions.iter().filter(|s| s.leased).count();
        let healthy = core
            .slots
            .iter()
            .filter(|s| s.is_healthy(core.config.stale_after))
            .count();
        let total = core.config.capacity;

        PoolStatus {
            initialized: core.initialized.load(Ordering::SeqCst),
            gateway: core.target.to_string(),
            total,
            idle,
            leased,
            repairing: total.saturating_sub(idle + leased),
            healthy,
            sessions,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- ConnectionPool: Private -----------------------------------------------

impl ConnectionPool {
    async fn repair_then_lease(
        &self,
        index: usize,
        deadline: tokio::time::Instant,
        waited: Duration,
    ) -> Result<PoolLease, PoolError> {
        let core = self.core.clone();
        let handoff = Arc::new(Mutex::new(HandoffState::Waiting));
        let (done_tx, done_rx) = oneshot::channel::<()>();

        let task_core = core.clone();
        let task_handoff = handoff.clone();
        tokio::spawn(async move {
            let session = task_core.slots[index].clone();
            let result = task_core
                .retry
                .execute_connect(
                    session.as_ref(),
                    &task_core.identity,
                    task_core.connector.as_ref(),
                    &task_core.target,
                )
                .await;

            let requeue = {
                let mut state = task_handoff.lock();
                if matches!(*state, HandoffState::Abandoned) {
                    // Caller is gone: the slot goes back to the idle set with
                    // whatever state the dial left it in.
                    true
                } else {
                    // A failed repair rejoins at the tail so a broken slot
                    // does not starve callers queued behind it; a successful
                    // one is reserved for the waiting caller and must not
                    // touch the queue.
                    let reserved = result.is_ok();
                    *state = HandoffState::Done(result);
                    !reserved
                }
            };
            if requeue {
                task_core.requeue(index);
            }
            let _ = done_tx.send(());
        });

        let _ = timeout_at(deadline, done_rx).await;

        let outcome = {
            let mut state = handoff.lock();
            match std::mem::replace(&mut *state, HandoffState::Abandoned) {
                HandoffState::Done(result) => result,
                // Deadline hit while the dial is still running; the repair
                // task observes Abandoned and requeues when it resolves.
                HandoffState::Waiting => Err(PoolError::Exhausted { waited }),
                HandoffState::Abandoned => unreachable!("handoff abandoned twice"),
            }
        };

        // Errors surface verbatim: callers need an accurate signal of gateway
        // unavailability, not a silent internal retry on another slot.
        match outcome {
            Ok(()) => {
                core.slots[index].mark_leased();
                Ok(PoolLease::new(core, index))
            }
            Err(e) => Err(e),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- PoolCore --------------------------------------------------------------

impl PoolCore {
    /// Probe every session currently idle. Runs under the queue lock: cheap
    /// (probes are state inspections, no I/O) and race-free by construction.
    pub(crate) fn probe_idle(&self) -> usize {
        let idle = self.idle.lock();
        for &index in idle.iter() {
            self.slots[index].probe();
        }
        idle.len()
    }

    /// Return a slot to the idle tail. Clearing the lease flag and rejoining
    /// the queue happen under one lock, so no snapshot can catch a slot that
    /// is neither leased nor idle during a release. The containment guard
    /// covers leases that outlive a shutdown/initialize cycle, where the
    /// fresh queue already owns the slot.
    fn requeue(&self, index: usize) {
        let mut idle = self.idle.lock();
        self.slots[index].clear_leased();
        if idle.contains(&index) {
            return;
        }
        idle.push_back(index);
        drop(idle);
        self.idle_permits.add_permits(1);
    }

    fn drain_permits(&self) {
        while let Ok(permit) = self.idle_permits.try_acquire() {
            permit.forget();
        }
    }
}

// -----------------------------------------------------------------------------
// ----- PoolLease -------------------------------------------------------------

/// Exclusive ownership of one session until dropped or released. Returning to
/// the pool is unconditional: the pool judges connection health, not
/// caller-level outcomes.
pub struct PoolLease {
    core: Arc<PoolCore>,
    index: usize,
}

impl PoolLease {
    fn new(core: Arc<PoolCore>, index: usize) -> Self {
        Self { core, index }
    }

    pub fn session(&self) -> &GatewaySession {
        &self.core.slots[self.index]
    }

    pub fn release(self) {
        // Drop does the bookkeeping.
    }
}

impl Drop for PoolLease {
    fn drop(&mut self) {
        self.core.requeue(self.index);
    }
}

impl fmt::Debug for PoolLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolLease").field("slot", &self.index).finish()
    }
}

// -----------------------------------------------------------------------------
// ----- PoolStatus ------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    pub initialized: bool,
    pub gateway: String,
    pub total: usize,
    pub idle: usize,
    pub leased: usize,
    pub repairing: usize,
    pub healthy: usize,
    pub sessions: Vec<SessionSnapshot>,
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
