use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use ibpool::errors::ConnectError;
use ibpool::gateway::{GatewayConnector, GatewayLink, GatewayTarget};
use ibpool::pool::{ConnectionPool, PoolConfig, RetryConfig};

// -----------------------------------------------------------------------------
// ----- FakeGateway -----------------------------------------------------------

/// Scriptable stand-in for the external gateway.
///
/// Each `open` consumes the next scripted outcome (an empty script means
/// success); ids listed in `in_use` always rebound as `IdentifierInUse`,
/// mirroring how the real gateway rejects duplicate client ids. Links handed
/// out stay registered so a test can drop them "externally".
pub struct FakeGateway {
    script: Mutex<VecDeque<Result<(), ConnectError>>>,
    in_use: Mutex<HashSet<i32>>,
    dial_delay: Mutex<Duration>,
    calls: AtomicUsize,
    ids_seen: Mutex<Vec<i32>>,
    links: Mutex<Vec<Arc<AtomicBool>>>,
}

#[allow(dead_code)]
impl FakeGateway {
    pub fn accepting() -> Arc<Self> {
        Self::scripted(Vec::new())
    }

    pub fn scripted(script: Vec<Result<(), ConnectError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            in_use: Mutex::new(HashSet::new()),
            dial_delay: Mutex::new(Duration::ZERO),
            calls: AtomicUsize::new(0),
            ids_seen: Mutex::new(Vec::new()),
            links: Mutex::new(Vec::new()),
        })
    }

    /// Every connect attempt fails the same way, forever (one-element scripts
    /// repeat indefinitely).
    pub fn always_failing(err: ConnectError) -> Arc<Self> {
        Self::scripted(vec![Err(err)])
    }

    pub fn mark_id_in_use(&self, id: i32) {
        self.in_use.lock().insert(id);
    }

    pub fn set_dial_delay(&self, delay: Duration) {
        *self.dial_delay.lock() = delay;
    }

    /// Sever every link handed out so far, as if the gateway dropped them.
    pub fn drop_all_links(&self) {
        for link in self.links.lock().iter() {
            link.store(false, Ordering::SeqCst);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn ids_seen(&self) -> Vec<i32> {
        self.ids_seen.lock().clone()
    }

    fn next_outcome(&self) -> Result<(), ConnectError> {
        let mut script = self.script.lock();
        if script.len() > 1 {
            script.pop_front().unwrap_or(Ok(()))
        } else {
            script.front().cloned().unwrap_or(Ok(()))
        }
    }
}

#[async_trait]
impl GatewayConnector for FakeGateway {
    async fn open(
        &self,
        _target: &GatewayTarget,
        client_id: i32,
    ) -> Result<Box<dyn GatewayLink>, ConnectError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.ids_seen.lock().push(client_id);

        let delay = *self.dial_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.in_use.lock().contains(&client_id) {
            return Err(ConnectError::IdentifierInUse(client_id));
        }

        self.next_outcome()?;

        let alive = Arc::new(AtomicBool::new(true));
        self.links.lock().push(alive.clone());
        Ok(Box::new(FakeLink { alive }))
    }
}

// -----------------------------------------------------------------------------
// ----- FakeLink --------------------------------------------------------------

struct FakeLink {
    alive: Arc<AtomicBool>,
}

impl GatewayLink for FakeLink {
    fn is_connected(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn close(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

// -----------------------------------------------------------------------------
// ----- Builders --------------------------------------------------------------

#[allow(dead_code)]
pub fn target() -> GatewayTarget {
    GatewayTarget {
        host: "gw.test".to_string(),
        port: 4002,
        connect_timeout: Duration::from_secs(1),
    }
}

/// Millisecond-scale retry schedule so failure paths resolve inside a test's
/// patience.
#[allow(dead_code)]
pub fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
        multiplier: 2.0,
        jitter_factor: 0.0,
    }
}

#[allow(dead_code)]
pub fn pool_config(capacity: usize, heartbeat_interval: Duration) -> PoolConfig {
    PoolConfig {
        capacity,
        client_id_base: 1,
        client_id_spread: 4,
        heartbeat_interval,
        stale_after: Duration::from_secs(60),
    }
}

#[allow(dead_code)]
pub fn build_pool(gateway: &Arc<FakeGateway>, capacity: usize) -> ConnectionPool {
    // A long heartbeat interval keeps the monitor quiet unless a test wants it.
    build_pool_with(gateway, pool_config(capacity, Duration::from_secs(600)), 3)
}

#[allow(dead_code)]
pub fn build_pool_with(
    gateway: &Arc<FakeGateway>,
    config: PoolConfig,
    retry_attempts: u32,
) -> ConnectionPool {
    ConnectionPool::new(
        target(),
        config,
        fast_retry(retry_attempts),
        gateway.clone(),
    )
}
