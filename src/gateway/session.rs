use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::errors::ConnectError;

use super::link::{GatewayConnector, GatewayLink, GatewayTarget};

// -----------------------------------------------------------------------------
// ----- SessionState ----------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Healthy,
    Unhealthy,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Healthy => "healthy",
            SessionState::Unhealthy => "unhealthy",
        }
    }

    /// True for any state that still owns a link, live or not.
    pub fn has_link(self) -> bool {
        matches!(
            self,
            SessionState::Connected | SessionState::Healthy | SessionState::Unhealthy
        )
    }
}

// -----------------------------------------------------------------------------
// ----- GatewaySession --------------------------------------------------------

/// One slot's physical connection to the gateway.
///
/// All transitions are driven by the owning pool (or its monitor); callers
/// only ever see a leased session through a `PoolLease`. Metadata sits behind
/// its own short-hold lock so `status()` can snapshot concurrently with use;
/// neither lock is ever held across an await.
pub struct GatewaySession {
    slot: usize,
    meta: Mutex<SessionMeta>,
    link: Mutex<Option<Box<dyn GatewayLink>>>,
}

#[derive(Debug, Default)]
struct SessionMeta {
    identifier: Option<i32>,
    state: SessionState,
    last_heartbeat: Option<Instant>,
    established_at: Option<Instant>,
    last_error: Option<String>,
    leased: bool,
}

// -----------------------------------------------------------------------------
// ----- GatewaySession: Static ------------------------------------------------

impl GatewaySession {
    pub fn new(slot: usize) -> Self {
        Self {
            slot,
            meta: Mutex::new(SessionMeta::default()),
            link: Mutex::new(None),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- GatewaySession: Lifecycle ---------------------------------------------

impl GatewaySession {
    /// Open a link as `identifier`. Idempotent while the current link is
    /// still live. On failure the session is left `Disconnected` with
    /// `last_error` recorded, and the classified error is returned.
    pub async fn connect(
        &self,
        connector: &dyn GatewayConnector,
        target: &GatewayTarget,
        identifier: i32,
    ) -> Result<(), ConnectError> {
        let link_live = {
            let mut link = self.link.lock();
            match link.as_ref() {
                Some(l) if l.is_connected() => true,
                Some(_) => {
                    link.take(); // dead link, replaced below
                    false
                }
                None => false,
            }
        };
        if link_live {
            let mut meta = self.meta.lock();
            if meta.state != SessionState::Healthy {
                meta.state = SessionState::Connected;
            }
            return Ok(());
        }

        self.meta.lock().state = SessionState::Connecting;

        // The dial happens with no session locks held.
        match connector.open(target, identifier).await {
            Ok(link) => {
                *self.link.lock() = Some(link);
                let mut meta = self.meta.lock();
                meta.state = SessionState::Connected;
                meta.identifier = Some(identifier);
                meta.established_at = Some(Instant::now());
                meta.last_heartbeat = None;
                meta.last_error = None;
                info!(
                    "slot {} connected to {} as client id {identifier}",
                    self.slot, target
                );
                Ok(())
            }
            Err(e) => {
                let mut meta = self.meta.lock();
                meta.state = SessionState::Disconnected;
                meta.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Unconditional teardown. Never fails from the caller's perspective.
    pub fn disconnect(&self) {
        if let Some(mut link) = self.link.lock().take() {
            link.close();
            info!("slot {} disconnected", self.slot);
        }

        let mut meta = self.meta.lock();
        meta.state = SessionState::Disconnected;
        meta.established_at = None;
        meta.last_heartbeat = None;
    }
}

// -----------------------------------------------------------------------------
// ----- GatewaySession: Health ------------------------------------------------

impl GatewaySession {
    /// Cheap liveness check: state inspection only, no network round trip.
    /// Must never run against a leased session; the pool and monitor both
    /// guarantee that structurally.
    pub fn probe(&self) -> bool {
        let mut meta = self.meta.lock();
        debug_assert!(!meta.leased, "probe on a leased session");

        if !meta.state.has_link() {
            return false; // nothing to probe yet; stay Disconnected
        }

        let alive = self.link.lock().as_ref().is_some_and(|l| l.is_connected());
        if alive {
            meta.last_heartbeat = Some(Instant::now());
            meta.state = SessionState::Healthy;
            true
        } else {
            warn!("slot {} failed its liveness probe", self.slot);
            meta.state = SessionState::Unhealthy;
            false
        }
    }

    /// Pure function of state and heartbeat age. A freshly connected session
    /// with no heartbeat yet counts as healthy until `stale_after` has passed
    /// since it was established.
    pub fn is_healthy(&self, stale_after: Duration) -> bool {
        self.meta.lock().is_healthy(stale_after, Instant::now())
    }
}

// -----------------------------------------------------------------------------
// ----- GatewaySession: Pool Bookkeeping --------------------------------------

impl GatewaySession {
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn identifier(&self) -> Option<i32> {
        self.meta.lock().identifier
    }

    pub fn is_leased(&self) -> bool {
        self.meta.lock().leased
    }

    pub(crate) fn mark_leased(&self) {
        let mut meta = self.meta.lock();
        debug_assert!(
            matches!(meta.state, SessionState::Connected | SessionState::Healthy),
            "leasing a session that is not connected"
        );
        meta.leased = true;
    }

    pub(crate) fn clear_leased(&self) {
        self.meta.lock().leased = false;
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let meta = self.meta.lock();
        let now = Instant::now();
        SessionSnapshot {
            slot: self.slot,
            identifier: meta.identifier,
            state: meta.state.as_str(),
            leased: meta.leased,
            heartbeat_age_secs: meta.last_heartbeat.map(|t| (now - t).as_secs()),
            uptime_secs: meta.established_at.map(|t| (now - t).as_secs()),
            last_error: meta.last_error.clone(),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- SessionMeta -----------------------------------------------------------

impl SessionMeta {
    fn is_healthy(&self, stale_after: Duration, now: Instant) -> bool {
        match self.state {
            SessionState::Connected | SessionState::Healthy => {
                let anchor = self.last_heartbeat.or(self.established_at);
                anchor.is_some_and(|t| now.duration_since(t) < stale_after)
            }
            _ => false,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- SessionSnapshot -------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub slot: usize,
    pub identifier: Option<i32>,
    pub state: &'static str,
    pub leased: bool,
    pub heartbeat_age_secs: Option<u64>,
    pub uptime_secs: Option<u64>,
    pub last_error: Option<String>,
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
