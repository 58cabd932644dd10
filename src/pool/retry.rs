use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::errors::{ConnectError, PoolError};
use crate::gateway::{GatewayConnector, GatewaySession, GatewayTarget};

use super::identity::IdentityAllocator;

// -----------------------------------------------------------------------------
// ----- RetryConfig -----------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Ceiling on underlying connect calls per `execute_connect`, across the
    /// whole candidate sequence.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Fraction of the delay randomized in both directions (0.1 = ±10%).
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- RetryPolicy -----------------------------------------------------------

/// Drives one bounded (re)connect: walks the allocator's candidate ids,
/// backs off on transient failures, learns from identity rejections, and
/// gives up early on anything unclassifiable.
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

// -----------------------------------------------------------------------------
// ----- RetryPolicy: Public ---------------------------------------------------

impl RetryPolicy {
    /// Connect `session` to `target`, trying candidate ids from `allocator`.
    ///
    /// Per error class:
    /// - `IdentifierInUse`: record the rejection and move straight to the next
    ///   candidate; the rejection is informative, not transient, so no delay.
    /// - transient (`Refused`/`Timeout`/`Unreachable`): sleep the jittered
    ///   backoff, then retry the same candidate.
    /// - `Unknown`: abort immediately.
    ///
    /// Every underlying connect call counts against `max_attempts`.
    pub async fn execute_connect(
        &self,
        session: &GatewaySession,
        allocator: &IdentityAllocator,
        connector: &dyn GatewayConnector,
        target: &GatewayTarget,
    ) -> Result<(), PoolError> {
        let candidates = allocator.candidates();
        let mut schedule = BackoffSchedule::new(&self.config);
        let mut attempts = 0u32;
        let mut last_err: Option<ConnectError> = None;

        'candidates: for id in candidates {
            loop {
                if attempts >= self.config.max_attempts {
                    break 'candidates;
                }
                attempts += 1;

                match session.connect(connector, target, id).await {
                    Ok(()) => return Ok(()),

                    Err(ConnectError::IdentifierInUse(_)) => {
                        debug!("client id {id} is taken; excluding it and moving on");
                        allocator.mark_rejected(id);
                        last_err = Some(ConnectError::IdentifierInUse(id));
                        continue 'candidates;
                    }

                    Err(e) if e.is_transient() => {
                        last_err = Some(e.clone());
                        if attempts >= self.config.max_attempts {
                            break 'candidates;
                        }
                        let delay = schedule.next_delay();
                        warn!(
                            "connect attempt {attempts}/{} to {target} failed ({e}); retrying in {}",
                            self.config.max_attempts,
                            humantime::format_duration(delay),
                        );
                        sleep(delay).await;
                    }

                    Err(e) => return Err(PoolError::connect_failed(e)),
                }
            }
        }

        let attempts_exhausted = attempts >= self.config.max_attempts;
        match last_err {
            Some(e) => {
                if !attempts_exhausted && matches!(e, ConnectError::IdentifierInUse(_)) {
                    Err(PoolError::IdentifierSpaceExhausted)
                } else {
                    Err(PoolError::connect_failed(e))
                }
            }
            // Unreachable in practice: the allocator never yields an empty
            // sequence. Classified anyway rather than panicking.
            None => Err(PoolError::IdentifierSpaceExhausted),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- BackoffSchedule -------------------------------------------------------

/// Exponential delay series: `min(max_delay, initial * multiplier^n)`, with
/// symmetric jitter applied to each emitted value.
pub struct BackoffSchedule {
    current: Duration,
    max: Duration,
    multiplier: f64,
    jitter_factor: f64,
}

impl BackoffSchedule {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            current: config.initial_delay,
            max: config.max_delay,
            multiplier: config.multiplier,
            jitter_factor: config.jitter_factor,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let emitted = self.apply_jitter(self.current);

        let scaled = (self.current.as_millis() as f64 * self.multiplier).round();
        let capped = (scaled as u128).min(self.max.as_millis());
        self.current = Duration::from_millis(u64::try_from(capped).unwrap_or(u64::MAX));

        emitted
    }

    fn apply_jitter(&self, base: Duration) -> Duration {
        if self.jitter_factor <= 0.0 {
            return base;
        }

        let base_millis = base.as_millis() as f64;
        let range = base_millis * self.jitter_factor;
        let jitter: f64 = rand::rng().random_range(-range..=range);
        Duration::from_millis((base_millis + jitter).max(0.0) as u64)
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
