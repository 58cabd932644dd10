use std::time::Duration;

use thiserror::Error;

// -----------------------------------------------------------------------------
// ----- ConnectError ----------------------------------------------------------

/// Classified outcome of a single gateway connect attempt.
///
/// The raw transport error never crosses the pool boundary; every failure is
/// folded into one of these classes before anyone upstream sees it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectError {
    /// The gateway already has a live session for this client id.
    #[error("client id {0} is already in use on the gateway")]
    IdentifierInUse(i32),

    #[error("gateway refused the connection")]
    Refused,

    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    #[error("gateway host unreachable")]
    Unreachable,

    #[error("unexpected gateway failure: {0}")]
    Unknown(String),
}

// -----------------------------------------------------------------------------
// ----- ConnectError: Public --------------------------------------------------

impl ConnectError {
    /// Transient failures are worth a backoff-and-retry on the same client id.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConnectError::Refused | ConnectError::Timeout(_) | ConnectError::Unreachable
        )
    }

    /// Remediation text surfaced verbatim to operators (HTTP 503 body, logs).
    pub fn hint(&self) -> &'static str {
        match self {
            ConnectError::IdentifierInUse(_) => {
                "all candidate client ids are in use; free a session on the gateway or widen the id spread"
            }
            ConnectError::Refused => {
                "gateway refused the connection; check that it is running and listening on the configured port"
            }
            ConnectError::Timeout(_) => {
                "connect timed out; the gateway may still be starting up or unreachable from this host"
            }
            ConnectError::Unreachable => {
                "gateway host unreachable; check the configured host, DNS and network route"
            }
            ConnectError::Unknown(_) => {
                "unexpected gateway failure; inspect the session's last_error and the gateway logs"
            }
        }
    }
}

// -----------------------------------------------------------------------------
// ----- PoolError -------------------------------------------------------------

/// Everything `ConnectionPool` can hand a caller. Nothing else escapes it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PoolError {
    /// No session became available within the lease timeout. Recoverable: the
    /// caller may simply retry later.
    #[error("no idle session available within {waited:?}")]
    Exhausted { waited: Duration },

    /// Reconnection retries were exhausted. Surfaced upward as a
    /// service-unavailable condition with the remediation hint attached.
    #[error("gateway connect failed: {reason} ({hint})")]
    ConnectFailed {
        reason: ConnectError,
        hint: &'static str,
    },

    /// Every candidate client id was rejected as in use. The allocator resets
    /// its exclusion set on the next attempt, so this heals on its own.
    #[error("all candidate client ids were rejected as in use")]
    IdentifierSpaceExhausted,
}

// -----------------------------------------------------------------------------
// ----- PoolError: Static -----------------------------------------------------

impl PoolError {
    pub fn connect_failed(reason: ConnectError) -> Self {
        let hint = reason.hint();
        PoolError::ConnectFailed { reason, hint }
    }
}

// -----------------------------------------------------------------------------
// ----- PoolError: Public -----------------------------------------------------

impl PoolError {
    pub fn hint(&self) -> &'static str {
        match self {
            PoolError::Exhausted { .. } => {
                "all pooled sessions are busy; retry shortly or raise the pool capacity"
            }
            PoolError::ConnectFailed { hint, .. } => hint,
            PoolError::IdentifierSpaceExhausted => {
                "every candidate client id is taken; free a session on the gateway or widen the id spread"
            }
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classes() {
        assert!(ConnectError::Refused.is_transient());
        assert!(ConnectError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(ConnectError::Unreachable.is_transient());
        assert!(!ConnectError::IdentifierInUse(7).is_transient());
        assert!(!ConnectError::Unknown("boom".into()).is_transient());
    }

    #[test]
    fn connect_failed_carries_class_hint() {
        let err = PoolError::connect_failed(ConnectError::Refused);
        let PoolError::ConnectFailed { reason, hint } = &err else {
            panic!("expected ConnectFailed");
        };
        assert_eq!(*reason, ConnectError::Refused);
        assert!(hint.contains("refused"));
        assert_eq!(err.hint(), *hint);
    }

    #[test]
    fn exhausted_mentions_wait() {
        let err = PoolError::Exhausted {
            waited: Duration::from_secs(30),
        };
        assert!(err.to_string().contains("30s"));
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
