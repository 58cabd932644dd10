use std::fmt;
use std::io::ErrorKind;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::errors::ConnectError;

// -----------------------------------------------------------------------------
// ----- GatewayTarget ---------------------------------------------------------

/// Where the external gateway lives and how long a connect may take.
#[derive(Debug, Clone)]
pub struct GatewayTarget {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
}

impl fmt::Display for GatewayTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// -----------------------------------------------------------------------------
// ----- Ports -----------------------------------------------------------------

/// Opens authenticated links to the gateway. The pool never talks to the wire
/// directly; everything goes through this seam so tests can script outcomes.
#[async_trait]
pub trait GatewayConnector: Send + Sync {
    /// Open a fresh link using `client_id` as the gateway-visible identity.
    /// Failures come back classified; the raw transport error stays inside.
    async fn open(
        &self,
        target: &GatewayTarget,
        client_id: i32,
    ) -> Result<Box<dyn GatewayLink>, ConnectError>;
}

/// One live, authenticated connection to the gateway.
pub trait GatewayLink: Send + Sync {
    /// Synchronous liveness query; must not block on the network.
    fn is_connected(&self) -> bool;

    /// Best-effort teardown. Must not fail from the caller's perspective.
    fn close(&mut self);
}

// -----------------------------------------------------------------------------
// ----- TcpConnector ----------------------------------------------------------

/// Plain TCP transport. Socket-level failures map onto the connect taxonomy;
/// identity rejections (`IdentifierInUse`) can only be produced by a
/// protocol-aware connector, since the socket layer has no view of them.
#[derive(Debug, Default)]
pub struct TcpConnector;

#[async_trait]
impl GatewayConnector for TcpConnector {
    async fn open(
        &self,
        target: &GatewayTarget,
        client_id: i32,
    ) -> Result<Box<dyn GatewayLink>, ConnectError> {
        let addr = format!("{}:{}", target.host, target.port);

        let stream = match timeout(target.connect_timeout, TcpStream::connect(&addr)).await {
            Err(_) => return Err(ConnectError::Timeout(target.connect_timeout)),
            Ok(Err(e)) => return Err(classify_io(&e)),
            Ok(Ok(stream)) => stream,
        };

        let _ = stream.set_nodelay(true);
        debug!("opened gateway link to {addr} as client id {client_id}");

        Ok(Box::new(TcpLink {
            stream: Some(stream),
        }))
    }
}

// -----------------------------------------------------------------------------
// ----- TcpLink ---------------------------------------------------------------

struct TcpLink {
    stream: Option<TcpStream>,
}

impl GatewayLink for TcpLink {
    fn is_connected(&self) -> bool {
        match &self.stream {
            Some(stream) => stream.peer_addr().is_ok(),
            None => false,
        }
    }

    fn close(&mut self) {
        // Dropping the stream closes the socket; nothing to report.
        self.stream.take();
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

fn classify_io(e: &std::io::Error) -> ConnectError {
    match e.kind() {
        ErrorKind::ConnectionRefused => ConnectError::Refused,
        ErrorKind::TimedOut => ConnectError::Timeout(Duration::ZERO),
        ErrorKind::HostUnreachable | ErrorKind::NetworkUnreachable | ErrorKind::AddrNotAvailable => {
            ConnectError::Unreachable
        }
        _ => ConnectError::Unknown(e.to_string()),
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
