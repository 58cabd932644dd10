pub mod link;
pub mod session;

pub use link::{GatewayConnector, GatewayLink, GatewayTarget, TcpConnector};
pub use session::{GatewaySession, SessionSnapshot, SessionState};

// Gateway seam only; pooling and repair policy live in pool/.
