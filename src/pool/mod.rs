pub mod identity;
pub(crate) mod monitor;
pub mod pool;
pub mod retry;

pub use identity::IdentityAllocator;
pub use pool::{ConnectionPool, PoolConfig, PoolLease, PoolStatus};
pub use retry::{BackoffSchedule, RetryConfig, RetryPolicy};
