pub mod config;
pub mod errors;
pub mod gateway;
pub mod http;
pub mod pool;

pub use config::Config;
pub use errors::{ConnectError, PoolError};
pub use pool::{ConnectionPool, PoolLease, PoolStatus};
