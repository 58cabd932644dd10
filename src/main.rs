use std::process::ExitCode;
use std::sync::Arc;

use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

use ibpool::config::{Command, Config};
use ibpool::gateway::{GatewaySession, TcpConnector};
use ibpool::http;
use ibpool::pool::{ConnectionPool, IdentityAllocator, RetryPolicy};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const APP_NAME: &str = "🦀 ibpool";

// -----------------------------------------------------------------------------
// ----- Main ------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    setup().await;

    let config = Config::snapshot();
    match config.command {
        Command::Run => run_service(config).await,
        Command::Check => run_check(config).await,
    }
}

// -----------------------------------------------------------------------------
// ----- Setup -----------------------------------------------------------------

async fn setup() {
    // This has to be the first thing we do, because it initializes the config
    Config::init().await;

    init_tracing();
}

fn init_tracing() {
    let config = Config::snapshot();
    let filter = EnvFilter::try_new(config.log_level.as_str()).unwrap();
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

// -----------------------------------------------------------------------------
// ----- Run -------------------------------------------------------------------

async fn run_service(config: Config) -> ExitCode {
    let pool = ConnectionPool::new(
        config.settings.gateway.clone(),
        config.settings.pool.clone(),
        config.settings.retry.clone(),
        Arc::new(TcpConnector),
    );
    pool.initialize();

    info!("{} pooling sessions to {}", APP_NAME, config.settings.gateway);

    let code = tokio::select! {
        _ = signal::ctrl_c() => {
            info!("{} shutting down", APP_NAME);
            ExitCode::SUCCESS
        }

        serve_res = http::serve(pool.clone(), config.listen_addr) => {
            match serve_res {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    error!("status server error: {e}");
                    ExitCode::FAILURE
                }
            }
        }
    };

    pool.shutdown().await;
    code
}

// -----------------------------------------------------------------------------
// ----- Check -----------------------------------------------------------------

/// One-shot connectivity probe: same retry/identity path as the pool, one
/// standalone session, exit code says whether the gateway is usable.
async fn run_check(config: Config) -> ExitCode {
    let settings = &config.settings;

    let session = GatewaySession::new(0);
    let allocator = IdentityAllocator::new(
        settings.pool.client_id_base,
        settings.pool.client_id_spread,
    );
    let policy = RetryPolicy::new(settings.retry.clone());

    match policy
        .execute_connect(&session, &allocator, &TcpConnector, &settings.gateway)
        .await
    {
        Ok(()) => {
            info!(
                "gateway at {} accepted client id {}",
                settings.gateway,
                session.identifier().unwrap_or_default(),
            );
            session.disconnect();
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("gateway check failed: {e}");
            ExitCode::FAILURE
        }
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
