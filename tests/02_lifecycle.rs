mod support;

use std::time::Duration;

use ibpool::errors::PoolError;
use support::{FakeGateway, build_pool, build_pool_with, pool_config};

// -----------------------------------------------------------------------------
// ----- Initialize / Shutdown -------------------------------------------------

#[tokio::test]
async fn initialize_twice_is_a_noop() {
    let gateway = FakeGateway::accepting();
    let pool = build_pool(&gateway, 2);

    pool.initialize();
    pool.initialize();

    let s = pool.status();
    assert!(s.initialized);
    assert_eq!(s.idle, 2, "double initialize must not duplicate idle slots");

    let lease = pool.acquire(Duration::from_secs(1)).await.unwrap();
    drop(lease);

    pool.shutdown().await;
}

#[tokio::test]
async fn acquire_initializes_on_demand() {
    let gateway = FakeGateway::accepting();
    let pool = build_pool(&gateway, 1);

    // No explicit initialize: the first acquire brings the pool up.
    let lease = pool.acquire(Duration::from_secs(1)).await.unwrap();
    assert!(pool.status().initialized);
    drop(lease);

    pool.shutdown().await;
}

#[tokio::test]
async fn shutdown_joins_the_monitor_promptly() {
    let gateway = FakeGateway::accepting();
    // A long heartbeat interval: shutdown must not wait a full period.
    let pool = build_pool_with(&gateway, pool_config(2, Duration::from_secs(600)), 3);
    pool.initialize();

    tokio::time::timeout(Duration::from_secs(1), pool.shutdown())
        .await
        .expect("shutdown must observe monitor cancellation promptly");

    let s = pool.status();
    assert!(!s.initialized);
    assert!(s.sessions.iter().all(|sess| sess.state == "disconnected"));
}

#[tokio::test]
async fn shutdown_forces_leased_sessions_down() {
    let gateway = FakeGateway::accepting();
    let pool = build_pool(&gateway, 1);
    pool.initialize();

    let lease = pool.acquire(Duration::from_secs(1)).await.unwrap();
    pool.shutdown().await;

    // The lessor's session was torn down underneath it.
    assert_eq!(pool.status().sessions[0].state, "disconnected");

    // Dropping the stale lease afterwards must not corrupt a fresh lifecycle.
    drop(lease);
    pool.initialize();
    let s = pool.status();
    assert_eq!(s.idle, 1);

    let lease = pool.acquire(Duration::from_secs(1)).await.unwrap();
    drop(lease);
    pool.shutdown().await;
}

// -----------------------------------------------------------------------------
// ----- Release & Status ------------------------------------------------------

#[tokio::test]
async fn release_returns_the_slot_immediately() {
    let gateway = FakeGateway::accepting();
    let pool = build_pool(&gateway, 1);
    pool.initialize();

    let lease = pool.acquire(Duration::from_secs(1)).await.unwrap();
    let held = pool.status();
    assert_eq!((held.idle, held.leased), (0, 1));

    lease.release();
    let released = pool.status();
    assert_eq!((released.idle, released.leased), (1, 0));

    pool.shutdown().await;
}

// -----------------------------------------------------------------------------
// ----- Demotion & Lazy Repair ------------------------------------------------

#[tokio::test]
async fn external_drop_is_demoted_then_transparently_repaired() {
    let gateway = FakeGateway::accepting();
    let pool = build_pool_with(&gateway, pool_config(1, Duration::from_millis(20)), 3);
    pool.initialize();

    // Connect, use, and have the gateway drop the link mid-lease.
    let lease = pool.acquire(Duration::from_secs(1)).await.unwrap();
    gateway.drop_all_links();
    drop(lease);

    // A monitor tick finds the idle corpse and demotes it, nothing more.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let s = pool.status();
    assert_eq!(s.sessions[0].state, "unhealthy");
    assert_eq!(s.healthy, 0);
    assert_eq!(s.idle, 1, "demotion must not remove the slot from the pool");

    // The next acquire repairs on the way out and hands over a live session.
    let calls_before = gateway.calls();
    let lease = pool.acquire(Duration::from_secs(1)).await.unwrap();
    assert!(gateway.calls() > calls_before, "repair must redial the gateway");
    assert!(lease.session().is_healthy(Duration::from_secs(60)));

    drop(lease);
    pool.shutdown().await;
}

#[tokio::test]
async fn slow_repair_times_out_the_caller_but_lands_for_the_next() {
    let gateway = FakeGateway::accepting();
    gateway.set_dial_delay(Duration::from_millis(150));
    let pool = build_pool(&gateway, 1);
    pool.initialize();

    // The caller's deadline fires while the dial is still in flight.
    let err = pool.acquire(Duration::from_millis(30)).await.unwrap_err();
    assert!(matches!(err, PoolError::Exhausted { .. }));

    // The dial is not aborted; once it resolves, the slot rejoins the idle
    // set already connected.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let s = pool.status();
    assert_eq!(s.idle, 1);
    assert_eq!(s.healthy, 1);

    // The next caller benefits without a second dial.
    let dials = gateway.calls();
    gateway.set_dial_delay(Duration::ZERO);
    let lease = pool.acquire(Duration::from_millis(100)).await.unwrap();
    assert_eq!(gateway.calls(), dials);

    drop(lease);
    pool.shutdown().await;
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
