//! Shared helpers for integration tests.
//!
//! Tests run against a real PostgreSQL database named by the
//! `WORKLOCK_TEST_DSN` environment variable and skip cleanly when it is not
//! set. Each test installs its repositories into a freshly dropped table so
//! tests stay independent of one another.

use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use worklock::{Config, LockRepo, ManualClock, WorkItemRepo, WorkItemSettings};

pub const ENV_TEST_DSN: &str = "WORKLOCK_TEST_DSN";

/// A fixed millisecond-aligned instant so timestamps round-trip exactly
/// through TIMESTAMPTZ columns.
#[allow(dead_code)] // Used by multiple test modules, but Rust doesn't detect cross-module usage
pub fn base_instant() -> DateTime<Utc> {
    Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
}

/// `base_instant` shifted by `offset` milliseconds.
#[allow(dead_code)]
pub fn at_ms(offset: i64) -> DateTime<Utc> {
    base_instant() + Duration::milliseconds(offset)
}

pub struct TestContext {
    pub pool: PgPool,
    pub clock: Arc<ManualClock>,
    pub config: Config,
}

/// Connect to the test database, or `None` (with a note) when no DSN is
/// configured. The clock starts at `base_instant`.
#[allow(dead_code)]
pub async fn connect() -> Option<TestContext> {
    connect_with_retry_after_ms(1000).await
}

/// Connect with a specific in-progress timeout, for tests that exercise the
/// stuck-item rescue path.
#[allow(dead_code)]
pub async fn connect_with_retry_after_ms(retry_after_ms: i64) -> Option<TestContext> {
    let Ok(dsn) = std::env::var(ENV_TEST_DSN) else {
        eprintln!("{ENV_TEST_DSN} not set; skipping integration test");
        return None;
    };
    let mut config = Config::from_dsn(dsn);
    config.in_progress_retry_after_ms = retry_after_ms;
    let pool = worklock::create_pool(&config)
        .await
        .expect("failed to connect to the test database");
    let clock = Arc::new(ManualClock::new(base_instant()));
    Some(TestContext {
        pool,
        clock,
        config,
    })
}

/// Build a work-item repository over a freshly dropped-and-created table.
#[allow(dead_code)]
pub async fn work_item_repo(ctx: &TestContext, table: &str) -> WorkItemRepo<serde_json::Value> {
    let settings = WorkItemSettings {
        table: table.to_string(),
        metrics_prefix: table.to_string(),
        ..Default::default()
    };
    let repo = WorkItemRepo::new(
        ctx.pool.clone(),
        ctx.clock.clone(),
        &ctx.config,
        settings,
    )
    .expect("failed to build work item repository");

    sqlx::query(&format!(
        "DROP TABLE IF EXISTS {}.{}",
        ctx.config.schema, table
    ))
    .execute(&ctx.pool)
    .await
    .expect("failed to drop test table");
    repo.install().await.expect("failed to install schema");
    repo
}

/// Build a lock repository over a freshly dropped-and-created table.
#[allow(dead_code)]
pub async fn lock_repo(ctx: &TestContext, table: &str) -> LockRepo {
    let repo = LockRepo::with_table(ctx.pool.clone(), ctx.clock.clone(), &ctx.config, table)
        .expect("failed to build lock repository");

    sqlx::query(&format!(
        "DROP TABLE IF EXISTS {}.{}",
        ctx.config.schema, table
    ))
    .execute(&ctx.pool)
    .await
    .expect("failed to drop test table");
    repo.install().await.expect("failed to install schema");
    repo
}
