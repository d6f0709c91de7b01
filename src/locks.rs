//! Named distributed locks with TTL and owner identity.
//!
//! This module provides [`LockRepo`], a registry of advisory locks used by
//! cooperating processes for mutual exclusion over short-to-medium critical
//! sections. Acquisition is one conditional upsert: the lock name is the
//! primary key, so racing acquirers collapse onto a single row and the
//! database picks exactly one winner.
//!
//! The lock is advisory, not a fencing token. Clock skew between processes
//! can let two holders overlap briefly around the expiry boundary;
//! applications that need fencing must compose an external monotonic token.

use crate::clock::Clock;
use crate::config::{validate_identifier, Config};
use crate::error::Result;
use crate::types::Lock;
use chrono::Duration;
use sqlx::PgPool;
use std::sync::Arc;

const DEFAULT_LOCK_TABLE: &str = "locks";

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS {table} (
        name TEXT PRIMARY KEY,
        owner TEXT NOT NULL,
        time_created TIMESTAMPTZ NOT NULL,
        expiry_time TIMESTAMPTZ NOT NULL
    );
"#;

// The WHERE clause only lets the update through when the stored lock has
// expired; a live lock held by anyone (the caller included) yields zero rows.
const ACQUIRE_LOCK: &str = r#"
    INSERT INTO {table} AS l (name, owner, time_created, expiry_time)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (name) DO UPDATE
    SET owner = EXCLUDED.owner,
        time_created = EXCLUDED.time_created,
        expiry_time = EXCLUDED.expiry_time
    WHERE l.expiry_time <= EXCLUDED.time_created
    RETURNING name;
"#;

// No expiry check: an owner whose heartbeat stuttered may re-extend an
// expired lock as long as nobody else has taken it over.
const REFRESH_LOCK: &str = r#"
    UPDATE {table}
    SET expiry_time = $3
    WHERE name = $1 AND owner = $2;
"#;

const RELEASE_LOCK: &str = r#"
    DELETE FROM {table}
    WHERE name = $1 AND owner = $2;
"#;

const IS_LOCKED: &str = r#"
    SELECT EXISTS (
        SELECT 1
        FROM {table}
        WHERE name = $1 AND owner = $2 AND expiry_time > $3
    );
"#;

const GET_LOCK: &str = r#"
    SELECT name, owner, time_created, expiry_time
    FROM {table}
    WHERE name = $1;
"#;

/// Registry of named TTL-bounded locks.
///
/// Stateless apart from its pool and clock; multiple instances pointing at
/// the same table are safe and interchangeable.
#[derive(Clone)]
pub struct LockRepo {
    pool: PgPool,
    clock: Arc<dyn Clock>,
    table: String,
    acquire: String,
    refresh: String,
    release: String,
    is_locked: String,
    get: String,
    create_table: String,
}

impl LockRepo {
    /// Create a lock repository using the default `locks` table.
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>, config: &Config) -> Result<Self> {
        Self::with_table(pool, clock, config, DEFAULT_LOCK_TABLE)
    }

    /// Create a lock repository over a custom table name.
    pub fn with_table(
        pool: PgPool,
        clock: Arc<dyn Clock>,
        config: &Config,
        table: &str,
    ) -> Result<Self> {
        validate_identifier("schema", &config.schema)?;
        validate_identifier("lock table", table)?;
        let qualified = format!("{}.{}", config.schema, table);
        let render = |template: &str| template.replace("{table}", &qualified);
        Ok(Self {
            pool,
            clock,
            acquire: render(ACQUIRE_LOCK),
            refresh: render(REFRESH_LOCK),
            release: render(RELEASE_LOCK),
            is_locked: render(IS_LOCKED),
            get: render(GET_LOCK),
            create_table: render(CREATE_TABLE),
            table: qualified,
        })
    }

    /// Create the lock table. Idempotent; the schema must already exist. The
    /// name column is the primary key, which is what makes racing upserts
    /// collapse onto one row.
    pub async fn install(&self) -> Result<()> {
        sqlx::query(&self.create_table).execute(&self.pool).await?;
        tracing::debug!(table = %self.table, "lock schema installed");
        Ok(())
    }

    /// Try to acquire `name` for `owner` for the next `ttl`.
    ///
    /// Succeeds iff no unexpired record exists for the name; an expired lock
    /// is taken over regardless of its previous owner. Returns `false` when
    /// somebody (possibly the caller) holds the lock unexpired; a live
    /// holder extends via [`LockRepo::refresh_expiry`] instead. A duplicate-
    /// key collision from a racing acquirer also means `false`; any other
    /// datastore error propagates.
    pub async fn lock(&self, name: &str, owner: &str, ttl: Duration) -> Result<bool> {
        let now = self.clock.now();
        let result = sqlx::query_scalar::<_, String>(&self.acquire)
            .bind(name)
            .bind(owner)
            .bind(now)
            .bind(now + ttl)
            .fetch_optional(&self.pool)
            .await;

        match result {
            Ok(Some(_)) => {
                tracing::debug!(name, owner, "lock acquired");
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Extend an already-held lock to `now + ttl`.
    ///
    /// Matches on name and owner only; does not create a lock when none
    /// exists. Returns whether a record was modified.
    pub async fn refresh_expiry(&self, name: &str, owner: &str, ttl: Duration) -> Result<bool> {
        let rows_affected = sqlx::query(&self.refresh)
            .bind(name)
            .bind(owner)
            .bind(self.clock.now() + ttl)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(rows_affected > 0)
    }

    /// Release `name` if held by `owner`. Idempotent; locks owned by others
    /// are left untouched.
    pub async fn release(&self, name: &str, owner: &str) -> Result<()> {
        sqlx::query(&self.release)
            .bind(name)
            .bind(owner)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Whether `owner` currently holds `name` unexpired.
    pub async fn is_locked(&self, name: &str, owner: &str) -> Result<bool> {
        let held: bool = sqlx::query_scalar(&self.is_locked)
            .bind(name)
            .bind(owner)
            .bind(self.clock.now())
            .fetch_one(&self.pool)
            .await?;
        Ok(held)
    }

    /// Look up the current record for `name`, whoever owns it.
    pub async fn find(&self, name: &str) -> Result<Option<Lock>> {
        let lock = sqlx::query_as::<_, Lock>(&self.get)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(lock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;

    #[test]
    fn statements_render_with_qualified_table() {
        let render = |template: &str| template.replace("{table}", "public.locks");
        let acquire = render(ACQUIRE_LOCK);
        assert!(acquire.contains("INSERT INTO public.locks AS l"));
        assert!(acquire.contains("ON CONFLICT (name) DO UPDATE"));
        assert!(acquire.contains("l.expiry_time <= EXCLUDED.time_created"));
        assert!(!acquire.contains('{'));

        let refresh = render(REFRESH_LOCK);
        assert!(refresh.contains("WHERE name = $1 AND owner = $2"));
        // Refresh carries no expiry condition.
        assert!(!refresh.contains("expiry_time <="));
    }

    #[tokio::test]
    async fn with_table_rejects_invalid_identifiers() {
        let config = crate::config::Config::from_dsn("postgresql://localhost/worklock");
        // Identifier validation happens before any connection is used, so a
        // lazily-connecting pool is enough here.
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy(&config.dsn)
            .expect("lazy pool");
        let clock = Arc::new(SystemClock);
        assert!(LockRepo::with_table(pool.clone(), clock.clone(), &config, "app_locks").is_ok());
        assert!(LockRepo::with_table(pool, clock, &config, "bad-table").is_err());
    }
}
