//! Persistent work-item queue backed by a PostgreSQL table.
//!
//! This module provides [`WorkItemRepo`], a multi-producer/multi-consumer
//! queue with retry and timeout semantics. Every mutation is a single
//! conditional statement, so concurrent callers race on the database's
//! per-row atomicity rather than on any in-memory lock: the claim statement
//! uses `FOR UPDATE SKIP LOCKED`, exactly one caller wins a given row, and
//! losers fall through to the next selection bucket.
//!
//! Column names are injected via [`WorkItemFields`] at construction and the
//! statements are rendered once from the templates below, so the repository
//! can run against pre-existing schemas.

use crate::clock::Clock;
use crate::config::{validate_identifier, Config};
use crate::error::{Error, Result};
use crate::types::{Payload, ProcessingStatus, StatusUpdateResult, WorkItem, WorkItemFields};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use uuid::Uuid;

// Statement templates. `{table}` is the schema-qualified table name and the
// remaining placeholders are the injected column names; `{returning}` and
// `{returning_t}` expand to the full column list aliased to the fixed row
// shape, so decoding is independent of the injected names.

const RETURNING_FIELDS: &str = "{id} AS id, {received_at} AS received_at, {updated_at} AS updated_at, {available_at} AS available_at, {status} AS status, {failure_count} AS failure_count, {item} AS item";

const RETURNING_FIELDS_T: &str = "t.{id} AS id, t.{received_at} AS received_at, t.{updated_at} AS updated_at, t.{available_at} AS available_at, t.{status} AS status, t.{failure_count} AS failure_count, t.{item} AS item";

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS {table} (
        {id} UUID PRIMARY KEY,
        {received_at} TIMESTAMPTZ NOT NULL,
        {updated_at} TIMESTAMPTZ NOT NULL,
        {available_at} TIMESTAMPTZ,
        {status} TEXT NOT NULL,
        {failure_count} INT NOT NULL DEFAULT 0,
        {item} JSONB NOT NULL
    );
"#;

const CREATE_STATUS_UPDATED_AT_INDEX: &str = r#"
    CREATE INDEX IF NOT EXISTS {index_prefix}_status_updated_at_idx
    ON {table} ({status} ASC, {updated_at} ASC);
"#;

const CREATE_STATUS_AVAILABLE_AT_INDEX: &str = r#"
    CREATE INDEX IF NOT EXISTS {index_prefix}_status_available_at_idx
    ON {table} ({status} ASC, {available_at} ASC);
"#;

const CREATE_STATUS_INDEX: &str = r#"
    CREATE INDEX IF NOT EXISTS {index_prefix}_status_idx
    ON {table} ({status} ASC);
"#;

const INSERT_ITEM: &str = r#"
    INSERT INTO {table} ({id}, {received_at}, {updated_at}, {available_at}, {status}, {failure_count}, {item})
    VALUES ($1, $2, $3, $4, $5, 0, $6)
    RETURNING {returning};
"#;

const BATCH_INSERT_ITEMS: &str = r#"
    INSERT INTO {table} ({id}, {received_at}, {updated_at}, {available_at}, {status}, {failure_count}, {item})
    SELECT unnest($1::uuid[]), $2::timestamptz, $3::timestamptz, $4::timestamptz, unnest($5::text[]), 0, unnest($6::jsonb[])
    RETURNING {returning};
"#;

const CLAIM_READY: &str = r#"
    UPDATE {table} t
    SET {status} = 'in-progress', {updated_at} = $1
    FROM (
        SELECT {id}
        FROM {table}
        WHERE {status} IN ({ready_statuses}) AND {available_at} < $2
        ORDER BY {available_at} ASC
        LIMIT 1
        FOR UPDATE SKIP LOCKED
    ) candidate
    WHERE t.{id} = candidate.{id}
    RETURNING {returning_t};
"#;

const CLAIM_FAILED: &str = r#"
    UPDATE {table} t
    SET {status} = 'in-progress', {updated_at} = $1
    FROM (
        SELECT {id}
        FROM {table}
        WHERE {status} = 'failed'
          AND {updated_at} < $2
          AND ({available_at} IS NULL OR {available_at} < $3)
        ORDER BY {updated_at} ASC
        LIMIT 1
        FOR UPDATE SKIP LOCKED
    ) candidate
    WHERE t.{id} = candidate.{id}
    RETURNING {returning_t};
"#;

const CLAIM_STUCK: &str = r#"
    UPDATE {table} t
    SET {status} = 'in-progress', {updated_at} = $1
    FROM (
        SELECT {id}
        FROM {table}
        WHERE {status} = 'in-progress' AND {updated_at} < $2
        ORDER BY {updated_at} ASC
        LIMIT 1
        FOR UPDATE SKIP LOCKED
    ) candidate
    WHERE t.{id} = candidate.{id}
    RETURNING {returning_t};
"#;

const MARK_AS: &str = r#"
    UPDATE {table}
    SET {status} = $2,
        {updated_at} = $3,
        {available_at} = COALESCE($4, {available_at}),
        {failure_count} = {failure_count} + CASE WHEN $2 = 'failed' THEN 1 ELSE 0 END
    WHERE {id} = $1;
"#;

const COMPLETE_IN_PROGRESS: &str = r#"
    UPDATE {table}
    SET {status} = $2, {updated_at} = $3
    WHERE {id} = $1 AND {status} = 'in-progress';
"#;

const CANCEL_ITEM: &str = r#"
    WITH current AS (
        SELECT {id} AS id, {status} AS status
        FROM {table}
        WHERE {id} = $1
        FOR UPDATE
    )
    UPDATE {table} t
    SET {status} = 'cancelled', {updated_at} = $2
    FROM current
    WHERE t.{id} = current.id AND current.status IN ({cancellable_statuses})
    RETURNING current.status AS previous_status;
"#;

const GET_ITEM_BY_ID: &str = r#"
    SELECT {returning}
    FROM {table}
    WHERE {id} = $1;
"#;

const LIST_ITEMS_BY_STATUS: &str = r#"
    SELECT {returning}
    FROM {table}
    WHERE {status} = $1
    ORDER BY {updated_at} DESC
    LIMIT $2;
"#;

const COUNT_ITEMS_BY_STATUS: &str = r#"
    SELECT COUNT(*)
    FROM {table}
    WHERE {status} = $1;
"#;

const COUNT_ITEMS_GROUPED: &str = r#"
    SELECT {status} AS status, COUNT(*) AS count
    FROM {table}
    GROUP BY {status};
"#;

/// Statuses claimed by the first pull bucket; `deferred` gets the same pull
/// treatment as `todo`.
const READY_STATUSES: [ProcessingStatus; 2] = [ProcessingStatus::ToDo, ProcessingStatus::Deferred];

fn quoted_status_list<I>(statuses: I) -> String
where
    I: IntoIterator<Item = ProcessingStatus>,
{
    statuses
        .into_iter()
        .map(|status| format!("'{}'", status.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

struct SqlContext<'a> {
    table: &'a str,
    index_prefix: &'a str,
    fields: &'a WorkItemFields,
}

fn render(template: &str, ctx: &SqlContext<'_>) -> String {
    let cancellable = quoted_status_list(
        ProcessingStatus::ALL
            .into_iter()
            .filter(ProcessingStatus::is_cancellable),
    );
    template
        .replace("{returning_t}", RETURNING_FIELDS_T)
        .replace("{returning}", RETURNING_FIELDS)
        .replace("{ready_statuses}", &quoted_status_list(READY_STATUSES))
        .replace("{cancellable_statuses}", &cancellable)
        .replace("{table}", ctx.table)
        .replace("{index_prefix}", ctx.index_prefix)
        .replace("{id}", &ctx.fields.id)
        .replace("{received_at}", &ctx.fields.received_at)
        .replace("{updated_at}", &ctx.fields.updated_at)
        .replace("{available_at}", &ctx.fields.available_at)
        .replace("{status}", &ctx.fields.status)
        .replace("{failure_count}", &ctx.fields.failure_count)
        .replace("{item}", &ctx.fields.item)
}

/// Rendered statements, built once at construction.
#[derive(Debug, Clone)]
struct Statements {
    create_table: String,
    create_indexes: [String; 3],
    insert: String,
    batch_insert: String,
    claim_ready: String,
    claim_failed: String,
    claim_stuck: String,
    mark_as: String,
    complete: String,
    cancel: String,
    get_by_id: String,
    list_by_status: String,
    count_by_status: String,
    count_grouped: String,
}

impl Statements {
    fn render(ctx: &SqlContext<'_>) -> Self {
        Self {
            create_table: render(CREATE_TABLE, ctx),
            create_indexes: [
                render(CREATE_STATUS_UPDATED_AT_INDEX, ctx),
                render(CREATE_STATUS_AVAILABLE_AT_INDEX, ctx),
                render(CREATE_STATUS_INDEX, ctx),
            ],
            insert: render(INSERT_ITEM, ctx),
            batch_insert: render(BATCH_INSERT_ITEMS, ctx),
            claim_ready: render(CLAIM_READY, ctx),
            claim_failed: render(CLAIM_FAILED, ctx),
            claim_stuck: render(CLAIM_STUCK, ctx),
            mark_as: render(MARK_AS, ctx),
            complete: render(COMPLETE_IN_PROGRESS, ctx),
            cancel: render(CANCEL_ITEM, ctx),
            get_by_id: render(GET_ITEM_BY_ID, ctx),
            list_by_status: render(LIST_ITEMS_BY_STATUS, ctx),
            count_by_status: render(COUNT_ITEMS_BY_STATUS, ctx),
            count_grouped: render(COUNT_ITEMS_GROUPED, ctx),
        }
    }
}

/// Per-repository settings: where and under which names items are persisted.
#[derive(Debug, Clone)]
pub struct WorkItemSettings {
    /// Unqualified table name; qualified with the configured schema
    pub table: String,
    /// Injected column names
    pub fields: WorkItemFields,
    /// Prefix for the keys returned by [`WorkItemRepo::metrics`]
    pub metrics_prefix: String,
}

impl Default for WorkItemSettings {
    fn default() -> Self {
        Self {
            table: "work_items".to_string(),
            fields: WorkItemFields::default(),
            metrics_prefix: "work_items".to_string(),
        }
    }
}

/// Row shape shared by every statement via the `{returning}` alias list.
#[derive(Debug, sqlx::FromRow)]
struct WorkItemRow {
    id: Uuid,
    received_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    available_at: Option<DateTime<Utc>>,
    status: String,
    failure_count: i32,
    item: serde_json::Value,
}

impl WorkItemRow {
    fn into_work_item<T: Payload>(self) -> Result<WorkItem<T>> {
        let status = self
            .status
            .parse::<ProcessingStatus>()
            .map_err(|_| Error::UnknownStatus {
                value: self.status.clone(),
            })?;
        Ok(WorkItem {
            id: self.id,
            received_at: self.received_at,
            updated_at: self.updated_at,
            available_at: self.available_at,
            status,
            failure_count: self.failure_count,
            item: serde_json::from_value(self.item)?,
        })
    }
}

/// Persistent multi-producer/multi-consumer queue of [`WorkItem`]s.
///
/// Stateless apart from its pool, clock, and rendered statements; multiple
/// instances pointing at the same table are safe and interchangeable.
pub struct WorkItemRepo<T> {
    pool: PgPool,
    clock: Arc<dyn Clock>,
    table: String,
    statements: Statements,
    in_progress_retry_after: chrono::Duration,
    metrics_prefix: String,
    _payload: PhantomData<fn() -> T>,
}

impl<T> Clone for WorkItemRepo<T> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            clock: self.clock.clone(),
            table: self.table.clone(),
            statements: self.statements.clone(),
            in_progress_retry_after: self.in_progress_retry_after,
            metrics_prefix: self.metrics_prefix.clone(),
            _payload: PhantomData,
        }
    }
}

impl<T: Payload> WorkItemRepo<T> {
    /// Create a repository over `pool`.
    ///
    /// The schema, table, and field names are validated as SQL identifiers
    /// and the statements are rendered once here. `in_progress_retry_after_ms`
    /// is read from `config` at this point and fixed for the lifetime of the
    /// repository.
    pub fn new(
        pool: PgPool,
        clock: Arc<dyn Clock>,
        config: &Config,
        settings: WorkItemSettings,
    ) -> Result<Self> {
        validate_identifier("schema", &config.schema)?;
        validate_identifier("table", &settings.table)?;
        let fields = &settings.fields;
        for (name, value) in [
            ("fields.id", &fields.id),
            ("fields.received_at", &fields.received_at),
            ("fields.updated_at", &fields.updated_at),
            ("fields.available_at", &fields.available_at),
            ("fields.status", &fields.status),
            ("fields.failure_count", &fields.failure_count),
            ("fields.item", &fields.item),
        ] {
            validate_identifier(name, value)?;
        }

        let table = format!("{}.{}", config.schema, settings.table);
        let statements = Statements::render(&SqlContext {
            table: &table,
            index_prefix: &settings.table,
            fields,
        });

        Ok(Self {
            pool,
            clock,
            table,
            statements,
            in_progress_retry_after: config.in_progress_retry_after(),
            metrics_prefix: settings.metrics_prefix,
            _payload: PhantomData,
        })
    }

    /// Create the table and its indexes. Idempotent; the schema must already
    /// exist.
    ///
    /// The indexes on `(status, updated_at)`, `(status, available_at)`, and
    /// `(status)` keep the pull buckets and the metrics scan off sequential
    /// scans.
    pub async fn install(&self) -> Result<()> {
        sqlx::query(&self.statements.create_table)
            .execute(&self.pool)
            .await?;
        for statement in &self.statements.create_indexes {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::debug!(table = %self.table, "work item schema installed");
        Ok(())
    }

    /// Push a single item, available immediately, starting as `todo`.
    pub async fn push_new(&self, item: T, received_at: DateTime<Utc>) -> Result<WorkItem<T>> {
        self.push_new_with_state(item, received_at, received_at, |_| ProcessingStatus::ToDo)
            .await
    }

    /// Push a single item that becomes pullable at `available_at`.
    pub async fn push_new_at(
        &self,
        item: T,
        received_at: DateTime<Utc>,
        available_at: DateTime<Utc>,
    ) -> Result<WorkItem<T>> {
        self.push_new_with_state(item, received_at, available_at, |_| ProcessingStatus::ToDo)
            .await
    }

    /// Push a single item whose starting status is a pure function of the
    /// payload.
    pub async fn push_new_with_state<F>(
        &self,
        item: T,
        received_at: DateTime<Utc>,
        available_at: DateTime<Utc>,
        initial_state: F,
    ) -> Result<WorkItem<T>>
    where
        F: Fn(&T) -> ProcessingStatus,
    {
        let id = Uuid::new_v4();
        let status = initial_state(&item);
        let payload = serde_json::to_value(&item)?;
        let row = sqlx::query_as::<_, WorkItemRow>(&self.statements.insert)
            .bind(id)
            .bind(received_at)
            .bind(self.clock.now())
            .bind(available_at)
            .bind(status.as_str())
            .bind(&payload)
            .fetch_one(&self.pool)
            .await?;
        row.into_work_item()
    }

    /// Push a batch of items sharing `received_at`, available immediately,
    /// all starting as `todo`.
    pub async fn push_new_batch(
        &self,
        items: Vec<T>,
        received_at: DateTime<Utc>,
    ) -> Result<Vec<WorkItem<T>>> {
        self.push_new_batch_with_state(items, received_at, received_at, |_| ProcessingStatus::ToDo)
            .await
    }

    /// Push a batch of items in a single multi-row insert.
    ///
    /// All items share `received_at` and `available_at`; each item's starting
    /// status is computed by `initial_state`. Fails with
    /// [`Error::PartialInsert`] if the datastore acknowledges fewer rows than
    /// items supplied.
    pub async fn push_new_batch_with_state<F>(
        &self,
        items: Vec<T>,
        received_at: DateTime<Utc>,
        available_at: DateTime<Utc>,
        initial_state: F,
    ) -> Result<Vec<WorkItem<T>>>
    where
        F: Fn(&T) -> ProcessingStatus,
    {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let expected = items.len();
        let ids: Vec<Uuid> = (0..expected).map(|_| Uuid::new_v4()).collect();
        let statuses: Vec<String> = items
            .iter()
            .map(|item| initial_state(item).as_str().to_string())
            .collect();
        let payloads: Vec<serde_json::Value> = items
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<_, _>>()?;

        let rows = sqlx::query_as::<_, WorkItemRow>(&self.statements.batch_insert)
            .bind(&ids[..])
            .bind(received_at)
            .bind(self.clock.now())
            .bind(available_at)
            .bind(&statuses[..])
            .bind(&payloads[..])
            .fetch_all(&self.pool)
            .await?;

        if rows.len() != expected {
            tracing::warn!(
                expected,
                actual = rows.len(),
                table = %self.table,
                "batch insert acknowledged fewer rows than supplied"
            );
            return Err(Error::PartialInsert {
                expected,
                actual: rows.len(),
            });
        }
        rows.into_iter().map(WorkItemRow::into_work_item).collect()
    }

    /// Atomically select and claim the next processable item, or `None` when
    /// nothing is eligible.
    ///
    /// Selection order is a strict priority over three buckets, each a single
    /// conditional claim:
    ///
    /// 1. `todo`/`deferred` items with `available_at < available_before`;
    /// 2. `failed` items with `updated_at < failed_before` whose
    ///    `available_at` is absent or past `available_before`;
    /// 3. `in-progress` items whose `updated_at` is older than the
    ///    in-progress timeout (rescue of items held by crashed workers;
    ///    `failure_count` is not touched).
    ///
    /// Fresh work is preferred over retries, retries over rescue. The claim
    /// sets the item `in-progress` with `updated_at = now`, which hides it
    /// from other pullers until the timeout elapses again.
    pub async fn pull_outstanding(
        &self,
        failed_before: DateTime<Utc>,
        available_before: DateTime<Utc>,
    ) -> Result<Option<WorkItem<T>>> {
        let now = self.clock.now();

        let claimed = sqlx::query_as::<_, WorkItemRow>(&self.statements.claim_ready)
            .bind(now)
            .bind(available_before)
            .fetch_optional(&self.pool)
            .await?;
        if let Some(row) = claimed {
            tracing::debug!(id = %row.id, table = %self.table, "claimed ready work item");
            return row.into_work_item().map(Some);
        }

        let claimed = sqlx::query_as::<_, WorkItemRow>(&self.statements.claim_failed)
            .bind(now)
            .bind(failed_before)
            .bind(available_before)
            .fetch_optional(&self.pool)
            .await?;
        if let Some(row) = claimed {
            tracing::debug!(id = %row.id, table = %self.table, "claimed failed work item for retry");
            return row.into_work_item().map(Some);
        }

        let stuck_cutoff = now - self.in_progress_retry_after;
        let claimed = sqlx::query_as::<_, WorkItemRow>(&self.statements.claim_stuck)
            .bind(now)
            .bind(stuck_cutoff)
            .fetch_optional(&self.pool)
            .await?;
        if let Some(row) = claimed {
            tracing::debug!(id = %row.id, table = %self.table, "rescued stuck in-progress work item");
            return row.into_work_item().map(Some);
        }

        Ok(None)
    }

    /// Unconditionally transition an item to `status`.
    ///
    /// Sets `updated_at = now`. When `available_at` is `Some` the stored
    /// value is replaced, otherwise it is left untouched. A transition to
    /// `failed` atomically increments `failure_count`. Returns whether a
    /// record matched.
    pub async fn mark_as(
        &self,
        id: Uuid,
        status: ProcessingStatus,
        available_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let rows_affected = sqlx::query(&self.statements.mark_as)
            .bind(id)
            .bind(status.as_str())
            .bind(self.clock.now())
            .bind(available_at)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(rows_affected > 0)
    }

    /// Terminate an item, guarded by the item currently being `in-progress`.
    ///
    /// Only the worker that pulled an item can be holding it `in-progress`,
    /// so the guard enforces that only that worker may terminate it. Returns
    /// `false` when the item does not exist or is not `in-progress`;
    /// [`Error::InvalidResultStatus`] when `result_status` is not terminal.
    pub async fn complete(&self, id: Uuid, result_status: ProcessingStatus) -> Result<bool> {
        if !result_status.is_result() {
            return Err(Error::InvalidResultStatus {
                status: result_status,
            });
        }
        let rows_affected = sqlx::query(&self.statements.complete)
            .bind(id)
            .bind(result_status.as_str())
            .bind(self.clock.now())
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(rows_affected > 0)
    }

    /// Transition an item to `cancelled` if its current status permits it.
    pub async fn cancel(&self, id: Uuid) -> Result<StatusUpdateResult> {
        let previous: Option<String> = sqlx::query_scalar(&self.statements.cancel)
            .bind(id)
            .bind(self.clock.now())
            .fetch_optional(&self.pool)
            .await?;

        if let Some(value) = previous {
            let previous_status = value
                .parse::<ProcessingStatus>()
                .map_err(|_| Error::UnknownStatus { value })?;
            return Ok(StatusUpdateResult::Updated {
                previous_status,
                new_status: ProcessingStatus::Cancelled,
            });
        }

        // Not cancellable or gone; look again to tell the two apart.
        match self.find_by_id(id).await? {
            Some(current) => Ok(StatusUpdateResult::NotUpdated {
                current_status: current.status,
            }),
            None => Ok(StatusUpdateResult::NotFound),
        }
    }

    /// Look up an item by id.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<WorkItem<T>>> {
        let row = sqlx::query_as::<_, WorkItemRow>(&self.statements.get_by_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(WorkItemRow::into_work_item).transpose()
    }

    /// List items in a given status, most recently transitioned first.
    pub async fn find_by_status(
        &self,
        status: ProcessingStatus,
        limit: i64,
    ) -> Result<Vec<WorkItem<T>>> {
        let rows = sqlx::query_as::<_, WorkItemRow>(&self.statements.list_by_status)
            .bind(status.as_str())
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(WorkItemRow::into_work_item).collect()
    }

    /// Number of items currently in `status`.
    pub async fn count(&self, status: ProcessingStatus) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(&self.statements.count_by_status)
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Per-status counts keyed `"<prefix>.<status>"`, zero-filled for every
    /// known status. The telemetry surface of the queue.
    pub async fn metrics(&self) -> Result<HashMap<String, i64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(&self.statements.count_grouped)
            .fetch_all(&self.pool)
            .await?;

        let mut metrics: HashMap<String, i64> = ProcessingStatus::ALL
            .iter()
            .map(|status| (format!("{}.{}", self.metrics_prefix, status), 0))
            .collect();
        for (status, count) in rows {
            metrics.insert(format!("{}.{}", self.metrics_prefix, status), count);
        }
        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context_with(fields: &WorkItemFields) -> Statements {
        Statements::render(&SqlContext {
            table: "public.work_items",
            index_prefix: "work_items",
            fields,
        })
    }

    fn assert_fully_rendered(sql: &str) {
        assert!(
            !sql.contains('{') && !sql.contains('}'),
            "unrendered placeholder in: {sql}"
        );
    }

    #[test]
    fn all_statements_render_without_placeholders() {
        let statements = context_with(&WorkItemFields::default());
        for sql in [
            &statements.create_table,
            &statements.insert,
            &statements.batch_insert,
            &statements.claim_ready,
            &statements.claim_failed,
            &statements.claim_stuck,
            &statements.mark_as,
            &statements.complete,
            &statements.cancel,
            &statements.get_by_id,
            &statements.list_by_status,
            &statements.count_by_status,
            &statements.count_grouped,
        ] {
            assert_fully_rendered(sql);
        }
        for sql in &statements.create_indexes {
            assert_fully_rendered(sql);
        }
    }

    #[test]
    fn claim_ready_covers_todo_and_deferred() {
        let statements = context_with(&WorkItemFields::default());
        assert!(statements.claim_ready.contains("IN ('todo', 'deferred')"));
        assert!(statements.claim_ready.contains("FOR UPDATE SKIP LOCKED"));
        assert!(statements.claim_ready.contains("SET status = 'in-progress'"));
    }

    #[test]
    fn claim_failed_keeps_legacy_null_disjunction() {
        let statements = context_with(&WorkItemFields::default());
        assert!(statements
            .claim_failed
            .contains("available_at IS NULL OR available_at < $3"));
    }

    #[test]
    fn mark_as_increments_failure_count_only_for_failed() {
        let statements = context_with(&WorkItemFields::default());
        assert!(statements
            .mark_as
            .contains("CASE WHEN $2 = 'failed' THEN 1 ELSE 0 END"));
    }

    #[test]
    fn cancel_is_guarded_by_the_cancellable_set() {
        let statements = context_with(&WorkItemFields::default());
        assert!(statements
            .cancel
            .contains("IN ('todo', 'in-progress', 'failed', 'deferred')"));
    }

    #[test]
    fn injected_field_names_flow_into_statements() {
        let fields = WorkItemFields {
            id: "workitem_id".to_string(),
            received_at: "receivedat".to_string(),
            updated_at: "updatedat".to_string(),
            available_at: "availableat".to_string(),
            status: "state".to_string(),
            failure_count: "failures".to_string(),
            item: "body".to_string(),
        };
        let statements = context_with(&fields);

        assert!(statements.insert.contains("workitem_id"));
        assert!(statements.claim_failed.contains("availableat IS NULL"));
        assert!(statements
            .mark_as
            .contains("failures = failures + CASE WHEN"));
        // Aliases keep the decoded row shape stable under injected names.
        assert!(statements.get_by_id.contains("workitem_id AS id"));
        assert!(statements.get_by_id.contains("state AS status"));
        assert_fully_rendered(&statements.insert);
    }

    #[test]
    fn index_statements_are_idempotent_and_ascending() {
        let statements = context_with(&WorkItemFields::default());
        for sql in &statements.create_indexes {
            assert!(sql.contains("IF NOT EXISTS"));
        }
        assert!(statements.create_indexes[0].contains("(status ASC, updated_at ASC)"));
        assert!(statements.create_indexes[1].contains("(status ASC, available_at ASC)"));
        assert!(statements.create_indexes[2].contains("(status ASC)"));
    }
}
