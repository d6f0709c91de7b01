//! Core types for worklock: work items, processing statuses, and locks.
//!
//! This module defines the main data structures used by the two repositories.
//!
//! ## What
//!
//! - [`WorkItem`] represents a persistent unit of work wrapping a user payload.
//! - [`ProcessingStatus`] is the closed set of states an item moves through.
//! - [`StatusUpdateResult`] is the typed outcome of a cancellation attempt.
//! - [`Lock`] is a named mutual-exclusion record bounded by a TTL.
//! - [`WorkItemFields`] injects the persisted column names so existing
//!   collection schemas can be kept.
//!
//! ## How
//!
//! The status strings (`"todo"`, `"in-progress"`, ...) are part of the wire
//! contract; `Display`, `FromStr`, and the serde encoding all agree on them,
//! and data compatibility depends on the mapping staying fixed.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::{self};
use uuid::Uuid;

/// A persistent unit of work wrapping a user payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem<T> {
    /// Unique item ID, minted at push time
    pub id: Uuid,
    /// When the producer handed the item to the queue; immutable
    pub received_at: DateTime<Utc>,
    /// Time of the last status transition
    pub updated_at: DateTime<Utc>,
    /// Earliest instant the item may be pulled. Always present on records
    /// written by this crate; `None` on rows that predate the column.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_at: Option<DateTime<Utc>>,
    /// Current processing state
    pub status: ProcessingStatus,
    /// Cumulative number of transitions that landed on [`ProcessingStatus::Failed`]
    pub failure_count: i32,
    /// User payload; opaque to the repositories
    pub item: T,
}

impl<T> fmt::Display for WorkItem<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "WorkItem {{ id: {}, status: {}, failure_count: {}, received_at: {}, updated_at: {} }}",
            self.id, self.status, self.failure_count, self.received_at, self.updated_at
        )
    }
}

impl<T> WorkItem<T> {
    /// Time spent between arrival and the last status transition.
    pub fn processing_duration(&self) -> chrono::Duration {
        self.updated_at - self.received_at
    }
}

/// Processing state of a [`WorkItem`].
///
/// The serialized form is the short kebab-case string shown on each variant;
/// it is persisted as-is and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessingStatus {
    /// Ready for pickup once `available_at` is reached
    #[serde(rename = "todo")]
    ToDo,
    /// A worker owns the item; hidden from other pullers until the
    /// in-progress timeout elapses
    InProgress,
    /// Terminal: processed successfully
    Succeeded,
    /// Retryable failure; re-pulled once the `failed_before` cutoff passes
    Failed,
    /// Terminal: will not be retried
    PermanentlyFailed,
    /// Terminal: explicitly skipped
    Ignored,
    /// Terminal: detected duplicate
    Duplicate,
    /// Like `ToDo` but logically postponed; same pull treatment as `ToDo`
    Deferred,
    /// Terminal: cancelled by operator request
    Cancelled,
}

impl ProcessingStatus {
    /// All status values, in declaration order. Used to zero-fill metrics.
    pub const ALL: [ProcessingStatus; 9] = [
        ProcessingStatus::ToDo,
        ProcessingStatus::InProgress,
        ProcessingStatus::Succeeded,
        ProcessingStatus::Failed,
        ProcessingStatus::PermanentlyFailed,
        ProcessingStatus::Ignored,
        ProcessingStatus::Duplicate,
        ProcessingStatus::Deferred,
        ProcessingStatus::Cancelled,
    ];

    /// The persisted wire string for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::ToDo => "todo",
            ProcessingStatus::InProgress => "in-progress",
            ProcessingStatus::Succeeded => "succeeded",
            ProcessingStatus::Failed => "failed",
            ProcessingStatus::PermanentlyFailed => "permanently-failed",
            ProcessingStatus::Ignored => "ignored",
            ProcessingStatus::Duplicate => "duplicate",
            ProcessingStatus::Deferred => "deferred",
            ProcessingStatus::Cancelled => "cancelled",
        }
    }

    /// Whether this status is terminal and may be passed to
    /// [`complete`](crate::work_items::WorkItemRepo::complete).
    pub fn is_result(&self) -> bool {
        matches!(
            self,
            ProcessingStatus::Succeeded
                | ProcessingStatus::PermanentlyFailed
                | ProcessingStatus::Ignored
                | ProcessingStatus::Duplicate
                | ProcessingStatus::Cancelled
        )
    }

    /// Whether a transition to [`ProcessingStatus::Cancelled`] is permitted
    /// from this status.
    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            ProcessingStatus::ToDo
                | ProcessingStatus::Failed
                | ProcessingStatus::InProgress
                | ProcessingStatus::Deferred
        )
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ProcessingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(ProcessingStatus::ToDo),
            "in-progress" => Ok(ProcessingStatus::InProgress),
            "succeeded" => Ok(ProcessingStatus::Succeeded),
            "failed" => Ok(ProcessingStatus::Failed),
            "permanently-failed" => Ok(ProcessingStatus::PermanentlyFailed),
            "ignored" => Ok(ProcessingStatus::Ignored),
            "duplicate" => Ok(ProcessingStatus::Duplicate),
            "deferred" => Ok(ProcessingStatus::Deferred),
            "cancelled" => Ok(ProcessingStatus::Cancelled),
            _ => Err(format!("Invalid processing status: {}", s)),
        }
    }
}

/// Outcome of [`cancel`](crate::work_items::WorkItemRepo::cancel).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUpdateResult {
    /// The transition occurred
    Updated {
        previous_status: ProcessingStatus,
        new_status: ProcessingStatus,
    },
    /// The item exists but its current status is not cancellable
    NotUpdated { current_status: ProcessingStatus },
    /// No record matches the id
    NotFound,
}

/// A named mutual-exclusion record.
///
/// A lock is held by `owner` iff the record exists with that owner and
/// `now < expiry_time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Lock {
    /// The lock name; unique key
    pub name: String,
    /// Identity claiming the lock, typically a process or instance id
    pub owner: String,
    /// Acquisition time
    pub time_created: DateTime<Utc>,
    /// Instant at which the lock is considered free regardless of owner
    pub expiry_time: DateTime<Utc>,
}

impl fmt::Display for Lock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Lock {{ name: {}, owner: {}, expiry_time: {} }}",
            self.name, self.owner, self.expiry_time
        )
    }
}

/// Column names under which work items are persisted.
///
/// Injected at repository construction so the repository can run against
/// pre-existing schemas. Names must be plain SQL identifiers (letters,
/// digits, underscores); they are validated at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItemFields {
    pub id: String,
    pub received_at: String,
    pub updated_at: String,
    pub available_at: String,
    pub status: String,
    pub failure_count: String,
    pub item: String,
}

impl Default for WorkItemFields {
    fn default() -> Self {
        Self {
            id: "id".to_string(),
            received_at: "received_at".to_string(),
            updated_at: "updated_at".to_string(),
            available_at: "available_at".to_string(),
            status: "status".to_string(),
            failure_count: "failure_count".to_string(),
            item: "item".to_string(),
        }
    }
}

/// Marker trait alias for payload types the queue can persist.
///
/// Blanket-implemented; payloads only need serde support.
pub trait Payload: Serialize + DeserializeOwned + Send + Sync {}

impl<T> Payload for T where T: Serialize + DeserializeOwned + Send + Sync {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_wire_strings_round_trip() {
        for status in ProcessingStatus::ALL {
            let encoded = status.as_str();
            assert_eq!(ProcessingStatus::from_str(encoded).unwrap(), status);
            assert_eq!(status.to_string(), encoded);
        }
    }

    #[test]
    fn status_wire_strings_are_fixed() {
        let expected = [
            "todo",
            "in-progress",
            "succeeded",
            "failed",
            "permanently-failed",
            "ignored",
            "duplicate",
            "deferred",
            "cancelled",
        ];
        for (status, wire) in ProcessingStatus::ALL.iter().zip(expected) {
            assert_eq!(status.as_str(), wire);
        }
    }

    #[test]
    fn serde_encoding_matches_wire_strings() {
        for status in ProcessingStatus::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            let decoded: ProcessingStatus = serde_json::from_str(&json).unwrap();
            assert_eq!(decoded, status);
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!(ProcessingStatus::from_str("to-do").is_err());
        assert!(ProcessingStatus::from_str("TODO").is_err());
        assert!(ProcessingStatus::from_str("").is_err());
    }

    #[test]
    fn result_statuses_are_the_terminal_ones() {
        let results: Vec<ProcessingStatus> = ProcessingStatus::ALL
            .into_iter()
            .filter(ProcessingStatus::is_result)
            .collect();
        assert_eq!(
            results,
            vec![
                ProcessingStatus::Succeeded,
                ProcessingStatus::PermanentlyFailed,
                ProcessingStatus::Ignored,
                ProcessingStatus::Duplicate,
                ProcessingStatus::Cancelled,
            ]
        );
    }

    #[test]
    fn cancellable_statuses_exclude_terminal_ones() {
        let cancellable: Vec<ProcessingStatus> = ProcessingStatus::ALL
            .into_iter()
            .filter(ProcessingStatus::is_cancellable)
            .collect();
        assert_eq!(
            cancellable,
            vec![
                ProcessingStatus::ToDo,
                ProcessingStatus::InProgress,
                ProcessingStatus::Failed,
                ProcessingStatus::Deferred,
            ]
        );
        for status in ProcessingStatus::ALL {
            assert!(
                !(status.is_result() && status.is_cancellable()),
                "{status} must not be both terminal and cancellable"
            );
        }
    }

    #[test]
    fn default_field_names_match_schema() {
        let fields = WorkItemFields::default();
        assert_eq!(fields.id, "id");
        assert_eq!(fields.available_at, "available_at");
        assert_eq!(fields.failure_count, "failure_count");
    }
}
