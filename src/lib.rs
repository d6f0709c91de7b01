//! # worklock
//!
//! `worklock` is a library-only PostgreSQL-backed pair of infrastructure
//! primitives for Rust applications:
//!
//! - a **persistent work-item queue** ([`WorkItemRepo`]) used by multiple
//!   workers to safely pull, process, retry, and complete units of work; and
//! - a **named distributed lock registry** ([`LockRepo`]) for mutual
//!   exclusion between cooperating processes.
//!
//! ## Features
//! - **Lightweight**: no servers to operate; use `worklock` directly as a
//!   library.
//! - **Safe under concurrency**: every state transition is a single
//!   conditional statement; claims use PostgreSQL's `SKIP LOCKED` so at most
//!   one worker wins a given item, and lock acquisition collapses racing
//!   upserts onto a primary-key row.
//! - **Crash-tolerant**: items stuck `in-progress` past a configurable
//!   timeout become pullable again; expired locks are taken over.
//! - **Testable time**: all time comparisons go through an injectable
//!   [`Clock`].
//!
//! ## Example
//!
//! ### Producer
//! ```no_run
//! use worklock::WorkItemRepo;
//! use serde_json::Value;
//!
//! /// Hand one payload to the queue.
//! async fn enqueue_job(repo: &WorkItemRepo<Value>, payload: Value) -> worklock::Result<()> {
//!     let item = repo.push_new(payload, chrono::Utc::now()).await?;
//!     println!("queued {}", item.id);
//!     Ok(())
//! }
//! ```
//!
//! ### Worker
//! ```no_run
//! use worklock::{ProcessingStatus, WorkItemRepo};
//! use serde_json::Value;
//!
//! /// Drain everything currently eligible, marking each item done.
//! async fn drain(repo: &WorkItemRepo<Value>) -> worklock::Result<()> {
//!     let now = chrono::Utc::now();
//!     let retry_failed_before = now - chrono::Duration::minutes(10);
//!     while let Some(item) = repo.pull_outstanding(retry_failed_before, now).await? {
//!         println!("processing {}", item.item);
//!         repo.complete(item.id, ProcessingStatus::Succeeded).await?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ### Locking
//! ```no_run
//! use worklock::LockRepo;
//!
//! /// Run `migrate` on exactly one instance.
//! async fn migrate_once(locks: &LockRepo, instance_id: &str) -> worklock::Result<()> {
//!     if locks.lock("schema-migration", instance_id, chrono::Duration::minutes(5)).await? {
//!         // ... perform the migration ...
//!         locks.release("schema-migration", instance_id).await?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod locks;
pub mod pool;
pub mod types;
pub mod work_items;

pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::config::Config;
pub use crate::error::{Error, Result};
pub use crate::locks::LockRepo;
pub use crate::pool::create_pool;
pub use crate::types::{
    Lock, ProcessingStatus, StatusUpdateResult, WorkItem, WorkItemFields,
};
pub use crate::work_items::{WorkItemRepo, WorkItemSettings};
