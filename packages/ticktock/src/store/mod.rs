//! Durable ledger of jobs. The trait is the seam the scheduler depends on;
//! [`sqlite::SqliteJobStore`] is the production backend, [`memory::InMemoryJobStore`]
//! is the in-process test double.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageError;
use crate::model::{Job, JobPage, NewJob};

pub use memory::InMemoryJobStore;
pub use sqlite::SqliteJobStore;

/// Filter applied to `GetJobsPaginated`. `All` means no status filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    All,
    Status(crate::model::JobStatus),
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Assigns an id, persists with `status=pending`, returns the id.
    async fn insert(&self, job: &NewJob, due_at_utc: DateTime<Utc>) -> Result<i64, StorageError>;

    /// Unconditional status write. Idempotent.
    async fn mark_enqueued(&self, id: i64) -> Result<(), StorageError>;

    /// Unconditional status write. Idempotent.
    async fn mark_cancelled(&self, id: i64) -> Result<(), StorageError>;

    /// Unconditional status write. Idempotent.
    async fn mark_completed(&self, id: i64) -> Result<(), StorageError>;

    /// All `pending` jobs with `due_at_utc >= cutoff`, ordered by
    /// `due_at_utc` ascending. Used at startup.
    async fn load_pending_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<Job>, StorageError>;

    /// Offset-paginated read path for the admin surface.
    async fn get_jobs_paginated(
        &self,
        status: StatusFilter,
        page: i64,
        limit: i64,
    ) -> Result<JobPage, StorageError>;

    /// Convenience read used by the admin list view: pending or enqueued
    /// jobs ordered by due instant, capped at `limit`.
    async fn get_upcoming(&self, limit: i64) -> Result<Vec<Job>, StorageError>;

    /// Fetches a single job by id.
    async fn get(&self, id: i64) -> Result<Job, StorageError>;
}
