//! In-process job store used by scheduler and wheel tests, mirroring the
//! teacher's `TestJobManager` pattern: a mutex-guarded vector standing in
//! for the database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;

use crate::error::StorageError;
use crate::model::{Job, JobPage, JobStatus, NewJob};

use super::{JobStore, StatusFilter};

pub struct InMemoryJobStore {
    jobs: Mutex<Vec<Job>>,
    next_id: Mutex<i64>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            next_id: Mutex::new(1),
        }
    }

    /// Snapshot of every job, for assertions in tests.
    pub fn snapshot(&self) -> Vec<Job> {
        self.jobs.lock().expect("jobs mutex poisoned").clone()
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: &NewJob, due_at_utc: DateTime<Utc>) -> Result<i64, StorageError> {
        let mut next_id = self.next_id.lock().expect("next_id mutex poisoned");
        let id = *next_id;
        *next_id += 1;
        self.jobs.lock().expect("jobs mutex poisoned").push(Job {
            id,
            title: job.title.clone(),
            tz: job.tz.clone(),
            run_at_utc: job.run_at_utc,
            due_at_utc,
            remind_before_minutes: job.remind_before_minutes,
            status: JobStatus::Pending,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn mark_enqueued(&self, id: i64) -> Result<(), StorageError> {
        self.set_status(id, JobStatus::Enqueued)
    }

    async fn mark_cancelled(&self, id: i64) -> Result<(), StorageError> {
        self.set_status(id, JobStatus::Cancelled)
    }

    async fn mark_completed(&self, id: i64) -> Result<(), StorageError> {
        self.set_status(id, JobStatus::Completed)
    }

    async fn load_pending_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<Job>, StorageError> {
        let mut jobs: Vec<Job> = self
            .jobs
            .lock()
            .expect("jobs mutex poisoned")
            .iter()
            .filter(|j| j.status == JobStatus::Pending && j.due_at_utc >= cutoff)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.due_at_utc);
        Ok(jobs)
    }

    async fn get_jobs_paginated(
        &self,
        status: StatusFilter,
        page: i64,
        limit: i64,
    ) -> Result<JobPage, StorageError> {
        let page = page.max(1);
        let limit = limit.max(1);
        let mut jobs: Vec<Job> = self
            .jobs
            .lock()
            .expect("jobs mutex poisoned")
            .iter()
            .filter(|j| match status {
                StatusFilter::All => true,
                StatusFilter::Status(s) => j.status == s,
            })
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.due_at_utc);

        let total = jobs.len() as i64;
        let total_pages = ((total + limit - 1) / limit).max(1);
        let start = ((page - 1) * limit) as usize;
        let rows = jobs.into_iter().skip(start).take(limit as usize).collect();

        Ok(JobPage {
            rows,
            total,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        })
    }

    async fn get_upcoming(&self, limit: i64) -> Result<Vec<Job>, StorageError> {
        let mut jobs: Vec<Job> = self
            .jobs
            .lock()
            .expect("jobs mutex poisoned")
            .iter()
            .filter(|j| matches!(j.status, JobStatus::Pending | JobStatus::Enqueued))
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.due_at_utc);
        jobs.truncate(limit.max(0) as usize);
        Ok(jobs)
    }

    async fn get(&self, id: i64) -> Result<Job, StorageError> {
        self.jobs
            .lock()
            .expect("jobs mutex poisoned")
            .iter()
            .find(|j| j.id == id)
            .cloned()
            .ok_or(StorageError::NotFound(id))
    }
}

impl InMemoryJobStore {
    fn set_status(&self, id: i64, status: JobStatus) -> Result<(), StorageError> {
        let mut jobs = self.jobs.lock().expect("jobs mutex poisoned");
        let job = jobs.iter_mut().find(|j| j.id == id).ok_or(StorageError::NotFound(id))?;
        job.status = status;
        Ok(())
    }
}
