//! Persisted job model and its status lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use typed_builder::TypedBuilder;

use crate::error::ValidationError;

/// A job's position in its lifecycle.
///
/// `pending -> enqueued` is performed only by the core (the scheduler, on
/// fire). `pending -> cancelled` is performed by the admin path. `enqueued ->
/// completed` is applied by an external consumer, never by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Enqueued,
    Completed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Enqueued => "enqueued",
            JobStatus::Completed => "completed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "enqueued" => Ok(JobStatus::Enqueued),
            "completed" => Ok(JobStatus::Completed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// A persisted reminder job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub title: String,
    pub tz: String,
    pub run_at_utc: DateTime<Utc>,
    pub due_at_utc: DateTime<Utc>,
    pub remind_before_minutes: i64,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
}

/// Fields required to create a new job; validated before it reaches the
/// store. `due_at_utc` is derived, never supplied by the caller.
#[derive(Debug, Clone, TypedBuilder)]
pub struct NewJob {
    pub title: String,
    pub tz: String,
    pub run_at_utc: DateTime<Utc>,
    pub remind_before_minutes: i64,
}

impl NewJob {
    /// Validates the job and computes `due_at_utc`. `now` is threaded
    /// through rather than read from the clock so this stays a pure
    /// function callers (and tests) can exercise deterministically.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, ValidationError> {
        if self.title.trim().chars().count() < 3 {
            return Err(ValidationError::TitleTooShort);
        }
        if self.tz.parse::<chrono_tz::Tz>().is_err() {
            return Err(ValidationError::UnknownTimezone(self.tz.clone()));
        }
        if !(0..=10_080).contains(&self.remind_before_minutes) {
            return Err(ValidationError::RemindBeforeOutOfRange(
                self.remind_before_minutes,
            ));
        }
        let due_at_utc = self.run_at_utc - chrono::Duration::minutes(self.remind_before_minutes);
        if self.run_at_utc < now {
            return Err(ValidationError::RunAtInPast);
        }
        Ok(due_at_utc)
    }
}

/// The payload published to the broker when a job's due instant arrives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DueEvent {
    pub id: i64,
    pub title: String,
    pub run_at_utc: DateTime<Utc>,
    pub due_at_utc: DateTime<Utc>,
    pub tz: String,
}

impl From<&Job> for DueEvent {
    fn from(job: &Job) -> Self {
        DueEvent {
            id: job.id,
            title: job.title.clone(),
            run_at_utc: job.run_at_utc,
            due_at_utc: job.due_at_utc,
            tz: job.tz.clone(),
        }
    }
}

/// The stable routing key used for a job's due event. Pinned to `"job-" +
/// id` rather than a timestamp-derived key (the source's `keyFor` generated
/// non-unique, collision-prone keys).
pub fn message_key(id: i64) -> String {
    format!("job-{id}")
}

/// A page of jobs returned by `GetJobsPaginated`.
#[derive(Debug, Clone, Serialize)]
pub struct JobPage {
    pub rows: Vec<Job>,
    pub total: i64,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
}
