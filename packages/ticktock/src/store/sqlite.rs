//! SQLite-backed job store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};

use crate::error::StorageError;
use crate::model::{Job, JobPage, JobStatus, NewJob};

use super::{JobStore, StatusFilter};

pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    /// Opens (creating if absent) the database at `path` and runs pending
    /// migrations.
    pub async fn connect(path: &str) -> Result<Self, StorageError> {
        let url = if path.contains("://") {
            path.to_string()
        } else {
            format!("sqlite://{path}?mode=rwc")
        };
        let pool = SqlitePoolOptions::new().max_connections(5).connect(&url).await?;
        sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
            StorageError::Database(sqlx::Error::Migrate(Box::new(e)))
        })?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_job(row: sqlx::sqlite::SqliteRow) -> Result<Job, StorageError> {
        let status_str: String = row.try_get("status")?;
        let status = status_str
            .parse::<JobStatus>()
            .unwrap_or(JobStatus::Pending);
        Ok(Job {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            tz: row.try_get("tz")?,
            run_at_utc: row.try_get("run_at_utc")?,
            due_at_utc: row.try_get("due_at_utc")?,
            remind_before_minutes: row.try_get("remind_before_minutes")?,
            status,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn insert(&self, job: &NewJob, due_at_utc: DateTime<Utc>) -> Result<i64, StorageError> {
        let now = Utc::now();
        let rec = sqlx::query(
            r#"
            INSERT INTO jobs (title, tz, run_at_utc, due_at_utc, remind_before_minutes, status, created_at)
            VALUES (?, ?, ?, ?, ?, 'pending', ?)
            "#,
        )
        .bind(&job.title)
        .bind(&job.tz)
        .bind(job.run_at_utc)
        .bind(due_at_utc)
        .bind(job.remind_before_minutes)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(rec.last_insert_rowid())
    }

    async fn mark_enqueued(&self, id: i64) -> Result<(), StorageError> {
        sqlx::query("UPDATE jobs SET status = 'enqueued' WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_cancelled(&self, id: i64) -> Result<(), StorageError> {
        sqlx::query("UPDATE jobs SET status = 'cancelled' WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_completed(&self, id: i64) -> Result<(), StorageError> {
        sqlx::query("UPDATE jobs SET status = 'completed' WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn load_pending_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<Job>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT id, title, tz, run_at_utc, due_at_utc, remind_before_minutes, status, created_at
            FROM jobs
            WHERE status = 'pending' AND due_at_utc >= ?
            ORDER BY due_at_utc ASC
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_job).collect()
    }

    async fn get_jobs_paginated(
        &self,
        status: StatusFilter,
        page: i64,
        limit: i64,
    ) -> Result<JobPage, StorageError> {
        let page = page.max(1);
        let limit = limit.max(1);
        let offset = (page - 1) * limit;

        let (rows, total) = match status {
            StatusFilter::All => {
                let rows = sqlx::query(
                    r#"
                    SELECT id, title, tz, run_at_utc, due_at_utc, remind_before_minutes, status, created_at
                    FROM jobs ORDER BY due_at_utc ASC LIMIT ? OFFSET ?
                    "#,
                )
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?;
                let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
                    .fetch_one(&self.pool)
                    .await?;
                (rows, total)
            }
            StatusFilter::Status(s) => {
                let rows = sqlx::query(
                    r#"
                    SELECT id, title, tz, run_at_utc, due_at_utc, remind_before_minutes, status, created_at
                    FROM jobs WHERE status = ? ORDER BY due_at_utc ASC LIMIT ? OFFSET ?
                    "#,
                )
                .bind(s.as_str())
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?;
                let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE status = ?")
                    .bind(s.as_str())
                    .fetch_one(&self.pool)
                    .await?;
                (rows, total)
            }
        };

        let rows = rows
            .into_iter()
            .map(Self::row_to_job)
            .collect::<Result<Vec<_>, _>>()?;
        let total_pages = (total + limit - 1) / limit.max(1);

        Ok(JobPage {
            rows,
            total,
            total_pages: total_pages.max(1),
            has_next: page < total_pages,
            has_prev: page > 1,
        })
    }

    async fn get_upcoming(&self, limit: i64) -> Result<Vec<Job>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT id, title, tz, run_at_utc, due_at_utc, remind_before_minutes, status, created_at
            FROM jobs
            WHERE status IN ('pending', 'enqueued')
            ORDER BY due_at_utc ASC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_job).collect()
    }

    async fn get(&self, id: i64) -> Result<Job, StorageError> {
        let row = sqlx::query(
            r#"
            SELECT id, title, tz, run_at_utc, due_at_utc, remind_before_minutes, status, created_at
            FROM jobs WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StorageError::NotFound(id))?;
        Self::row_to_job(row)
    }
}
