//! Glue between the job store, the timing wheel, and the broker publisher.
//!
//! On job creation the scheduler places a timer on the wheel whose body
//! publishes the due event and marks the job enqueued; at boot it warms up
//! from the store so a crash doesn't lose pending reminders within the
//! warmup window.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::broker::Publisher;
use crate::clock::Clock;
use crate::error::StorageError;
use crate::model::{message_key, DueEvent, Job};
use crate::store::JobStore;
use crate::wheel::Wheel;

const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct Scheduler {
    store: Arc<dyn JobStore>,
    publisher: Arc<dyn Publisher>,
    wheel: Wheel,
    clock: Arc<dyn Clock>,
    warmup_window: Duration,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn JobStore>,
        publisher: Arc<dyn Publisher>,
        wheel: Wheel,
        clock: Arc<dyn Clock>,
        warmup_window: Duration,
    ) -> Self {
        Self {
            store,
            publisher,
            wheel,
            clock,
            warmup_window,
        }
    }

    /// Places a timer for `job`'s due instant. The fire task publishes the
    /// due event and marks the job enqueued; failures leave it `pending`
    /// for a future warmup or operator reschedule to retry.
    pub async fn schedule_new(&self, job: Job) -> u64 {
        let deadline = job.due_at_utc.max(self.clock.now());
        let store = self.store.clone();
        let publisher = self.publisher.clone();
        let task: crate::wheel::Task = Box::new(move || {
            Box::pin(async move {
                fire(store, publisher, job).await;
            })
        });
        self.wheel.at(deadline, task).await
    }

    /// Loads all pending jobs whose due instant is within the warmup
    /// window and schedules each. Jobs older than the window are left
    /// pending; an operator action can reschedule them explicitly via
    /// `reschedule_all_pending`. Returns the number of jobs scheduled.
    pub async fn warmup(&self) -> Result<usize, StorageError> {
        let cutoff = self.clock.now() - chrono::Duration::from_std(self.warmup_window).unwrap_or_default();
        let jobs = self.store.load_pending_since(cutoff).await?;
        let count = jobs.len();
        for job in jobs {
            tracing::info!(job_id = job.id, due_at_utc = %job.due_at_utc, "warmup scheduling job");
            self.schedule_new(job).await;
        }
        Ok(count)
    }

    /// Operator action: reschedules every currently pending job regardless
    /// of its age, closing the gap warmup's bounded window leaves on
    /// purpose. Returns the number of jobs scheduled.
    pub async fn reschedule_all_pending(&self) -> Result<usize, StorageError> {
        let jobs = self
            .store
            .load_pending_since(chrono::DateTime::<Utc>::MIN_UTC)
            .await?;
        let count = jobs.len();
        for job in jobs {
            tracing::info!(job_id = job.id, "operator reschedule");
            self.schedule_new(job).await;
        }
        Ok(count)
    }
}

async fn fire(store: Arc<dyn JobStore>, publisher: Arc<dyn Publisher>, job: Job) {
    let event = DueEvent::from(&job);
    let key = message_key(job.id);
    let payload = match serde_json::to_value(&event) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!(job_id = job.id, error = %e, "failed to serialize due event");
            return;
        }
    };

    let publish_result =
        tokio::time::timeout(PUBLISH_TIMEOUT, publisher.publish_json(&payload, &key)).await;

    match publish_result {
        Ok(Ok(())) => match store.mark_enqueued(job.id).await {
            Ok(()) => tracing::info!(job_id = job.id, "job enqueued"),
            Err(e) => {
                tracing::error!(job_id = job.id, error = %e, "publish succeeded but mark_enqueued failed; job stays pending")
            }
        },
        Ok(Err(e)) => {
            tracing::error!(job_id = job.id, error = %e, "publish failed; job stays pending")
        }
        Err(_) => {
            tracing::error!(job_id = job.id, "publish timed out after 5s; job stays pending")
        }
    }
}
