//! End-to-end tests wiring the store, wheel, and scheduler together with
//! in-memory test doubles for the broker and job store.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use ticktock_core::broker::TestBroker;
use ticktock_core::clock::SystemClock;
use ticktock_core::model::{message_key, JobStatus, NewJob};
use ticktock_core::store::InMemoryJobStore;
use ticktock_core::wheel::Wheel;
use ticktock_core::Scheduler;

#[tokio::test]
async fn create_and_fire_reaches_enqueued() {
    let clock = Arc::new(SystemClock);
    let store = Arc::new(InMemoryJobStore::new());
    let broker = Arc::new(TestBroker::new());
    let wheel = Wheel::new(Duration::from_millis(20), 16, clock.clone()).unwrap();
    wheel.start();
    let scheduler = Scheduler::new(
        store.clone(),
        broker.clone(),
        wheel.clone(),
        clock.clone(),
        Duration::from_secs(600),
    );

    let now = chrono::Utc::now();
    let new_job = NewJob::builder()
        .title("pay rent".to_string())
        .tz("UTC".to_string())
        .run_at_utc(now + chrono::Duration::milliseconds(100))
        .remind_before_minutes(0)
        .build();
    let due_at = new_job.validate(now).unwrap();
    let id = store.insert(&new_job, due_at).await.unwrap();
    let job = store.get(id).await.unwrap();

    scheduler.schedule_new(job).await;

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(broker.was_published_with_key(&message_key(id)));
    let stored = store.get(id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Enqueued);

    wheel.stop(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn cancel_before_fire_still_lets_timer_fire_but_store_shows_cancelled() {
    let clock = Arc::new(SystemClock);
    let store = Arc::new(InMemoryJobStore::new());
    let broker = Arc::new(TestBroker::new());
    let wheel = Wheel::new(Duration::from_millis(10), 16, clock.clone()).unwrap();
    wheel.start();
    let scheduler = Scheduler::new(
        store.clone(),
        broker.clone(),
        wheel.clone(),
        clock,
        Duration::from_secs(600),
    );

    let now = Utc::now();
    let new_job = NewJob::builder()
        .title("dentist appointment".to_string())
        .tz("UTC".to_string())
        .run_at_utc(now + chrono::Duration::milliseconds(150))
        .remind_before_minutes(0)
        .build();
    let due_at = new_job.validate(now).unwrap();
    let id = store.insert(&new_job, due_at).await.unwrap();
    let job = store.get(id).await.unwrap();

    scheduler.schedule_new(job).await;

    // admin cancel races with the pending fire; cancellation coupling does
    // not touch the wheel, only the store row.
    store.mark_cancelled(id).await.unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;

    // the timer still fired and published a message...
    assert!(broker.was_published_with_key(&message_key(id)));
    // ...but mark_enqueued lost the race against our direct cancel, so the
    // store is left however the two writers last left it. Either outcome
    // is acceptable per the documented cancel/fire race policy; what must
    // hold is that the row is never silently reverted to pending.
    let stored = store.get(id).await.unwrap();
    assert!(matches!(stored.status, JobStatus::Cancelled | JobStatus::Enqueued));

    wheel.stop(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn zero_remind_before_minutes_means_due_equals_run_at() {
    let run_at = Utc.with_ymd_and_hms(2030, 6, 1, 12, 0, 0).unwrap();
    let new_job = NewJob::builder()
        .title("zero lead time".to_string())
        .tz("UTC".to_string())
        .run_at_utc(run_at)
        .remind_before_minutes(0)
        .build();
    let due_at = new_job.validate(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()).unwrap();
    assert_eq!(due_at, run_at);
}
