use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use crate::model::{JobStatus, NewJob};
use crate::store::StatusFilter;

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    status: Option<String>,
    #[serde(default = "default_page")]
    page: i64,
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    50
}

pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> impl IntoResponse {
    let filter = match params.status.as_deref() {
        None | Some("all") => StatusFilter::All,
        Some(other) => match other.parse::<JobStatus>() {
            Ok(s) => StatusFilter::Status(s),
            Err(_) => return (StatusCode::BAD_REQUEST, format!("unknown status: {other}")).into_response(),
        },
    };

    match state
        .store
        .get_jobs_paginated(filter, params.page, params.limit)
        .await
    {
        Ok(page) => Json(page).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub title: String,
    pub tz: String,
    pub run_at_utc: chrono::DateTime<Utc>,
    #[serde(default)]
    pub remind_before_minutes: i64,
}

pub async fn create_job(
    State(state): State<AppState>,
    Json(req): Json<CreateJobRequest>,
) -> impl IntoResponse {
    let new_job = NewJob::builder()
        .title(req.title)
        .tz(req.tz)
        .run_at_utc(req.run_at_utc)
        .remind_before_minutes(req.remind_before_minutes)
        .build();

    let now = Utc::now();
    let due_at_utc = match new_job.validate(now) {
        Ok(due) => due,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    let id = match state.store.insert(&new_job, due_at_utc).await {
        Ok(id) => id,
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    };

    let job = match state.store.get(id).await {
        Ok(job) => job,
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    };

    state.scheduler.schedule_new(job).await;
    (StatusCode::CREATED, Json(serde_json::json!({ "id": id }))).into_response()
}

pub async fn cancel_job(State(state): State<AppState>, Path(id): Path<i64>) -> impl IntoResponse {
    match state.store.mark_cancelled(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub async fn reschedule(State(state): State<AppState>) -> impl IntoResponse {
    match state.scheduler.reschedule_all_pending().await {
        Ok(count) => Json(serde_json::json!({ "rescheduled": count })).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::TestBroker;
    use crate::clock::SystemClock;
    use crate::scheduler::Scheduler;
    use crate::store::InMemoryJobStore;
    use crate::wheel::Wheel;
    use axum::body::Body;
    use axum::http::Request;
    use axum::Router;
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn build_app() -> (Router, Arc<InMemoryJobStore>, Arc<TestBroker>) {
        let store = Arc::new(InMemoryJobStore::new());
        let broker = Arc::new(TestBroker::new());
        let clock = Arc::new(SystemClock);
        let wheel = Wheel::new(Duration::from_millis(20), 16, clock.clone()).unwrap();
        wheel.start();
        let scheduler = Arc::new(Scheduler::new(
            store.clone(),
            broker.clone(),
            wheel,
            clock,
            Duration::from_secs(600),
        ));
        let state = AppState {
            store: store.clone(),
            scheduler,
        };
        (super::super::router(state), store, broker)
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let (app, _store, _broker) = build_app();
        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn create_job_schedules_and_returns_id() {
        let (app, store, broker) = build_app();
        let run_at = Utc::now() + chrono::Duration::milliseconds(100);
        let req = Request::builder()
            .method("POST")
            .uri("/jobs")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({
                    "title": "pay rent",
                    "tz": "UTC",
                    "run_at_utc": run_at.to_rfc3339(),
                    "remind_before_minutes": 0
                })
                .to_string(),
            ))
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body = body_json(resp).await;
        let id = body["id"].as_i64().unwrap();

        let job = store.get(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(broker.was_published_with_key(&crate::model::message_key(id)));
        assert_eq!(store.get(id).await.unwrap().status, JobStatus::Enqueued);
    }

    #[tokio::test]
    async fn create_job_rejects_invalid_title() {
        let (app, _store, _broker) = build_app();
        let run_at = Utc::now() + chrono::Duration::minutes(5);
        let req = Request::builder()
            .method("POST")
            .uri("/jobs")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({
                    "title": "ab",
                    "tz": "UTC",
                    "run_at_utc": run_at.to_rfc3339(),
                    "remind_before_minutes": 0
                })
                .to_string(),
            ))
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn cancel_job_marks_cancelled() {
        let (app, store, _broker) = build_app();
        let new_job = NewJob::builder()
            .title("dentist appointment".to_string())
            .tz("UTC".to_string())
            .run_at_utc(Utc::now() + chrono::Duration::minutes(10))
            .remind_before_minutes(0)
            .build();
        let due = new_job.validate(Utc::now()).unwrap();
        let id = store.insert(&new_job, due).await.unwrap();

        let req = Request::builder()
            .method("POST")
            .uri(format!("/jobs/{id}/cancel"))
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert_eq!(store.get(id).await.unwrap().status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn list_jobs_paginates() {
        let (app, store, _broker) = build_app();
        for i in 0..3 {
            let new_job = NewJob::builder()
                .title(format!("job {i}"))
                .tz("UTC".to_string())
                .run_at_utc(Utc::now() + chrono::Duration::minutes(10 + i))
                .remind_before_minutes(0)
                .build();
            let due = new_job.validate(Utc::now()).unwrap();
            store.insert(&new_job, due).await.unwrap();
        }

        let req = Request::builder()
            .uri("/?page=1&limit=2")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["rows"].as_array().unwrap().len(), 2);
        assert_eq!(body["total"].as_i64().unwrap(), 3);
        assert!(body["has_next"].as_bool().unwrap());
    }
}
