//! Web routes.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{Datelike, Local, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use routineos_core::{
    BroadcastHub, DayKey, TimerService, WeeklySchedule, matcher,
};
use routineos_push::{
    CRON_WINDOW_SECS, DispatchSummary, Engine, NotificationPayload, Subscription,
    SubscriptionKeys, SubscriptionStore,
};

use crate::error::WebError;
use crate::sse::create_sse_stream;

/// Shared state for the web server.
pub struct AppState {
    pub engine: Arc<Engine>,
    pub schedule: Arc<WeeklySchedule>,
    pub store: Arc<SubscriptionStore>,
    pub hub: Arc<BroadcastHub>,
    pub timers: Arc<TimerService>,
    /// Shared secret required by the authenticated periodic trigger.
    pub cron_secret: Option<String>,
    /// Public push key handed to registering clients.
    pub push_public_key: Option<String>,
}

/// Create the web router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        // Periodic triggers
        .route("/api/cron", get(cron_trigger))
        .route("/api/cron-push", get(cron_push_trigger))
        // Live streaming
        .route("/api/events", get(events_sse))
        // Client-initiated check
        .route("/api/notifications/check", post(notifications_check))
        // Ad-hoc manual push
        .route("/api/notify", post(notify))
        // Subscription registry
        .route(
            "/api/subscriptions",
            get(list_subscriptions).post(create_subscription),
        )
        // One-shot timers
        .route("/api/timers", post(create_timer).delete(cancel_timer))
        // Display board
        .route("/api/schedule", get(schedule_board))
        .route("/api/push-key", get(push_key))
        .with_state(state)
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let subscription_count = match state.store.count().await {
        Ok(n) => n,
        Err(e) => {
            warn!(error = %e, "failed to count subscriptions for health check");
            0
        }
    };

    Json(json!({
        "status": "ok",
        "subscriptions": subscription_count,
        "connections": state.hub.connection_count(),
        "pending_timers": state.timers.pending_count(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Authenticated periodic trigger: 60 second look-ahead window.
///
/// Rejected before any matching when the shared secret is absent or
/// wrong.
async fn cron_trigger(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, WebError> {
    let authorized = match &state.cron_secret {
        Some(secret) => headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == format!("Bearer {secret}")),
        None => false,
    };
    if !authorized {
        return Ok((StatusCode::UNAUTHORIZED, "Unauthorized").into_response());
    }

    let summary = state
        .engine
        .run_push_window(Local::now(), CRON_WINDOW_SECS)
        .await?;
    Ok(Json(push_window_body(summary)).into_response())
}

/// Unauthenticated periodic trigger variant for lower-trust deployments.
async fn cron_push_trigger(State(state): State<Arc<AppState>>) -> Result<Response, WebError> {
    let summary = state
        .engine
        .run_push_window(Local::now(), CRON_WINDOW_SECS)
        .await?;
    Ok(Json(push_window_body(summary)).into_response())
}

fn push_window_body(summary: DispatchSummary) -> serde_json::Value {
    if summary.matched == 0 {
        return json!({ "success": true, "info": "No upcoming tasks." });
    }
    json!({
        "success": true,
        "results": summary.report.results,
        "notifiedTasks": summary.notified_tasks,
        "suppressed": summary.suppressed,
    })
}

/// Open a live streaming connection.
async fn events_sse(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let connection = state.hub.connect();
    create_sse_stream(connection, state.hub.clone())
}

#[derive(Debug, Deserialize)]
struct CheckRequest {
    #[serde(rename = "dayIndex")]
    day_index: usize,
}

/// Client-initiated check with a caller-supplied day index.
async fn notifications_check(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CheckRequest>,
) -> Result<Json<serde_json::Value>, WebError> {
    let summary = state
        .engine
        .run_client_check(Local::now(), request.day_index)
        .await?;
    Ok(Json(json!({
        "success": true,
        "tasksNotified": summary.notified_tasks,
        "suppressed": summary.suppressed,
        "clientsNotified": summary.report.clients_notified,
    })))
}

#[derive(Debug, Deserialize)]
struct NotifyFilter {
    #[serde(rename = "endpointContains")]
    endpoint_contains: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NotifyRequest {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    filter: Option<NotifyFilter>,
}

/// Manual push with a caller-supplied payload, optionally restricted to
/// endpoints containing a fragment. Bypasses matching and dedup.
async fn notify(
    State(state): State<Arc<AppState>>,
    Json(request): Json<NotifyRequest>,
) -> impl IntoResponse {
    let payload = NotificationPayload::custom(
        request.title.unwrap_or_else(|| "RoutineOS".to_string()),
        request.body.unwrap_or_default(),
        request.data.unwrap_or_else(|| json!({})),
        Utc::now(),
    );
    let fragment = request.filter.and_then(|f| f.endpoint_contains);
    let report = state.engine.run_manual(&payload, fragment.as_deref()).await;

    Json(json!({
        "success": true,
        "attempted": report.results.len(),
        "results": report.results,
    }))
}

/// Operational inspection of the registry.
async fn list_subscriptions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, WebError> {
    let subscriptions = state.store.list().await?;
    Ok(Json(json!({
        "success": true,
        "count": subscriptions.len(),
        "subscriptions": subscriptions,
    })))
}

#[derive(Debug, Deserialize)]
struct SubscribeRequest {
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default)]
    keys: Option<SubscriptionKeys>,
}

async fn create_subscription(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SubscribeRequest>,
) -> Result<Response, WebError> {
    let Some(endpoint) = request.endpoint.filter(|e| !e.is_empty()) else {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Invalid subscription payload" })),
        )
            .into_response());
    };

    let subscription = Subscription {
        endpoint,
        keys: request.keys.unwrap_or_default(),
    };
    state.store.add(subscription).await?;
    let total = state.store.count().await?;
    Ok(Json(json!({ "success": true, "total": total })).into_response())
}

#[derive(Debug, Deserialize)]
struct TimerRequest {
    #[serde(default)]
    minutes: Option<u64>,
    #[serde(default)]
    message: Option<String>,
}

async fn create_timer(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TimerRequest>,
) -> impl IntoResponse {
    let minutes = request.minutes.unwrap_or(1);
    let message = request.message.unwrap_or_default();
    let id = state.timers.schedule(minutes, message.clone());
    Json(json!({
        "success": true,
        "id": id,
        "minutes": minutes,
        "message": message,
    }))
}

#[derive(Debug, Deserialize)]
struct CancelTimerRequest {
    id: String,
}

async fn cancel_timer(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CancelTimerRequest>,
) -> impl IntoResponse {
    // Unknown and already-fired ids cancel silently.
    state.timers.cancel(&request.id);
    Json(json!({ "success": true }))
}

/// Display board: the [-5min, +1h] band around now, classified.
async fn schedule_board(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, WebError> {
    let now = Local::now();
    let local = now.naive_local();
    let day = DayKey::from_weekday(local.weekday());
    let mut board = matcher::upcoming_board(&state.schedule, local)?;
    board.truncate(5);

    Ok(Json(json!({
        "success": true,
        "now": now.to_rfc3339(),
        "dayIndex": day.index(),
        "tasks": board,
    })))
}

async fn push_key(State(state): State<Arc<AppState>>) -> Response {
    match &state.push_public_key {
        Some(key) => Json(json!({ "publicKey": key })).into_response(),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "push public key not configured" })),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use routineos_core::DedupStore;
    use routineos_push::{Dispatcher, PushClient};

    use super::*;

    async fn test_router(dir: &tempfile::TempDir) -> Router {
        let store = Arc::new(
            SubscriptionStore::open(dir.path().join("subs.json"))
                .await
                .unwrap(),
        );
        let hub = Arc::new(BroadcastHub::new());
        let client = PushClient::new(None, Duration::from_secs(5)).unwrap();
        let dispatcher = Arc::new(Dispatcher::new(store.clone(), client, hub.clone()));
        let schedule = Arc::new(WeeklySchedule::default());
        let engine = Arc::new(Engine::new(
            schedule.clone(),
            Arc::new(DedupStore::default()),
            dispatcher,
            hub.clone(),
        ));
        let timers = Arc::new(TimerService::new(hub.clone()));

        create_router(Arc::new(AppState {
            engine,
            schedule,
            store,
            hub,
            timers,
            cron_secret: Some("cron-secret".to_string()),
            push_public_key: None,
        }))
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_cron_rejects_missing_credential() {
        let dir = tempfile::tempdir().unwrap();
        let router = test_router(&dir).await;

        let response = router
            .oneshot(Request::get("/api/cron").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_cron_rejects_wrong_credential() {
        let dir = tempfile::tempdir().unwrap();
        let router = test_router(&dir).await;

        let response = router
            .oneshot(
                Request::get("/api/cron")
                    .header("authorization", "Bearer wrong")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_cron_with_credential_reports_no_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let router = test_router(&dir).await;

        let response = router
            .oneshot(
                Request::get("/api/cron")
                    .header("authorization", "Bearer cron-secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["info"], "No upcoming tasks.");
    }

    #[tokio::test]
    async fn test_subscribe_rejects_missing_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let router = test_router(&dir).await;

        let response = router
            .oneshot(
                Request::post("/api/subscriptions")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"keys": {"p256dh": "k", "auth": "a"}}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_subscribe_then_duplicate_keeps_one_entry() {
        let dir = tempfile::tempdir().unwrap();
        let router = test_router(&dir).await;

        let body = r#"{"endpoint": "https://push.example/ep", "keys": {"p256dh": "k", "auth": "a"}}"#;
        for _ in 0..2 {
            let response = router
                .clone()
                .oneshot(
                    Request::post("/api/subscriptions")
                        .header("content-type", "application/json")
                        .body(Body::from(body))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let json = body_json(response).await;
            assert_eq!(json["total"], 1);
        }

        let response = router
            .oneshot(Request::get("/api/subscriptions").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["count"], 1);
    }

    #[tokio::test]
    async fn test_notify_with_empty_registry_attempts_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let router = test_router(&dir).await;

        let response = router
            .oneshot(
                Request::post("/api/notify")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"title": "Ping", "body": "manual", "filter": {"endpointContains": "team"}}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["attempted"], 0);
        assert!(json["results"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_check_rejects_invalid_day_index() {
        let dir = tempfile::tempdir().unwrap();
        let router = test_router(&dir).await;

        let response = router
            .oneshot(
                Request::post("/api/notifications/check")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"dayIndex": 7}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_timer_create_and_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let router = test_router(&dir).await;

        let response = router
            .clone()
            .oneshot(
                Request::post("/api/timers")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"minutes": 5, "message": "tea"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let id = json["id"].as_str().unwrap().to_string();
        assert!(id.starts_with("tmr-"));
        assert_eq!(json["minutes"], 5);

        let response = router
            .oneshot(
                Request::delete("/api/timers")
                    .header("content-type", "application/json")
                    .body(Body::from(format!(r#"{{"id": "{id}"}}"#)))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["success"], true);
    }

    #[tokio::test]
    async fn test_push_key_unconfigured_is_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let router = test_router(&dir).await;

        let response = router
            .oneshot(Request::get("/api/push-key").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_health_reports_counts() {
        let dir = tempfile::tempdir().unwrap();
        let router = test_router(&dir).await;

        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["subscriptions"], 0);
        assert_eq!(json["connections"], 0);
    }
}
