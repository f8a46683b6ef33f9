//! HTTP ingress: the Telegram webhook plus health/diagnostic endpoints.
//!
//! Every webhook request passes, in order, the shared-secret check, the
//! bounded-concurrency admission (an owned semaphore permit held as an
//! RAII guard for the rest of the request), JSON parsing, and update-id
//! dedupe. Downstream handler failures are logged and acked, since the
//! platform retries aggressively on anything else.

use crate::bot::handlers::{self, AppState};
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde_json::json;
use std::collections::{HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use teloxide::types::Update;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";
const HISTORY_CAPACITY: usize = 20;

/// Bounded recent-update-id cache; the oldest entry is evicted first.
/// Best effort: duplicates older than the horizon are reprocessed.
pub struct DedupeCache {
    capacity: usize,
    seen: HashSet<u64>,
    order: VecDeque<u64>,
}

impl DedupeCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            seen: HashSet::new(),
            order: VecDeque::new(),
        }
    }

    /// Returns true when the id has not been seen within the horizon and
    /// records it; false means a duplicate to drop.
    pub fn check_and_insert(&mut self, id: u64) -> bool {
        if self.seen.contains(&id) {
            return false;
        }
        if self.order.len() == self.capacity
            && let Some(oldest) = self.order.pop_front()
        {
            self.seen.remove(&oldest);
        }
        self.order.push_back(id);
        self.seen.insert(id);
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }
}

/// Tries to take an owned concurrency permit within `timeout`. `None`
/// means the server is at capacity and the caller should answer busy.
pub async fn admit(
    throttle: &Arc<Semaphore>,
    timeout: Duration,
) -> Option<OwnedSemaphorePermit> {
    match tokio::time::timeout(timeout, throttle.clone().acquire_owned()).await {
        Ok(Ok(permit)) => Some(permit),
        // The semaphore is never closed; treat it as capacity exhaustion.
        Ok(Err(_)) | Err(_) => None,
    }
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[derive(Clone)]
pub struct WebState {
    app: AppState,
    throttle: Arc<Semaphore>,
    admit_timeout: Duration,
    max_concurrent: usize,
    dedupe: Arc<Mutex<DedupeCache>>,
    history: Arc<Mutex<VecDeque<(i64, &'static str)>>>,
}

impl WebState {
    pub fn new(app: AppState) -> Self {
        let config = app.config.clone();
        Self {
            app,
            throttle: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            admit_timeout: Duration::from_secs(config.admit_timeout_secs),
            max_concurrent: config.max_concurrent.max(1),
            dedupe: Arc::new(Mutex::new(DedupeCache::new(config.dedupe_capacity))),
            history: Arc::new(Mutex::new(VecDeque::with_capacity(HISTORY_CAPACITY))),
        }
    }

    async fn record(&self, outcome: &'static str) {
        let mut history = self.history.lock().await;
        if history.len() == HISTORY_CAPACITY {
            history.pop_front();
        }
        history.push_back((now_unix(), outcome));
    }
}

pub async fn serve(state: WebState, port: u16) -> Result<(), anyhow::Error> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route("/", get(root_page))
        .route("/health", get(health))
        .route("/ping", get(ping))
        .route("/webhook", post(webhook))
        .with_state(state);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind {}: {}", addr, e))?;
    tracing::info!(%addr, "HTTP ingress listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %error, "Failed to listen for shutdown signal");
    } else {
        tracing::info!("Shutdown signal received");
    }
}

async fn root_page() -> Html<&'static str> {
    Html(
        "<html><head><title>manhaj-bot</title></head><body>\
         <h1>🤖 Telegram Bot is Running</h1>\
         <p>Bot is active and ready to receive webhook calls.</p>\
         <p><a href=\"/health\">Check Health</a></p>\
         <p><a href=\"/ping\">Ping</a></p>\
         </body></html>",
    )
}

async fn ping() -> &'static str {
    "pong"
}

async fn health(State(state): State<WebState>) -> Response {
    let db_healthy = match state.app.db.as_deref() {
        Some(db) => db.health_check().await,
        None => false,
    };
    let bot_healthy = state.app.client.is_some();
    let in_flight = state
        .max_concurrent
        .saturating_sub(state.throttle.available_permits());
    let healthy = db_healthy && bot_healthy;

    let history: Vec<_> = state
        .history
        .lock()
        .await
        .iter()
        .map(|(ts, outcome)| json!([ts, outcome]))
        .collect();

    let body = json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "database": if db_healthy { "connected" } else { "disconnected" },
        "bot": if bot_healthy { "connected" } else { "disconnected" },
        "in_flight": in_flight,
        "max_concurrent": state.max_concurrent,
        "deduped_updates": state.dedupe.lock().await.len(),
        "request_history": history,
    });

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body)).into_response()
}

async fn webhook(State(state): State<WebState>, headers: HeaderMap, body: String) -> Response {
    if let Some(secret) = state.app.config.webhook_secret.as_deref() {
        let provided = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if provided != Some(secret) {
            tracing::warn!("Invalid secret token in incoming webhook request");
            return (
                StatusCode::FORBIDDEN,
                Json(json!({"ok": false, "error": "forbidden"})),
            )
                .into_response();
        }
    }

    // Held until this request finishes, however it finishes.
    let Some(_permit) = admit(&state.throttle, state.admit_timeout).await else {
        tracing::warn!(
            max_concurrent = state.max_concurrent,
            "Processing capacity exhausted, rejecting webhook"
        );
        state.record("busy").await;
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"ok": false, "error": "busy"})),
        )
            .into_response();
    };

    let update: Update = match serde_json::from_str(&body) {
        Ok(update) => update,
        Err(error) => {
            tracing::warn!(error = %error, "Failed to parse webhook body");
            state.record("bad_update").await;
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"ok": false, "error": "bad_update"})),
            )
                .into_response();
        }
    };

    let update_id = update.id.0 as u64;
    if !state.dedupe.lock().await.check_and_insert(update_id) {
        tracing::debug!(update_id, "Duplicate update, skipping");
        return Json(json!({"ok": true})).into_response();
    }
    tracing::info!(update_id, "Processing update");

    match handlers::dispatch(&state.app, update).await {
        Ok(()) => state.record("ok").await,
        Err(error) => {
            // Ack anyway: the platform keeps retrying on error statuses.
            tracing::error!(update_id, error = %error, "Update handler failed");
            state.record("error").await;
        }
    }
    Json(json!({"ok": true})).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupe_drops_duplicates_within_horizon() {
        let mut cache = DedupeCache::new(100);
        assert!(cache.check_and_insert(1));
        assert!(!cache.check_and_insert(1));
        assert!(cache.check_and_insert(2));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn dedupe_evicts_oldest_first() {
        let mut cache = DedupeCache::new(3);
        for id in 1..=3 {
            assert!(cache.check_and_insert(id));
        }
        // 4 evicts 1; 1 becomes fresh again past the horizon.
        assert!(cache.check_and_insert(4));
        assert_eq!(cache.len(), 3);
        assert!(cache.check_and_insert(1));
        assert!(!cache.check_and_insert(4));
    }

    #[tokio::test]
    async fn throttle_rejects_excess_and_recovers_without_leaking() {
        let throttle = Arc::new(Semaphore::new(2));
        let timeout = Duration::from_millis(50);

        let p1 = admit(&throttle, timeout).await.expect("slot 1");
        let _p2 = admit(&throttle, timeout).await.expect("slot 2");

        // All slots held: the next caller is turned away in time.
        assert!(admit(&throttle, timeout).await.is_none());

        // Dropping a guard frees its slot even without explicit release.
        drop(p1);
        let p3 = admit(&throttle, timeout).await.expect("slot after drop");
        drop(p3);
        assert_eq!(throttle.available_permits(), 1);
    }

    #[tokio::test]
    async fn update_json_parses_and_dedupes_once() {
        let raw = r#"{
            "update_id": 1000,
            "message": {
                "message_id": 1,
                "date": 1700000000,
                "chat": {"id": 5, "type": "private", "first_name": "أحمد"},
                "from": {"id": 5, "is_bot": false, "first_name": "أحمد"},
                "text": "/start"
            }
        }"#;
        let update: Update = serde_json::from_str(raw).unwrap();
        assert_eq!(update.id.0, 1000);

        let mut cache = DedupeCache::new(10);
        assert!(cache.check_and_insert(update.id.0.into()));
        assert!(!cache.check_and_insert(update.id.0.into()));
    }
}
