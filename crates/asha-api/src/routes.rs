use std::sync::Arc;

use asha_core::sync::IDEMPOTENCY_KEY_HEADER;
use asha_core::{Category, Payload};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::store::{ReceivedStore, ReceivedSubmission, SummaryCounts};

const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 500;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    store: Arc<ReceivedStore>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, store: Arc<ReceivedStore>) -> Self {
        Self { config, store }
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/submit", post(submit_health))
        .route("/water/submit", post(submit_water))
        .route("/submissions", get(list_submissions))
        .route("/summary", get(summary))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
    })
}

#[derive(Debug, Serialize)]
struct SubmitResponse {
    message: String,
    id: String,
}

async fn submit_health(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<Payload>,
) -> Result<Json<SubmitResponse>, AppError> {
    handle_submit(&state, Category::Health, &headers, &payload)
}

async fn submit_water(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<Payload>,
) -> Result<Json<SubmitResponse>, AppError> {
    handle_submit(&state, Category::Water, &headers, &payload)
}

fn handle_submit(
    state: &AppState,
    category: Category,
    headers: &HeaderMap,
    payload: &Payload,
) -> Result<Json<SubmitResponse>, AppError> {
    if payload.is_empty() {
        return Err(AppError::bad_request("submission payload must not be empty"));
    }

    let client_key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|key| !key.is_empty());

    let (stored, created) = state.store.insert(category, client_key, payload)?;
    tracing::info!(
        %category,
        id = %stored.id,
        created,
        fields = payload.len(),
        "submission received"
    );

    let message = if category == Category::Water {
        "Water form saved"
    } else {
        "Health form saved"
    };
    Ok(Json(SubmitResponse {
        message: message.to_string(),
        id: stored.id,
    }))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    category: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ListResponse {
    submissions: Vec<ReceivedSubmission>,
}

async fn list_submissions(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>, AppError> {
    let category = query
        .category
        .as_deref()
        .map(str::parse::<Category>)
        .transpose()
        .map_err(|error| AppError::bad_request(error.to_string()))?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .min(MAX_LIST_LIMIT);

    let submissions = state.store.list(category, limit)?;
    Ok(Json(ListResponse { submissions }))
}

async fn summary(State(state): State<AppState>) -> Result<Json<SummaryCounts>, AppError> {
    Ok(Json(state.store.summary()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    fn test_router() -> Router {
        let config = Arc::new(AppConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            db_path: ":memory:".into(),
        });
        let store = Arc::new(ReceivedStore::open_in_memory().unwrap());
        app_router(AppState::new(config, store))
    }

    fn post_json(uri: &str, body: serde_json::Value, key: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(key) = key {
            builder = builder.header(IDEMPOTENCY_KEY_HEADER, key);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn submit_returns_message_and_id() {
        let router = test_router();
        let response = router
            .oneshot(post_json(
                "/submit",
                serde_json::json!({ "houseId": "H1", "age": "34" }),
                None,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Health form saved");
        assert!(body["id"].as_str().is_some_and(|id| !id.is_empty()));
    }

    #[tokio::test]
    async fn resend_with_same_key_returns_original_id() {
        let router = test_router();
        let payload = serde_json::json!({ "source": "well-3", "ph": "7.2" });

        let first = router
            .clone()
            .oneshot(post_json("/water/submit", payload.clone(), Some("key-9")))
            .await
            .unwrap();
        let first_body = body_json(first).await;
        assert_eq!(first_body["message"], "Water form saved");

        let replay = router
            .clone()
            .oneshot(post_json("/water/submit", payload, Some("key-9")))
            .await
            .unwrap();
        assert_eq!(replay.status(), StatusCode::OK);
        let replay_body = body_json(replay).await;
        assert_eq!(replay_body["id"], first_body["id"]);

        let summary = router
            .oneshot(Request::get("/summary").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let counts = body_json(summary).await;
        assert_eq!(counts["total"], 1);
        assert_eq!(counts["water"], 1);
    }

    #[tokio::test]
    async fn empty_payload_is_rejected() {
        let router = test_router();
        let response = router
            .oneshot(post_json("/submit", serde_json::json!({}), None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("payload"));
    }

    #[tokio::test]
    async fn list_filters_by_category() {
        let router = test_router();
        router
            .clone()
            .oneshot(post_json(
                "/submit",
                serde_json::json!({ "houseId": "H1" }),
                None,
            ))
            .await
            .unwrap();
        router
            .clone()
            .oneshot(post_json(
                "/water/submit",
                serde_json::json!({ "source": "well-3" }),
                None,
            ))
            .await
            .unwrap();

        let response = router
            .clone()
            .oneshot(
                Request::get("/submissions?category=water")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let submissions = body["submissions"].as_array().unwrap();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0]["category"], "water");

        let bad = router
            .oneshot(
                Request::get("/submissions?category=soil")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn healthz_reports_ok() {
        let router = test_router();
        let response = router
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
    }
}
