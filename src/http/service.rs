//! Rate limit endpoint implementation.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, instrument};

use crate::ratelimit::{RateLimitError, RateLimiter};

/// Path of the rate-limited endpoint.
pub const RATE_LIMITER_PATH: &str = "/rate-limiter";

/// Query parameters of the rate-limited endpoint.
#[derive(Debug, Deserialize)]
pub struct CheckParams {
    /// Caller identity; the bucket key is this single item
    #[serde(default)]
    pub name: String,
}

/// Build the service router around a shared limiter.
pub fn router(rate_limiter: Arc<RateLimiter>) -> Router {
    Router::new()
        .route(RATE_LIMITER_PATH, get(check_handler))
        .route("/healthz", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(rate_limiter)
}

/// Count a request for `name` and map the decision to a status code.
#[instrument(skip_all, fields(name = %params.name))]
async fn check_handler(
    State(rate_limiter): State<Arc<RateLimiter>>,
    Query(params): Query<CheckParams>,
) -> Response {
    match rate_limiter.check_request(&[params.name.as_str()]).await {
        Ok(()) => {
            debug!("Request admitted");
            (
                StatusCode::OK,
                Json(json!({ "message": format!("hello {}", params.name) })),
            )
                .into_response()
        }
        Err(err) => error_response(err),
    }
}

async fn health_handler() -> &'static str {
    "ok"
}

fn error_response(err: RateLimitError) -> Response {
    let status = match &err {
        RateLimitError::TooManyRequests => {
            info!("Rate limit exceeded");
            StatusCode::TOO_MANY_REQUESTS
        }
        RateLimitError::Store(e) => {
            error!(error = %e, "Counter store failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    (
        status,
        Json(json!({ "message": err.to_string(), "code": status.as_u16() })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::RateLimiterConfig;
    use crate::store::{CounterStore, MemoryCounterStore, StoreError, TtlRefresh};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    struct FailingStore;

    #[async_trait]
    impl CounterStore for FailingStore {
        async fn get_counter(&self, _key: &str) -> Result<u64, StoreError> {
            Err(StoreError::Backend("connection reset".to_string()))
        }

        async fn increase_with_ttl(
            &self,
            _key: &str,
            _ttl: Duration,
            _refresh: TtlRefresh,
        ) -> Result<u64, StoreError> {
            Err(StoreError::Backend("connection reset".to_string()))
        }
    }

    fn limiter_with(store: Arc<dyn CounterStore>, max_requests: u64) -> Arc<RateLimiter> {
        let config = RateLimiterConfig::new(Vec::new(), max_requests, Duration::from_secs(60));
        Arc::new(RateLimiter::new(store, config))
    }

    async fn call(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_admitted_request_returns_ok() {
        let app = router(limiter_with(Arc::new(MemoryCounterStore::new()), 1));

        let (status, body) = call(app, "/rate-limiter?name=alice").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "hello alice");
    }

    #[tokio::test]
    async fn test_exhausted_bucket_returns_429() {
        let app = router(limiter_with(Arc::new(MemoryCounterStore::new()), 1));

        let (first, _) = call(app.clone(), "/rate-limiter?name=alice").await;
        let (status, body) = call(app.clone(), "/rate-limiter?name=alice").await;
        let (other, _) = call(app, "/rate-limiter?name=bob").await;

        assert_eq!(first, StatusCode::OK);
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["message"], "max requests limit reached");
        assert_eq!(body["code"], 429);
        assert_eq!(other, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_store_failure_returns_500() {
        let app = router(limiter_with(Arc::new(FailingStore), 10));

        let (status, body) = call(app, "/rate-limiter?name=alice").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], 500);
        assert_eq!(body["message"], "store error: connection reset");
    }

    #[tokio::test]
    async fn test_missing_name_uses_empty_bucket() {
        let store = Arc::new(MemoryCounterStore::new());
        let app = router(limiter_with(store.clone(), 5));

        let (status, body) = call(app, "/rate-limiter").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "hello ");
        assert_eq!(store.get_counter("").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = router(limiter_with(Arc::new(MemoryCounterStore::new()), 1));

        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
