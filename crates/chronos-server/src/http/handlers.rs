//! `/health`, `/metrics`, `/stats` handlers: thin `axum` handlers
//! returning JSON or Prometheus text, backed by the live store counters.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::state::AppState;

/// `GET /health` — the cached health report, 200 when healthy and 503
/// when degraded so load balancers can act on the status code alone.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let report = state.health_snapshot();
    let stats = state.store.stats();
    let status = if report.score > 70 {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = Json(serde_json::json!({
        "score": report.score,
        "status": report.status.as_str(),
        "issues": report.issues,
        "hitRate": stats.hit_rate(),
        "p99Latency": state.latency.p99(),
        "memoryUsage": stats.memory_used,
    }));
    (status, body)
}

/// `GET /metrics` — Prometheus text exposition.
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.store.stats();
    let body = format!(
        "# TYPE chronos_hits_total counter\n\
         chronos_hits_total {hits}\n\
         # TYPE chronos_misses_total counter\n\
         chronos_misses_total {misses}\n\
         # TYPE chronos_hit_rate gauge\n\
         chronos_hit_rate {hit_rate}\n\
         # TYPE chronos_memory_bytes gauge\n\
         chronos_memory_bytes {memory_bytes}\n\
         # TYPE chronos_evictions_total counter\n\
         chronos_evictions_total {evictions}\n\
         # TYPE chronos_latency_milliseconds summary\n\
         chronos_latency_milliseconds{{quantile=\"0.5\"}} {p50}\n\
         chronos_latency_milliseconds{{quantile=\"0.95\"}} {p95}\n\
         chronos_latency_milliseconds{{quantile=\"0.99\"}} {p99}\n",
        hits = stats.hits,
        misses = stats.misses,
        hit_rate = stats.hit_rate(),
        memory_bytes = stats.memory_used,
        evictions = stats.evictions,
        p50 = state.latency.p50() as f64 / 1000.0,
        p95 = state.latency.p95() as f64 / 1000.0,
        p99 = state.latency.p99() as f64 / 1000.0,
    );
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}

/// `GET /stats` — a JSON snapshot of store, prefetch, and latency counters.
pub async fn stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.store.stats();
    let (predictions_made, predictions_hit) = state.prefetcher.counters();
    Json(serde_json::json!({
        "store": {
            "hits": stats.hits,
            "misses": stats.misses,
            "hitRate": stats.hit_rate(),
            "evictions": stats.evictions,
            "memoryUsed": stats.memory_used,
            "entryCount": stats.entry_count,
        },
        "prefetch": {
            "predictionsMade": predictions_made,
            "predictionsHit": predictions_hit,
            "accuracy": state.prefetcher.accuracy(),
        },
        "latency": {
            "p50Micros": state.latency.p50(),
            "p95Micros": state.latency.p95(),
            "p99Micros": state.latency.p99(),
        },
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::RwLock;

    use chronos_core::{ChronosConfig, LatencyHistogram, Prefetcher, Store, TtlController};
    use tower::ServiceExt;

    use super::*;
    use crate::loader::NullDataLoader;
    use crate::state::{initial_health_report, EvictionRate};

    fn test_router() -> axum::Router {
        let config = ChronosConfig::default();
        let store = Arc::new(Store::new(&config.store));
        let prefetcher = Arc::new(Prefetcher::new(config.prefetch, Arc::clone(&store), Arc::new(NullDataLoader)));
        let state = Arc::new(AppState {
            store,
            prefetcher,
            ttl_controller: Arc::new(TtlController::new(config.ttl)),
            latency: Arc::new(LatencyHistogram::new()),
            eviction_rate: Arc::new(EvictionRate::new(0)),
            health: Arc::new(RwLock::new(initial_health_report())),
            max_key_bytes: config.store.max_key_bytes,
            max_value_bytes: config.store.max_value_bytes,
        });
        crate::http::router(state)
    }

    #[tokio::test]
    async fn health_reports_200_when_score_is_high() {
        let response = test_router()
            .oneshot(axum::http::Request::builder().uri("/health").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_returns_plaintext_exposition() {
        let response = test_router()
            .oneshot(axum::http::Request::builder().uri("/metrics").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("chronos_hits_total"));
    }

    #[tokio::test]
    async fn stats_returns_json_snapshot() {
        let response = test_router()
            .oneshot(axum::http::Request::builder().uri("/stats").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
