//! 路由定义
//!
//! - 健康检查：/health
//! - 点位值：/api/values, /api/value/:name
//! - 运行计数：/api/metrics

use crate::AppState;
use crate::handlers::*;
use crate::middleware::request_context;
use axum::{Router, middleware, routing::get};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// 创建 HTTP 路由；`cors` 为真时允许任意来源。
pub fn create_router(state: AppState, cors: bool) -> Router {
    let router = Router::new()
        .route("/health", get(health))
        .route("/api/values", get(get_values))
        .route("/api/value/:name", get(get_value))
        .route("/api/metrics", get(get_metrics))
        .with_state(state)
        // 注入 request_id/trace_id
        .layer(middleware::from_fn(request_context))
        .layer(TraceLayer::new_for_http());
    if cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use bridge_ingest::SubscriptionEngine;
    use bridge_protocol::{SecurityMode, SecurityPolicy, SessionConfig, SimulatedClient};
    use domain::MonitoredPoint;
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::ServiceExt;

    /// 通过模拟源的初始读值填充缓存。
    async fn seeded_engine() -> SubscriptionEngine {
        let client = SimulatedClient::default()
            .with_value("ns=2;s=Temperature", 22.0)
            .with_value("ns=2;s=Running", true);
        let mut engine = SubscriptionEngine::new(Arc::new(client));
        engine
            .connect(&SessionConfig {
                endpoint: "opc.tcp://sim:4840".to_string(),
                application_uri: "urn:test".to_string(),
                security_policy: SecurityPolicy::None,
                security_mode: SecurityMode::None,
                credentials: None,
            })
            .await
            .expect("connect");
        engine
            .subscribe(vec![
                MonitoredPoint::new("ns=2;s=Temperature", "Temperature", Some("C".to_string())),
                MonitoredPoint::new("ns=2;s=Running", "Running", None),
            ])
            .await
            .expect("subscribe");
        assert_eq!(engine.cache().len(), 2);
        engine
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).expect("request"))
            .await
            .expect("response");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        (status, serde_json::from_slice(&bytes).expect("json"))
    }

    #[tokio::test]
    async fn values_endpoint_returns_all_points() {
        let mut engine = seeded_engine().await;
        let router = create_router(
            AppState {
                cache: engine.cache().clone(),
            },
            false,
        );

        let (status, body) = get_json(router, "/api/values").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["Temperature"]["value"], 22.0);
        assert_eq!(body["Temperature"]["unit"], "C");
        assert!(body["Temperature"]["timestamp"].is_string());
        assert_eq!(body["Running"]["value"], true);
        assert_eq!(body["Running"]["unit"], "");
        engine.disconnect().await;
    }

    #[tokio::test]
    async fn single_value_and_unknown_name() {
        let mut engine = seeded_engine().await;
        let state = AppState {
            cache: engine.cache().clone(),
        };

        let (status, body) = get_json(create_router(state.clone(), false), "/api/value/Temperature").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["value"], 22.0);

        let (status, body) = get_json(create_router(state, false), "/api/value/Missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "VALUE.NOT_FOUND");
        engine.disconnect().await;
    }

    #[tokio::test]
    async fn health_sets_request_ids_and_cors_toggle() {
        let state = AppState {
            cache: bridge_ingest::ValueCache::new(),
        };
        let request = || {
            Request::builder()
                .uri("/health")
                .header(header::ORIGIN, "http://viewer.local")
                .body(Body::empty())
                .expect("request")
        };

        let response = create_router(state.clone(), true)
            .oneshot(request())
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert!(response.headers().contains_key("x-trace-id"));
        assert!(
            response
                .headers()
                .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        );

        let response = create_router(state, false)
            .oneshot(request())
            .await
            .expect("response");
        assert!(
            !response
                .headers()
                .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        );
    }

    #[tokio::test]
    async fn metrics_endpoint_wraps_counters() {
        let state = AppState {
            cache: bridge_ingest::ValueCache::new(),
        };
        let (status, body) = get_json(create_router(state, false), "/api/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert!(body["data"]["notificationsReceived"].is_u64());
    }
}
