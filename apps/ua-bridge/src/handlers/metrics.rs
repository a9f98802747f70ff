//! 运行计数快照。
//!
//! - GET /api/metrics

use api_contract::{ApiResponse, MetricsSnapshotDto};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bridge_telemetry::metrics;

pub async fn get_metrics() -> Response {
    let snapshot = metrics().snapshot();
    (
        StatusCode::OK,
        Json(ApiResponse::success(MetricsSnapshotDto {
            notifications_received: snapshot.notifications_received,
            notifications_unmatched: snapshot.notifications_unmatched,
            values_seeded: snapshot.values_seeded,
            sink_failures: snapshot.sink_failures,
            publish_cycles: snapshot.publish_cycles,
            publish_success: snapshot.publish_success,
            publish_failure: snapshot.publish_failure,
        })),
    )
        .into_response()
}
