//! 点位值查询 handlers
//!
//! - GET /api/values
//! - GET /api/value/{name}

use crate::AppState;
use api_contract::{ApiResponse, ValuePayload, ValuesDto};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// 全部点位的最新值（名称 → 载荷）。
pub async fn get_values(State(state): State<AppState>) -> Response {
    let values: ValuesDto = state
        .cache
        .snapshot()
        .iter()
        .map(|(name, record)| (name.clone(), ValuePayload::from(record)))
        .collect();
    (StatusCode::OK, Json(values)).into_response()
}

/// 单个点位最新值；从未上报时 404。
pub async fn get_value(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.cache.get(&name) {
        Some(record) => (StatusCode::OK, Json(ValuePayload::from(&record))).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<()>::error(
                "VALUE.NOT_FOUND",
                format!("value not found: {}", name),
            )),
        )
            .into_response(),
    }
}
