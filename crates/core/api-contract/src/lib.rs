//! 稳定的对外 JSON 契约（MQTT 载荷、HTTP 响应）。

use chrono::{DateTime, Utc};
use domain::{PointValueData, ValueRecord, ValueUpdate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 标准 API 响应封装（用于错误与非值类接口）。
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

/// 失败响应的错误体。
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

/// 单点值载荷：`{"value": ..., "unit": ..., "timestamp": "<ISO-8601>"}`。
///
/// MQTT 发布与 HTTP 查询共用同一结构。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuePayload {
    pub value: PointValueData,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&ValueRecord> for ValuePayload {
    fn from(record: &ValueRecord) -> Self {
        Self {
            value: record.value.clone(),
            unit: record.unit.clone(),
            timestamp: record.timestamp,
        }
    }
}

impl From<&ValueUpdate> for ValuePayload {
    fn from(update: &ValueUpdate) -> Self {
        Self {
            value: update.value.clone(),
            unit: update.unit.clone(),
            timestamp: update.timestamp,
        }
    }
}

/// 全量值：点位名 → 载荷（按名称排序）。
pub type ValuesDto = BTreeMap<String, ValuePayload>;

/// 指标快照返回结构。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshotDto {
    pub notifications_received: u64,
    pub notifications_unmatched: u64,
    pub values_seeded: u64,
    pub sink_failures: u64,
    pub publish_cycles: u64,
    pub publish_success: u64,
    pub publish_failure: u64,
}
