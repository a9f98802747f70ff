//! 追踪初始化、运行计数器与请求 ID 生成。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 请求级追踪标识。
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub request_id: String,
    pub trace_id: String,
}

/// 计数器快照。
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub notifications_received: u64,
    pub notifications_unmatched: u64,
    pub values_seeded: u64,
    pub sink_failures: u64,
    pub publish_cycles: u64,
    pub publish_success: u64,
    pub publish_failure: u64,
}

/// 进程级计数器。
pub struct TelemetryMetrics {
    notifications_received: AtomicU64,
    notifications_unmatched: AtomicU64,
    values_seeded: AtomicU64,
    sink_failures: AtomicU64,
    publish_cycles: AtomicU64,
    publish_success: AtomicU64,
    publish_failure: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            notifications_received: AtomicU64::new(0),
            notifications_unmatched: AtomicU64::new(0),
            values_seeded: AtomicU64::new(0),
            sink_failures: AtomicU64::new(0),
            publish_cycles: AtomicU64::new(0),
            publish_success: AtomicU64::new(0),
            publish_failure: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            notifications_received: self.notifications_received.load(Ordering::Relaxed),
            notifications_unmatched: self.notifications_unmatched.load(Ordering::Relaxed),
            values_seeded: self.values_seeded.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
            publish_cycles: self.publish_cycles.load(Ordering::Relaxed),
            publish_success: self.publish_success.load(Ordering::Relaxed),
            publish_failure: self.publish_failure.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局计数器实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info，可用 RUST_LOG 覆盖）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的 request_id 与 trace_id。
pub fn new_request_ids() -> RequestIds {
    RequestIds {
        request_id: uuid::Uuid::new_v4().to_string(),
        trace_id: uuid::Uuid::new_v4().to_string(),
    }
}

/// 记录收到的数据变更通知（含匹配失败的）。
pub fn record_notification_received() {
    metrics()
        .notifications_received
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录未匹配到点位的通知。
pub fn record_notification_unmatched() {
    metrics()
        .notifications_unmatched
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录订阅后初始读取成功的次数。
pub fn record_value_seeded() {
    metrics().values_seeded.fetch_add(1, Ordering::Relaxed);
}

/// 记录 sink 回调失败（返回错误或 panic）。
pub fn record_sink_failure() {
    metrics().sink_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录定时发布轮次。
pub fn record_publish_cycle() {
    metrics().publish_cycles.fetch_add(1, Ordering::Relaxed);
}

/// 记录单条消息发布成功。
pub fn record_publish_success() {
    metrics().publish_success.fetch_add(1, Ordering::Relaxed);
}

/// 记录单条消息发布失败。
pub fn record_publish_failure() {
    metrics().publish_failure.fetch_add(1, Ordering::Relaxed);
}
