//! 变更分发：按注册顺序同步调用每个 sink，单个 sink 的错误或 panic 不影响其他 sink。

use bridge_telemetry::record_sink_failure;
use domain::ValueUpdate;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{error, warn};

/// sink 处理失败。
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct SinkError {
    message: String,
}

impl SinkError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// 值变更接收方。
///
/// 在通知处理上下文中同步调用，做网络 I/O 的实现应只写本地状态后返回。
pub trait ValueSink: Send + Sync {
    fn on_value(&self, update: &ValueUpdate) -> Result<(), SinkError>;

    /// 日志中使用的名称。
    fn name(&self) -> &str {
        "sink"
    }
}

impl<F> ValueSink for F
where
    F: Fn(&ValueUpdate) -> Result<(), SinkError> + Send + Sync,
{
    fn on_value(&self, update: &ValueUpdate) -> Result<(), SinkError> {
        self(update)
    }
}

/// 把闭包包装成可注册的 sink。
pub fn sink_fn<F>(f: F) -> Arc<dyn ValueSink>
where
    F: Fn(&ValueUpdate) -> Result<(), SinkError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// sink 注册表。克隆后共享同一份注册列表。
#[derive(Clone, Default)]
pub struct NotificationDispatcher {
    sinks: Arc<RwLock<Vec<Arc<dyn ValueSink>>>>,
}

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加 sink；不去重，重复注册会被调用多次。
    pub fn register(&self, sink: Arc<dyn ValueSink>) {
        self.sinks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.read().map(|sinks| sinks.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 依次调用全部 sink，返回失败个数。
    pub fn fanout(&self, update: &ValueUpdate) -> usize {
        let sinks: Vec<Arc<dyn ValueSink>> = self
            .sinks
            .read()
            .map(|sinks| sinks.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone());

        let mut failures = 0;
        for (index, sink) in sinks.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| sink.on_value(update))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    failures += 1;
                    record_sink_failure();
                    warn!(
                        target: "bridge.ingest",
                        sink = sink.name(),
                        index,
                        point = %update.name,
                        error = %err,
                        "sink_failed"
                    );
                }
                Err(_) => {
                    failures += 1;
                    record_sink_failure();
                    error!(
                        target: "bridge.ingest",
                        sink = sink.name(),
                        index,
                        point = %update.name,
                        "sink_panicked"
                    );
                }
            }
        }
        failures
    }
}
