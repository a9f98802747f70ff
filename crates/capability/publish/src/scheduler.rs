//! 定时发布循环：每个周期把 sink 快照整体发布一次（未变化的点位同样发布）。

use crate::sink::MqttSink;
use crate::Publisher;
use bridge_telemetry::{record_publish_cycle, record_publish_failure, record_publish_success};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

/// 默认发布周期。
pub const DEFAULT_PUBLISH_INTERVAL: Duration = Duration::from_millis(500);
/// `stop` 等待循环退出的上限。
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(1);

struct SchedulerInner {
    sink: MqttSink,
    publisher: Arc<dyn Publisher>,
    interval: Duration,
    running: AtomicBool,
    wake: Notify,
}

/// 定时发布器。
pub struct PublishScheduler {
    inner: Arc<SchedulerInner>,
    stop_timeout: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PublishScheduler {
    pub fn new(sink: MqttSink, publisher: Arc<dyn Publisher>, interval: Duration) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                sink,
                publisher,
                interval: interval.max(Duration::from_millis(1)),
                running: AtomicBool::new(false),
                wake: Notify::new(),
            }),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            task: Mutex::new(None),
        }
    }

    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// 启动循环；已在运行时不做任何事。
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(inner.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = inner.wake.notified() => {}
                }
                if !inner.running.load(Ordering::SeqCst) {
                    break;
                }
                publish_cycle(&inner).await;
            }
            debug!(target: "bridge.publish", "publish_loop_exited");
        });
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        info!(
            target: "bridge.publish",
            interval_ms = self.inner.interval.as_millis() as u64,
            "publish_scheduler_started"
        );
    }

    /// 清除运行标志、唤醒循环并有限等待其退出；超时则终止任务。未启动时不做任何事。
    pub async fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        let handle = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return;
        };
        self.inner.wake.notify_one();

        let abort = handle.abort_handle();
        match tokio::time::timeout(self.stop_timeout, handle).await {
            Ok(_) => info!(target: "bridge.publish", "publish_scheduler_stopped"),
            Err(_) => {
                abort.abort();
                warn!(
                    target: "bridge.publish",
                    timeout_ms = self.stop_timeout.as_millis() as u64,
                    "publish_scheduler_abort"
                );
            }
        }
    }
}

impl Drop for PublishScheduler {
    fn drop(&mut self) {
        self.inner.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self
            .task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

async fn publish_cycle(inner: &SchedulerInner) {
    record_publish_cycle();
    if !inner.publisher.is_ready() {
        debug!(target: "bridge.publish", "publish_skipped_not_ready");
        return;
    }
    let messages = match inner.sink.messages() {
        Ok(messages) => messages,
        Err(err) => {
            warn!(target: "bridge.publish", error = %err, "publish_snapshot_failed");
            return;
        }
    };
    for (topic, payload) in messages {
        let payload_size = payload.len();
        match inner.publisher.publish(&topic, payload).await {
            Ok(()) => {
                record_publish_success();
                debug!(target: "bridge.publish", topic = %topic, payload_size, "value_published");
            }
            Err(err) => {
                record_publish_failure();
                warn!(target: "bridge.publish", topic = %topic, error = %err, "value_publish_failed");
            }
        }
    }
}
