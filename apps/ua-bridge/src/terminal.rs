//! 终端监视器：每次变更后重绘最新值表。
//!
//! sink 回调只更新本地表并发出通知，绘制在独立任务中进行。

use bridge_ingest::{SinkError, ValueSink};
use bridge_publish::DEFAULT_STOP_TIMEOUT;
use chrono::{DateTime, Local};
use domain::ValueUpdate;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const RULE_WIDTH: usize = 50;
const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

struct MonitorInner {
    /// 按首次出现顺序排列
    entries: RwLock<Vec<ValueUpdate>>,
    changed: Notify,
    running: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// 终端监视器。克隆后共享同一张表。
#[derive(Clone)]
pub struct TerminalMonitor {
    inner: Arc<MonitorInner>,
}

impl TerminalMonitor {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                entries: RwLock::new(Vec::new()),
                changed: Notify::new(),
                running: AtomicBool::new(false),
                task: Mutex::new(None),
            }),
        }
    }

    pub fn entries(&self) -> Vec<ValueUpdate> {
        self.inner
            .entries
            .read()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// 启动绘制任务并立即绘制一次。
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let inner = self.inner.clone();
        inner.changed.notify_one();
        let handle = tokio::spawn(async move {
            loop {
                inner.changed.notified().await;
                if !inner.running.load(Ordering::SeqCst) {
                    break;
                }
                let entries = inner
                    .entries
                    .read()
                    .map(|entries| entries.clone())
                    .unwrap_or_default();
                let screen = render_screen(Local::now(), &entries);
                let mut stdout = std::io::stdout().lock();
                if let Err(err) = write!(stdout, "{}{}", CLEAR_SCREEN, screen).and_then(|_| stdout.flush()) {
                    warn!(target: "bridge.terminal", error = %err, "terminal_write_failed");
                }
            }
            debug!(target: "bridge.terminal", "terminal_render_stopped");
        });
        *self.inner.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// 停止绘制任务，有限等待。
    pub async fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        let handle = self
            .inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return;
        };
        self.inner.changed.notify_one();
        let abort = handle.abort_handle();
        if tokio::time::timeout(DEFAULT_STOP_TIMEOUT, handle).await.is_err() {
            abort.abort();
            warn!(target: "bridge.terminal", "terminal_render_abort");
        }
    }
}

impl ValueSink for TerminalMonitor {
    fn on_value(&self, update: &ValueUpdate) -> Result<(), SinkError> {
        {
            let mut entries = self
                .inner
                .entries
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            match entries.iter_mut().find(|entry| entry.name == update.name) {
                Some(entry) => *entry = update.clone(),
                None => entries.push(update.clone()),
            }
        }
        self.inner.changed.notify_one();
        Ok(())
    }

    fn name(&self) -> &str {
        "terminal"
    }
}

/// 生成整屏文本：标题（当前本地时间）、每点一行、退出提示。
pub fn render_screen(now: DateTime<Local>, entries: &[ValueUpdate]) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut screen = format!(
        "{rule}\n OPC UA Terminal Monitor - {}\n{rule}\n\n",
        now.format("%Y-%m-%d %H:%M:%S")
    );
    for entry in entries {
        screen.push_str(&format_entry(entry));
        screen.push('\n');
    }
    screen.push_str("\nPress Ctrl+C to exit\n");
    screen
}

/// `[HH:MM:SS] name: value unit`，单位为空时省略。
fn format_entry(entry: &ValueUpdate) -> String {
    let time = entry.timestamp.with_timezone(&Local).format("%H:%M:%S");
    if entry.unit.is_empty() {
        format!("[{}] {}: {}", time, entry.name, entry.value)
    } else {
        format!("[{}] {}: {} {}", time, entry.name, entry.value, entry.unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use domain::PointValueData;

    fn update(name: &str, value: PointValueData, unit: &str) -> ValueUpdate {
        ValueUpdate {
            name: name.to_string(),
            value,
            unit: unit.to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 15).single().expect("ts"),
        }
    }

    #[test]
    fn renders_lines_with_and_without_unit() {
        let entries = vec![
            update("Temperature", PointValueData::F64(22.5), "C"),
            update("Running", PointValueData::Bool(true), ""),
        ];
        let now = Local.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).single().expect("now");
        let time = entries[0].timestamp.with_timezone(&Local).format("%H:%M:%S").to_string();

        let screen = render_screen(now, &entries);
        assert!(screen.contains(" OPC UA Terminal Monitor - 2024-05-01 10:00:00"));
        assert!(screen.contains(&format!("[{}] Temperature: 22.5 C\n", time)));
        assert!(screen.contains(&format!("[{}] Running: true\n", time)));
        assert!(screen.ends_with("Press Ctrl+C to exit\n"));
    }

    #[test]
    fn sink_keeps_first_seen_order_and_latest_value() {
        let monitor = TerminalMonitor::new();
        monitor.on_value(&update("B", PointValueData::I64(1), "")).expect("b");
        monitor.on_value(&update("A", PointValueData::I64(2), "")).expect("a");
        monitor.on_value(&update("B", PointValueData::I64(3), "")).expect("b again");

        let entries = monitor.entries();
        let names: Vec<&str> = entries.iter().map(|entry| entry.name.as_str()).collect();
        assert_eq!(names, vec!["B", "A"]);
        assert_eq!(entries[0].value, PointValueData::I64(3));
    }

    #[tokio::test]
    async fn start_and_stop_are_bounded() {
        let monitor = TerminalMonitor::new();
        monitor.stop().await;
        monitor.start();
        monitor.on_value(&update("A", PointValueData::I64(1), "")).expect("a");
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        monitor.stop().await;
        assert!(!monitor.inner.running.load(Ordering::SeqCst));
    }
}
