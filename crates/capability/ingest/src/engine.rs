//! 订阅引擎：会话生命周期、订阅建立/拆除、通知到点位名的映射。
//!
//! 状态流转：`Disconnected → Connecting → Connected → Subscribing → Active → Disconnected`。
//! 客户端把通知写入入站通道，由单个处理任务消费；该任务是缓存的唯一写入方。
//! 订阅时的初始读值同样经该通道送达，`subscribe` 返回前等待其全部写入缓存。

use crate::cache::ValueCache;
use crate::dispatcher::NotificationDispatcher;
use bridge_protocol::{
    ClientError, DataChange, DataSourceClient, MonitoredHandle, NotificationReceiver,
    NotificationSender, SessionConfig, SubscriptionId,
};
use bridge_telemetry::{
    record_notification_received, record_notification_unmatched, record_value_seeded,
};
use chrono::Utc;
use domain::{MonitoredPoint, ValueUpdate};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 默认订阅发布间隔（毫秒）。
pub const DEFAULT_SUBSCRIPTION_INTERVAL_MS: u64 = 500;

/// 引擎状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Disconnected,
    Connecting,
    Connected,
    Subscribing,
    Active,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Subscribing => "subscribing",
            Self::Active => "active",
        };
        f.write_str(label)
    }
}

/// 连接失败。
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("connect not allowed in state {0}")]
    InvalidState(EngineState),
    #[error("session error: {0}")]
    Session(#[source] ClientError),
}

/// 订阅失败。
#[derive(Debug, thiserror::Error)]
pub enum SubscribeError {
    #[error("not connected")]
    NotConnected,
    #[error("already subscribed")]
    AlreadySubscribed,
    #[error("subscription error: {0}")]
    Subscription(#[source] ClientError),
}

/// 订阅结果：成功与失败的点位名（按订阅顺序）。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscribeSummary {
    pub subscribed: Vec<String>,
    pub failed: Vec<String>,
}

struct Processor {
    seeds: NotificationSender,
    flush: mpsc::UnboundedSender<oneshot::Sender<()>>,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// 订阅引擎。
pub struct SubscriptionEngine {
    client: Arc<dyn DataSourceClient>,
    interval_ms: u64,
    state: EngineState,
    points: Vec<MonitoredPoint>,
    cache: ValueCache,
    dispatcher: NotificationDispatcher,
    subscription: Option<SubscriptionId>,
    handles: Vec<(String, MonitoredHandle)>,
    processor: Option<Processor>,
}

impl SubscriptionEngine {
    pub fn new(client: Arc<dyn DataSourceClient>) -> Self {
        Self {
            client,
            interval_ms: DEFAULT_SUBSCRIPTION_INTERVAL_MS,
            state: EngineState::Disconnected,
            points: Vec::new(),
            cache: ValueCache::new(),
            dispatcher: NotificationDispatcher::new(),
            subscription: None,
            handles: Vec::new(),
            processor: None,
        }
    }

    pub fn with_interval_ms(mut self, interval_ms: u64) -> Self {
        self.interval_ms = interval_ms.max(1);
        self
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// 缓存读句柄。
    pub fn cache(&self) -> &ValueCache {
        &self.cache
    }

    /// sink 注册句柄。
    pub fn dispatcher(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }

    /// 最近一次 `subscribe` 的点位列表。
    pub fn points(&self) -> &[MonitoredPoint] {
        &self.points
    }

    /// 建立会话；仅允许在 `Disconnected` 调用，失败后可重试。
    ///
    /// 上一次会话的缓存值在此清空。
    pub async fn connect(&mut self, config: &SessionConfig) -> Result<(), ConnectError> {
        if self.state != EngineState::Disconnected {
            return Err(ConnectError::InvalidState(self.state));
        }
        self.state = EngineState::Connecting;
        self.cache.clear();
        info!(
            target: "bridge.ingest",
            endpoint = %config.endpoint,
            security_policy = %config.security_policy,
            security_mode = %config.security_mode,
            "engine_connecting"
        );
        match self.client.connect(config).await {
            Ok(()) => {
                self.state = EngineState::Connected;
                info!(target: "bridge.ingest", endpoint = %config.endpoint, "engine_connected");
                Ok(())
            }
            Err(err) => {
                self.state = EngineState::Disconnected;
                warn!(
                    target: "bridge.ingest",
                    endpoint = %config.endpoint,
                    error = %err,
                    "engine_connect_failed"
                );
                Err(ConnectError::Session(err))
            }
        }
    }

    /// 创建订阅并逐点建立监控项；单点失败记录后跳过。
    pub async fn subscribe(
        &mut self,
        points: Vec<MonitoredPoint>,
    ) -> Result<SubscribeSummary, SubscribeError> {
        match self.state {
            EngineState::Connected => {}
            EngineState::Subscribing | EngineState::Active => {
                return Err(SubscribeError::AlreadySubscribed);
            }
            EngineState::Disconnected | EngineState::Connecting => {
                return Err(SubscribeError::NotConnected);
            }
        }
        self.state = EngineState::Subscribing;
        self.points = points;

        let (sender, receiver) = mpsc::unbounded_channel();
        let processor = spawn_processor(
            sender.clone(),
            receiver,
            index_points(&self.points),
            self.cache.clone(),
            self.dispatcher.clone(),
        );

        let subscription = match self
            .client
            .create_subscription(self.interval_ms, sender)
            .await
        {
            Ok(subscription) => subscription,
            Err(err) => {
                warn!(target: "bridge.ingest", error = %err, "subscription_create_failed");
                processor.shutdown().await;
                self.state = EngineState::Connected;
                return Err(SubscribeError::Subscription(err));
            }
        };
        self.subscription = Some(subscription);
        info!(
            target: "bridge.ingest",
            subscription_id = %subscription,
            interval_ms = self.interval_ms,
            points = self.points.len(),
            "subscription_created"
        );

        let mut summary = SubscribeSummary::default();
        for point in &self.points {
            match self.client.subscribe_data_change(subscription, &point.id).await {
                Ok(handle) => {
                    self.handles.push((point.name.clone(), handle));
                    summary.subscribed.push(point.name.clone());
                    debug!(
                        target: "bridge.ingest",
                        point = %point.name,
                        node_id = %point.id,
                        handle = %handle,
                        "point_subscribed"
                    );
                    self.seed(&processor.seeds, point).await;
                }
                Err(err) => {
                    summary.failed.push(point.name.clone());
                    warn!(
                        target: "bridge.ingest",
                        point = %point.name,
                        node_id = %point.id,
                        error = %err,
                        "point_subscribe_failed"
                    );
                }
            }
        }
        // 初始读值全部落入缓存并分发后再返回
        processor.flush().await;
        self.processor = Some(processor);
        self.state = EngineState::Active;
        info!(
            target: "bridge.ingest",
            subscribed = summary.subscribed.len(),
            failed = summary.failed.len(),
            "subscription_active"
        );
        Ok(summary)
    }

    /// 初始读值，作为一条普通通知送入处理通道。
    async fn seed(&self, seeds: &NotificationSender, point: &MonitoredPoint) {
        match self.client.read_value(&point.id).await {
            Ok(value) => {
                if seeds.send(DataChange::new(point.id.clone(), value)).is_ok() {
                    record_value_seeded();
                }
            }
            Err(err) => {
                warn!(
                    target: "bridge.ingest",
                    point = %point.name,
                    node_id = %point.id,
                    error = %err,
                    "initial_read_failed"
                );
            }
        }
    }

    /// 拆除订阅并关闭会话；任何状态下都可调用，结束后处于 `Disconnected`。
    pub async fn disconnect(&mut self) {
        if self.state == EngineState::Disconnected && self.processor.is_none() {
            return;
        }
        info!(target: "bridge.ingest", state = %self.state, "engine_disconnecting");

        let handles = std::mem::take(&mut self.handles);
        if let Some(subscription) = self.subscription {
            for (name, handle) in handles {
                if let Err(err) = self.client.unsubscribe(subscription, handle).await {
                    warn!(
                        target: "bridge.ingest",
                        point = %name,
                        handle = %handle,
                        error = %err,
                        "point_unsubscribe_failed"
                    );
                }
            }
        }

        if let Some(subscription) = self.subscription.take() {
            if let Err(err) = self.client.delete_subscription(subscription).await {
                warn!(
                    target: "bridge.ingest",
                    subscription_id = %subscription,
                    error = %err,
                    "subscription_delete_failed"
                );
            }
        }

        if let Some(processor) = self.processor.take() {
            processor.shutdown().await;
        }

        if let Err(err) = self.client.disconnect().await {
            warn!(target: "bridge.ingest", error = %err, "session_close_failed");
        }
        self.state = EngineState::Disconnected;
        info!(target: "bridge.ingest", "engine_disconnected");
    }
}

impl Drop for SubscriptionEngine {
    fn drop(&mut self) {
        if let Some(processor) = self.processor.take() {
            processor.task.abort();
        }
    }
}

impl Processor {
    /// 等待处理任务消费完此前入队的全部变更。
    async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.flush.send(ack).is_ok() {
            let _ = done.await;
        }
    }

    /// 已入队的变更先处理完，再退出任务。
    async fn shutdown(self) {
        let _ = self.stop.send(());
        drop(self.seeds);
        if let Err(err) = self.task.await {
            warn!(target: "bridge.ingest", error = %err, "processor_join_failed");
        }
    }
}

/// 按 id 精确匹配；重复 id 以先出现者为准。
fn index_points(points: &[MonitoredPoint]) -> HashMap<String, MonitoredPoint> {
    let mut index = HashMap::with_capacity(points.len());
    for point in points {
        index
            .entry(point.id.clone())
            .or_insert_with(|| point.clone());
    }
    index
}

fn spawn_processor(
    seeds: NotificationSender,
    mut receiver: NotificationReceiver,
    index: HashMap<String, MonitoredPoint>,
    cache: ValueCache,
    dispatcher: NotificationDispatcher,
) -> Processor {
    let (stop, mut stop_rx) = oneshot::channel();
    let (flush, mut flush_rx) = mpsc::unbounded_channel::<oneshot::Sender<()>>();
    let task = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = &mut stop_rx => {
                    drain(&mut receiver, &index, &cache, &dispatcher);
                    break;
                }
                Some(ack) = flush_rx.recv() => {
                    drain(&mut receiver, &index, &cache, &dispatcher);
                    let _ = ack.send(());
                }
                change = receiver.recv() => match change {
                    Some(change) => apply_change(&index, &cache, &dispatcher, change),
                    None => break,
                },
            }
        }
        debug!(target: "bridge.ingest", "processor_stopped");
    });
    Processor {
        seeds,
        flush,
        stop,
        task,
    }
}

/// 处理通道中当前已有的全部变更，不等待新的到达。
fn drain(
    receiver: &mut NotificationReceiver,
    index: &HashMap<String, MonitoredPoint>,
    cache: &ValueCache,
    dispatcher: &NotificationDispatcher,
) {
    while let Ok(change) = receiver.try_recv() {
        apply_change(index, cache, dispatcher, change);
    }
}

fn apply_change(
    index: &HashMap<String, MonitoredPoint>,
    cache: &ValueCache,
    dispatcher: &NotificationDispatcher,
    change: DataChange,
) {
    record_notification_received();
    let Some(point) = index.get(&change.node_id) else {
        record_notification_unmatched();
        warn!(target: "bridge.ingest", node_id = %change.node_id, "notification_unmatched");
        return;
    };

    let update = ValueUpdate {
        name: point.name.clone(),
        value: change.value,
        unit: point.unit_or_empty().to_string(),
        timestamp: Utc::now(),
    };
    cache.insert(&update.name, update.record());
    info!(
        target: "bridge.ingest",
        point = %update.name,
        value = %update.value,
        unit = %update.unit,
        source_timestamp = ?change.metadata.source_timestamp,
        status = ?change.metadata.status,
        "value_changed"
    );
    dispatcher.fanout(&update);
}
