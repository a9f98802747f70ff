//! 进程内模拟数据源
//!
//! 行为与真实会话一致：未连接时拒绝操作，只对已监控节点投递变更，
//! 删除订阅后不再投递。可注入连接/订阅/读值失败。
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! let client = SimulatedClient::new(SimulatedConfig { change_interval_ms: Some(1000) })
//!     .with_value("ns=2;s=Temperature", 21.5);
//! client.connect(&session).await?;
//! ```

use crate::client::DataSourceClient;
use crate::error::ClientError;
use crate::types::{
    ChangeMetadata, DataChange, MonitoredHandle, NotificationSender, SessionConfig,
    SubscriptionId,
};
use async_trait::async_trait;
use chrono::Utc;
use domain::PointValueData;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

/// 模拟源配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulatedConfig {
    /// 自动变化周期（毫秒）；为空时只在 `set_value`/`emit` 时投递
    #[serde(default)]
    pub change_interval_ms: Option<u64>,
}

impl SimulatedConfig {
    /// 从 JSON 配置字符串解析
    pub fn from_json(json: &str) -> Result<Self, ClientError> {
        serde_json::from_str(json).map_err(|e| ClientError::Internal(format!("config: {}", e)))
    }
}

struct SimSubscription {
    sender: NotificationSender,
    items: HashMap<u32, String>,
    ticker: Option<JoinHandle<()>>,
}

impl SimSubscription {
    fn monitors(&self, node_id: &str) -> bool {
        self.items.values().any(|node| node == node_id)
    }
}

impl Drop for SimSubscription {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

#[derive(Default)]
struct SimState {
    connected: bool,
    next_id: u32,
    fail_connects: usize,
    fail_subscribe: HashSet<String>,
    fail_read: HashSet<String>,
    fail_unsubscribe: bool,
    values: HashMap<String, PointValueData>,
    subscriptions: HashMap<u32, SimSubscription>,
    calls: Vec<String>,
}

impl SimState {
    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn ensure_connected(&self) -> Result<(), ClientError> {
        if self.connected {
            Ok(())
        } else {
            Err(ClientError::NotConnected)
        }
    }

    /// 向监控了该节点的订阅投递变更
    fn deliver(&self, node_id: &str, value: &PointValueData) {
        for subscription in self.subscriptions.values() {
            if subscription.monitors(node_id) {
                let _ = subscription.sender.send(change_now(node_id, value.clone()));
            }
        }
    }
}

fn change_now(node_id: &str, value: PointValueData) -> DataChange {
    DataChange {
        node_id: node_id.to_string(),
        value,
        metadata: ChangeMetadata {
            source_timestamp: Some(Utc::now()),
            status: Some("Good".to_string()),
        },
    }
}

/// 模拟数据源客户端
#[derive(Clone, Default)]
pub struct SimulatedClient {
    config: SimulatedConfig,
    state: Arc<Mutex<SimState>>,
}

impl SimulatedClient {
    pub fn new(config: SimulatedConfig) -> Self {
        Self {
            config,
            state: Arc::default(),
        }
    }

    /// 预置节点当前值
    pub fn with_value(self, node_id: impl Into<String>, value: impl Into<PointValueData>) -> Self {
        self.lock().values.insert(node_id.into(), value.into());
        self
    }

    /// 更新节点值；已监控时向订阅投递变更
    pub fn set_value(&self, node_id: &str, value: impl Into<PointValueData>) {
        let value = value.into();
        let mut state = self.lock();
        state.deliver(node_id, &value);
        state.values.insert(node_id.to_string(), value);
    }

    /// 原样投递一条通知到所有活动订阅（不校验节点是否被监控）
    pub fn emit(&self, change: DataChange) -> usize {
        let state = self.lock();
        state
            .subscriptions
            .values()
            .filter(|subscription| subscription.sender.send(change.clone()).is_ok())
            .count()
    }

    /// 接下来 `count` 次连接失败
    pub fn fail_next_connects(&self, count: usize) {
        self.lock().fail_connects = count;
    }

    /// 该节点的监控项创建失败
    pub fn fail_subscribe_for(&self, node_id: impl Into<String>) {
        self.lock().fail_subscribe.insert(node_id.into());
    }

    /// 该节点读值失败
    pub fn fail_read_for(&self, node_id: impl Into<String>) {
        self.lock().fail_read.insert(node_id.into());
    }

    /// 删除监控项时返回错误（项仍会被移除）
    pub fn fail_unsubscribe(&self, fail: bool) {
        self.lock().fail_unsubscribe = fail;
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    pub fn subscription_count(&self) -> usize {
        self.lock().subscriptions.len()
    }

    /// 当前被监控的节点（排序）
    pub fn monitored_nodes(&self) -> Vec<String> {
        let state = self.lock();
        let mut nodes: Vec<String> = state
            .subscriptions
            .values()
            .flat_map(|subscription| subscription.items.values().cloned())
            .collect();
        nodes.sort();
        nodes
    }

    /// 调用记录（按发生顺序）
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl DataSourceClient for SimulatedClient {
    async fn connect(&self, config: &SessionConfig) -> Result<(), ClientError> {
        let mut state = self.lock();
        state.calls.push("connect".to_string());
        if state.fail_connects > 0 {
            state.fail_connects -= 1;
            return Err(ClientError::Connection(format!(
                "simulated endpoint {} refused connection",
                config.endpoint
            )));
        }
        state.connected = true;
        info!(
            target: "bridge.protocol.simulated",
            endpoint = %config.endpoint,
            security_policy = %config.security_policy,
            security_mode = %config.security_mode,
            "session_opened"
        );
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ClientError> {
        let mut state = self.lock();
        state.calls.push("disconnect".to_string());
        state.subscriptions.clear();
        state.connected = false;
        Ok(())
    }

    async fn create_subscription(
        &self,
        interval_ms: u64,
        notifications: NotificationSender,
    ) -> Result<SubscriptionId, ClientError> {
        let mut state = self.lock();
        state.ensure_connected()?;
        let id = state.next_id();
        state.calls.push(format!("create_subscription:{}", id));

        let ticker = self
            .config
            .change_interval_ms
            .map(|period| spawn_ticker(Arc::downgrade(&self.state), id, period));
        state.subscriptions.insert(
            id,
            SimSubscription {
                sender: notifications,
                items: HashMap::new(),
                ticker,
            },
        );
        debug!(
            target: "bridge.protocol.simulated",
            subscription_id = id,
            interval_ms,
            "subscription_created"
        );
        Ok(SubscriptionId(id))
    }

    async fn subscribe_data_change(
        &self,
        subscription: SubscriptionId,
        node_id: &str,
    ) -> Result<MonitoredHandle, ClientError> {
        let mut state = self.lock();
        state.ensure_connected()?;
        state.calls.push(format!("subscribe:{}", node_id));
        if state.fail_subscribe.contains(node_id) {
            return Err(ClientError::MonitoredItem {
                node_id: node_id.to_string(),
                reason: "BadNodeIdUnknown".to_string(),
            });
        }
        let handle = state.next_id();
        let entry = state
            .subscriptions
            .get_mut(&subscription.0)
            .ok_or_else(|| ClientError::Subscription(format!("unknown subscription {}", subscription)))?;
        entry.items.insert(handle, node_id.to_string());
        Ok(MonitoredHandle(handle))
    }

    async fn unsubscribe(
        &self,
        subscription: SubscriptionId,
        handle: MonitoredHandle,
    ) -> Result<(), ClientError> {
        let mut state = self.lock();
        state.calls.push(format!("unsubscribe:{}", handle));
        let removed = state
            .subscriptions
            .get_mut(&subscription.0)
            .and_then(|entry| entry.items.remove(&handle.0));
        let node_id = removed.ok_or_else(|| {
            ClientError::Subscription(format!("unknown monitored item {}", handle))
        })?;
        if state.fail_unsubscribe {
            return Err(ClientError::MonitoredItem {
                node_id,
                reason: "BadTimeout".to_string(),
            });
        }
        Ok(())
    }

    async fn delete_subscription(&self, subscription: SubscriptionId) -> Result<(), ClientError> {
        let mut state = self.lock();
        state.calls.push(format!("delete_subscription:{}", subscription));
        state
            .subscriptions
            .remove(&subscription.0)
            .map(|_| ())
            .ok_or_else(|| ClientError::Subscription(format!("unknown subscription {}", subscription)))
    }

    async fn read_value(&self, node_id: &str) -> Result<PointValueData, ClientError> {
        let state = self.lock();
        state.ensure_connected()?;
        let read_error = |reason: &str| ClientError::Read {
            node_id: node_id.to_string(),
            reason: reason.to_string(),
        };
        if state.fail_read.contains(node_id) {
            return Err(read_error("BadCommunicationError"));
        }
        state
            .values
            .get(node_id)
            .cloned()
            .ok_or_else(|| read_error("BadNodeIdUnknown"))
    }
}

/// 周期性推进已监控节点的值
fn spawn_ticker(state: Weak<Mutex<SimState>>, subscription_id: u32, period_ms: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_millis(period_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut step: u64 = 0;
        loop {
            ticker.tick().await;
            step += 1;
            let Some(state) = state.upgrade() else { break };
            let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(subscription) = state.subscriptions.get(&subscription_id) else {
                break;
            };
            let nodes: Vec<String> = subscription.items.values().cloned().collect();
            for node_id in nodes {
                let Some(next) = next_value(state.values.get(&node_id), step) else {
                    continue;
                };
                state.deliver(&node_id, &next);
                state.values.insert(node_id, next);
            }
        }
    })
}

fn next_value(current: Option<&PointValueData>, step: u64) -> Option<PointValueData> {
    let wave = ((step as f64) * 0.7).sin();
    match current {
        None => Some(PointValueData::F64(0.0)),
        Some(PointValueData::F64(value)) => {
            Some(PointValueData::F64(((value + wave) * 100.0).round() / 100.0))
        }
        Some(PointValueData::I64(value)) => Some(PointValueData::I64(value.wrapping_add(1))),
        Some(PointValueData::Bool(value)) => (step % 5 == 0).then_some(PointValueData::Bool(!value)),
        Some(PointValueData::String(_)) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SecurityMode, SecurityPolicy};
    use tokio::sync::mpsc;

    fn session() -> SessionConfig {
        SessionConfig {
            endpoint: "opc.tcp://sim:4840".to_string(),
            application_uri: "urn:test".to_string(),
            security_policy: SecurityPolicy::None,
            security_mode: SecurityMode::None,
            credentials: None,
        }
    }

    #[tokio::test]
    async fn operations_require_connection() {
        let client = SimulatedClient::default().with_value("n1", 1_i64);
        let (tx, _rx) = mpsc::unbounded_channel();

        assert!(matches!(client.read_value("n1").await, Err(ClientError::NotConnected)));
        assert!(matches!(
            client.create_subscription(100, tx).await,
            Err(ClientError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn injected_connect_failures_are_consumed() {
        let client = SimulatedClient::default();
        client.fail_next_connects(1);

        assert!(client.connect(&session()).await.is_err());
        client.connect(&session()).await.expect("second attempt");
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn set_value_reaches_only_monitored_nodes() {
        let client = SimulatedClient::default();
        client.connect(&session()).await.expect("connect");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = client.create_subscription(100, tx).await.expect("sub");
        client.subscribe_data_change(sub, "a").await.expect("item");

        client.set_value("b", 2.0);
        client.set_value("a", 1.0);

        let change = rx.recv().await.expect("change");
        assert_eq!(change.node_id, "a");
        assert_eq!(change.value, PointValueData::F64(1.0));
        assert!(rx.try_recv().is_err());
        assert_eq!(
            client.read_value("b").await.expect("read"),
            PointValueData::F64(2.0)
        );
    }

    #[tokio::test]
    async fn deleted_subscription_stops_delivery() {
        let client = SimulatedClient::default();
        client.connect(&session()).await.expect("connect");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = client.create_subscription(100, tx).await.expect("sub");
        client.subscribe_data_change(sub, "a").await.expect("item");

        client.delete_subscription(sub).await.expect("delete");
        client.set_value("a", 3_i64);

        assert!(rx.recv().await.is_none());
        assert_eq!(client.subscription_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_advances_monitored_values() {
        let client = SimulatedClient::new(SimulatedConfig {
            change_interval_ms: Some(100),
        })
        .with_value("counter", 10_i64);
        client.connect(&session()).await.expect("connect");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = client.create_subscription(100, tx).await.expect("sub");
        client.subscribe_data_change(sub, "counter").await.expect("item");

        let first = rx.recv().await.expect("first tick");
        let second = rx.recv().await.expect("second tick");
        assert_eq!(first.value, PointValueData::I64(11));
        assert_eq!(second.value, PointValueData::I64(12));
    }

    #[test]
    fn config_parses_from_json() {
        let config = SimulatedConfig::from_json(r#"{"change_interval_ms": 250}"#).expect("config");
        assert_eq!(config.change_interval_ms, Some(250));
        assert_eq!(SimulatedConfig::from_json("{}").expect("empty").change_interval_ms, None);
    }
}
