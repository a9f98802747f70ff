//! 数据源客户端能力抽象
//!
//! 引擎只依赖以下能力：建立/关闭会话、创建/删除订阅、创建/删除监控项、读值，
//! 以及通过通道投递的数据变更通知。

use crate::error::ClientError;
use crate::types::{MonitoredHandle, NotificationSender, SessionConfig, SubscriptionId};
use async_trait::async_trait;
use domain::PointValueData;

/// 数据源客户端
#[async_trait]
pub trait DataSourceClient: Send + Sync {
    /// 建立会话（服务端证书不做链校验）。
    async fn connect(&self, config: &SessionConfig) -> Result<(), ClientError>;

    /// 关闭会话。
    async fn disconnect(&self) -> Result<(), ClientError>;

    /// 创建变更订阅；之后的通知按投递顺序写入 `notifications`。
    async fn create_subscription(
        &self,
        interval_ms: u64,
        notifications: NotificationSender,
    ) -> Result<SubscriptionId, ClientError>;

    /// 为单个节点创建监控项。
    async fn subscribe_data_change(
        &self,
        subscription: SubscriptionId,
        node_id: &str,
    ) -> Result<MonitoredHandle, ClientError>;

    /// 删除监控项。
    async fn unsubscribe(
        &self,
        subscription: SubscriptionId,
        handle: MonitoredHandle,
    ) -> Result<(), ClientError>;

    /// 删除订阅；返回后不再投递该订阅的通知。
    async fn delete_subscription(&self, subscription: SubscriptionId) -> Result<(), ClientError>;

    /// 同步读取节点当前值。
    async fn read_value(&self, node_id: &str) -> Result<PointValueData, ClientError>;
}
