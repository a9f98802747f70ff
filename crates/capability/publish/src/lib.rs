//! # MQTT 下游
//!
//! - [`MqttSink`]：变更只写本地快照，不做网络 I/O
//! - [`PublishScheduler`]：独立定时循环，按固定周期整体重发快照
//! - [`MqttPublisher`]：rumqttc 客户端，跟踪 broker 连接状态

mod mqtt;
mod scheduler;
mod sink;

use async_trait::async_trait;

pub use mqtt::{MqttPublisher, MqttPublisherConfig};
pub use scheduler::{DEFAULT_PUBLISH_INTERVAL, DEFAULT_STOP_TIMEOUT, PublishScheduler};
pub use sink::{DEFAULT_TOPIC_PREFIX, MqttSink};

/// 发布链路错误。
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("publish error: {0}")]
    Publish(String),
    #[error("payload error: {0}")]
    Payload(String),
}

/// 消息发布器抽象。
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError>;

    /// 下游可用（如 broker 已连接）时才发布。
    fn is_ready(&self) -> bool;
}
