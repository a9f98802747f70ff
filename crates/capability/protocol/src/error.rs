//! 数据源客户端错误类型定义

/// 数据源客户端错误
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// 会话建立失败
    #[error("connection error: {0}")]
    Connection(String),

    /// 未连接
    #[error("not connected")]
    NotConnected,

    /// 订阅创建/删除失败
    #[error("subscription error: {0}")]
    Subscription(String),

    /// 单个监控项创建/删除失败
    #[error("monitored item error for {node_id}: {reason}")]
    MonitoredItem { node_id: String, reason: String },

    /// 读值失败
    #[error("read error for {node_id}: {reason}")]
    Read { node_id: String, reason: String },

    /// 当前构建不支持
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// 内部错误（锁、任务等）
    #[error("internal error: {0}")]
    Internal(String),
}
