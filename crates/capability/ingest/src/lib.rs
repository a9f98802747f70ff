//! # 订阅与分发核心
//!
//! - [`SubscriptionEngine`]：会话与订阅生命周期，通知映射为点位值
//! - [`ValueCache`]：点位最新值，单写多读
//! - [`NotificationDispatcher`]：按注册顺序向 sink 分发变更，逐个隔离失败
//!
//! ```text
//! DataSourceClient ──DataChange──▶ 处理任务 ──▶ ValueCache
//!                                      │
//!                                      └──▶ NotificationDispatcher ──▶ sinks
//! ```

mod cache;
mod dispatcher;
mod engine;

pub use cache::ValueCache;
pub use dispatcher::{NotificationDispatcher, SinkError, ValueSink, sink_fn};
pub use engine::{
    ConnectError, DEFAULT_SUBSCRIPTION_INTERVAL_MS, EngineState, SubscribeError,
    SubscribeSummary, SubscriptionEngine,
};
