//! # 数据源客户端能力模块
//!
//! 订阅引擎只通过 [`DataSourceClient`] 与数据源交互，提供两种实现：
//! - **OpcUaClient**：基于 `opcua` crate 的真实会话（`opcua-client` 特性）
//! - **SimulatedClient**：进程内模拟源，用于本地运行与测试
//!
//! ## 架构设计
//!
//! ```text
//! SessionConfig (endpoint + security + credentials)
//!       │
//!       ▼
//! DataSourceClient
//!       │
//!       ├── OpcUaClient
//!       └── SimulatedClient
//!       │
//!       ▼
//! NotificationSender (DataChange)
//!       │
//!       ▼
//! SubscriptionEngine → ValueCache → sinks
//! ```
//!
//! ## 模拟源配置
//!
//! ```json
//! { "change_interval_ms": 1000 }
//! ```

mod client;
mod error;
#[cfg(feature = "opcua-client")]
mod opcua_client;
mod simulated;
mod types;

pub use client::DataSourceClient;
pub use error::ClientError;
#[cfg(feature = "opcua-client")]
pub use opcua_client::OpcUaClient;
pub use simulated::{SimulatedClient, SimulatedConfig};
pub use types::*;
