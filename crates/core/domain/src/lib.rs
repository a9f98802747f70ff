pub mod data;

pub use data::{PointValueData, ValueRecord, ValueUpdate};

use serde::{Deserialize, Serialize};

/// 监控点位：数据源中的一个命名数据项。
///
/// 从配置加载后不可变；列表顺序即订阅顺序，查找按 `id` 精确匹配。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredPoint {
    /// 数据源侧标识（如 OPC UA NodeId 字符串 `ns=2;s=Temperature`）。
    pub id: String,
    /// 会话内唯一的可读名称，作为缓存与 topic 的键。
    pub name: String,
    /// 显示单位（可选）。
    #[serde(default)]
    pub unit: Option<String>,
}

impl MonitoredPoint {
    pub fn new(id: impl Into<String>, name: impl Into<String>, unit: Option<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            unit,
        }
    }

    /// 单位，缺省为空串。
    pub fn unit_or_empty(&self) -> &str {
        self.unit.as_deref().unwrap_or("")
    }
}
