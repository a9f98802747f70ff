use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 点位值的数据类型（数据源原样给出的标量）。
///
/// JSON 中直接序列化为数字 / 布尔 / 字符串。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointValueData {
    I64(i64),
    F64(f64),
    Bool(bool),
    String(String),
}

impl fmt::Display for PointValueData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointValueData::I64(v) => write!(f, "{}", v),
            PointValueData::F64(v) => write!(f, "{}", v),
            PointValueData::Bool(v) => write!(f, "{}", v),
            PointValueData::String(v) => f.write_str(v),
        }
    }
}

impl From<i64> for PointValueData {
    fn from(value: i64) -> Self {
        Self::I64(value)
    }
}

impl From<f64> for PointValueData {
    fn from(value: f64) -> Self {
        Self::F64(value)
    }
}

impl From<bool> for PointValueData {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for PointValueData {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PointValueData {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// 点位最新值记录。
///
/// 每次更新整体替换，不做原地修改。通知产生的记录使用接收时间。
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRecord {
    pub value: PointValueData,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
}

/// 推送给下游 sink 的单条变更。
#[derive(Debug, Clone, PartialEq)]
pub struct ValueUpdate {
    pub name: String,
    pub value: PointValueData,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
}

impl ValueUpdate {
    /// 拆出缓存记录部分。
    pub fn record(&self) -> ValueRecord {
        ValueRecord {
            value: self.value.clone(),
            unit: self.unit.clone(),
            timestamp: self.timestamp,
        }
    }
}
