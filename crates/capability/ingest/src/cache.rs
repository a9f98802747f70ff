//! 点位最新值缓存。
//!
//! 只有订阅引擎的处理任务写入；HTTP、终端、MQTT 等读取方随时读取。

use domain::ValueRecord;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

/// 点位名 → 最新值。克隆后共享同一份数据。
#[derive(Debug, Clone, Default)]
pub struct ValueCache {
    values: Arc<RwLock<HashMap<String, ValueRecord>>>,
}

impl ValueCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 单点读取；从未上报的点位返回 `None`。
    pub fn get(&self, name: &str) -> Option<ValueRecord> {
        self.values
            .read()
            .map(|values| values.get(name).cloned())
            .unwrap_or(None)
    }

    /// 一次读锁内复制全部记录，按名称排序。
    pub fn snapshot(&self) -> BTreeMap<String, ValueRecord> {
        self.values
            .read()
            .map(|values| {
                values
                    .iter()
                    .map(|(name, record)| (name.clone(), record.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.values.read().map(|values| values.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 整条替换。
    pub(crate) fn insert(&self, name: &str, record: ValueRecord) {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.insert(name.to_string(), record);
    }

    /// 新会话开始前清空，处理任务未运行时调用。
    pub(crate) fn clear(&self) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
