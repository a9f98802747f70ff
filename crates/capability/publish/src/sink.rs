//! MQTT sink：按点位名保存最近一次变更，等待定时发布。

use crate::PublishError;
use api_contract::ValuePayload;
use bridge_ingest::{SinkError, ValueSink};
use domain::ValueUpdate;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

/// 默认 topic 前缀。
pub const DEFAULT_TOPIC_PREFIX: &str = "opcua/plc/";

/// 本地快照。克隆后共享同一份数据。
#[derive(Debug, Clone)]
pub struct MqttSink {
    topic_prefix: String,
    latest: Arc<RwLock<BTreeMap<String, ValuePayload>>>,
}

impl Default for MqttSink {
    fn default() -> Self {
        Self::new(DEFAULT_TOPIC_PREFIX)
    }
}

impl MqttSink {
    pub fn new(topic_prefix: impl Into<String>) -> Self {
        Self {
            topic_prefix: topic_prefix.into(),
            latest: Arc::default(),
        }
    }

    /// `<prefix><point name>`，前缀原样拼接。
    pub fn topic_for(&self, name: &str) -> String {
        format!("{}{}", self.topic_prefix, name)
    }

    pub fn len(&self) -> usize {
        self.latest.read().map(|latest| latest.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 当前快照，按点位名排序。
    pub fn snapshot(&self) -> BTreeMap<String, ValuePayload> {
        self.latest
            .read()
            .map(|latest| latest.clone())
            .unwrap_or_default()
    }

    /// 快照转为 (topic, JSON 载荷)。
    pub fn messages(&self) -> Result<Vec<(String, Vec<u8>)>, PublishError> {
        self.snapshot()
            .iter()
            .map(|(name, payload)| {
                serde_json::to_vec(payload)
                    .map(|bytes| (self.topic_for(name), bytes))
                    .map_err(|err| PublishError::Payload(err.to_string()))
            })
            .collect()
    }
}

impl ValueSink for MqttSink {
    fn on_value(&self, update: &ValueUpdate) -> Result<(), SinkError> {
        self.latest
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(update.name.clone(), ValuePayload::from(update));
        Ok(())
    }

    fn name(&self) -> &str {
        "mqtt"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use domain::PointValueData;

    fn update(name: &str, value: PointValueData, unit: &str) -> ValueUpdate {
        ValueUpdate {
            name: name.to_string(),
            value,
            unit: unit.to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).single().expect("ts"),
        }
    }

    #[test]
    fn keeps_latest_value_per_point() {
        let sink = MqttSink::default();
        sink.on_value(&update("Temperature", PointValueData::F64(21.5), "C"))
            .expect("first");
        sink.on_value(&update("Temperature", PointValueData::F64(22.0), "C"))
            .expect("second");

        let snapshot = sink.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot["Temperature"].value, PointValueData::F64(22.0));
    }

    #[test]
    fn messages_use_prefix_topic_and_json_payload() {
        let sink = MqttSink::new("plant/line1/");
        sink.on_value(&update("Pressure", PointValueData::I64(3), "bar"))
            .expect("update");

        let messages = sink.messages().expect("messages");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, "plant/line1/Pressure");
        let json: serde_json::Value = serde_json::from_slice(&messages[0].1).expect("json");
        assert_eq!(json["value"], 3);
        assert_eq!(json["unit"], "bar");
        assert_eq!(json["timestamp"], "2024-05-01T08:30:00Z");
    }

    #[test]
    fn default_prefix_matches_gateway_layout() {
        assert_eq!(MqttSink::default().topic_for("A"), "opcua/plc/A");
    }
}
