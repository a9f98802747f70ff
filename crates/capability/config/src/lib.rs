//! 桥接进程运行配置加载（环境变量 + 点位 JSON 文件）。

use bridge_protocol::{SecurityMode, SecurityPolicy};
use domain::MonitoredPoint;
use std::collections::HashSet;
use std::env;
use std::path::Path;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
    #[error("points file {0}: {1}")]
    Points(String, String),
}

/// 数据源客户端实现选择。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientKind {
    /// 真实 OPC UA 客户端（需 `opcua-client` 特性）。
    OpcUa,
    /// 进程内模拟数据源。
    Simulated,
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub opcua_endpoint: String,
    pub opcua_application_uri: String,
    pub opcua_security_policy: SecurityPolicy,
    pub opcua_security_mode: SecurityMode,
    pub opcua_client: ClientKind,
    pub subscription_interval_ms: u64,
    pub cert_dir: String,
    pub points_file: String,
    pub points: Vec<MonitoredPoint>,
    pub mqtt_enabled: bool,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_client_id: String,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_topic_prefix: String,
    pub mqtt_publish_interval_ms: u64,
    pub mqtt_qos: u8,
    pub http_enabled: bool,
    pub http_addr: String,
    pub http_cors: bool,
    pub terminal_enabled: bool,
}

impl AppConfig {
    /// 从环境变量读取配置，并加载点位文件。
    pub fn from_env() -> Result<Self, ConfigError> {
        let opcua_endpoint = env::var("BRIDGE_OPCUA_ENDPOINT")
            .map_err(|_| ConfigError::Missing("BRIDGE_OPCUA_ENDPOINT".to_string()))?;
        let opcua_application_uri = env::var("BRIDGE_OPCUA_APPLICATION_URI")
            .map_err(|_| ConfigError::Missing("BRIDGE_OPCUA_APPLICATION_URI".to_string()))?;
        let opcua_security_policy = read_parsed_with_default(
            "BRIDGE_OPCUA_SECURITY_POLICY",
            SecurityPolicy::Basic256Sha256,
        )?;
        let opcua_security_mode =
            read_parsed_with_default("BRIDGE_OPCUA_SECURITY_MODE", SecurityMode::SignAndEncrypt)?;
        let opcua_client = read_client_kind("BRIDGE_OPCUA_CLIENT")?;
        let subscription_interval_ms =
            read_parsed_with_default::<u64>("BRIDGE_SUBSCRIPTION_INTERVAL_MS", 500)?;
        let cert_dir = env::var("BRIDGE_CERT_DIR").unwrap_or_else(|_| "certificates".to_string());
        let points_file =
            env::var("BRIDGE_POINTS_FILE").unwrap_or_else(|_| "points.json".to_string());
        let points = load_points(&points_file)?;

        let mqtt_enabled = read_bool_with_default("BRIDGE_MQTT", true);
        let mqtt_host = env::var("BRIDGE_MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let mqtt_port = read_parsed_with_default::<u16>("BRIDGE_MQTT_PORT", 1883)?;
        let mqtt_client_id =
            env::var("BRIDGE_MQTT_CLIENT_ID").unwrap_or_else(|_| "opc_gateway".to_string());
        let mqtt_username = read_optional("BRIDGE_MQTT_USERNAME");
        let mqtt_password = read_optional("BRIDGE_MQTT_PASSWORD");
        let mqtt_topic_prefix =
            env::var("BRIDGE_MQTT_TOPIC_PREFIX").unwrap_or_else(|_| "opcua/plc/".to_string());
        let mqtt_publish_interval_ms =
            read_parsed_with_default::<u64>("BRIDGE_MQTT_PUBLISH_INTERVAL_MS", 500)?;
        let mqtt_qos = read_parsed_with_default::<u8>("BRIDGE_MQTT_QOS", 1)?;
        if mqtt_qos > 2 {
            return Err(ConfigError::Invalid(
                "BRIDGE_MQTT_QOS".to_string(),
                mqtt_qos.to_string(),
            ));
        }

        let http_enabled = read_bool_with_default("BRIDGE_HTTP", false);
        let http_addr = env::var("BRIDGE_HTTP_ADDR").unwrap_or_else(|_| "0.0.0.0:5000".to_string());
        let http_cors = read_bool_with_default("BRIDGE_HTTP_CORS", true);
        let terminal_enabled = read_bool_with_default("BRIDGE_TERMINAL", false);

        Ok(Self {
            opcua_endpoint,
            opcua_application_uri,
            opcua_security_policy,
            opcua_security_mode,
            opcua_client,
            subscription_interval_ms,
            cert_dir,
            points_file,
            points,
            mqtt_enabled,
            mqtt_host,
            mqtt_port,
            mqtt_client_id,
            mqtt_username,
            mqtt_password,
            mqtt_topic_prefix,
            mqtt_publish_interval_ms,
            mqtt_qos,
            http_enabled,
            http_addr,
            http_cors,
            terminal_enabled,
        })
    }
}

/// 读取点位文件（JSON 数组：`[{"id": ..., "name": ..., "unit": ...}]`）。
pub fn load_points(path: impl AsRef<Path>) -> Result<Vec<MonitoredPoint>, ConfigError> {
    let path = path.as_ref();
    let display = path.display().to_string();
    let content = std::fs::read_to_string(path)
        .map_err(|err| ConfigError::Points(display.clone(), err.to_string()))?;
    parse_points(&content).map_err(|err| match err {
        ConfigError::Points(_, message) => ConfigError::Points(display, message),
        other => other,
    })
}

/// 解析并校验点位列表，保持文件中的顺序。
pub fn parse_points(content: &str) -> Result<Vec<MonitoredPoint>, ConfigError> {
    let points: Vec<MonitoredPoint> = serde_json::from_str(content)
        .map_err(|err| ConfigError::Points("<inline>".to_string(), err.to_string()))?;
    let mut ids = HashSet::new();
    let mut names = HashSet::new();
    for point in &points {
        if point.id.trim().is_empty() {
            return Err(ConfigError::Invalid("point.id".to_string(), point.id.clone()));
        }
        if point.name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "point.name".to_string(),
                point.name.clone(),
            ));
        }
        if !ids.insert(point.id.as_str()) {
            return Err(ConfigError::Invalid(
                "point.id (duplicate)".to_string(),
                point.id.clone(),
            ));
        }
        if !names.insert(point.name.as_str()) {
            return Err(ConfigError::Invalid(
                "point.name (duplicate)".to_string(),
                point.name.clone(),
            ));
        }
    }
    Ok(points)
}

fn read_client_kind(key: &str) -> Result<ClientKind, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(ClientKind::OpcUa),
    };
    match value.to_ascii_lowercase().as_str() {
        "opcua" | "opc-ua" => Ok(ClientKind::OpcUa),
        "simulated" | "sim" => Ok(ClientKind::Simulated),
        _ => Err(ConfigError::Invalid(key.to_string(), value)),
    }
}

fn read_parsed_with_default<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<T>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsed_reader_uses_default_value_and_rejects_garbage() {
        // 键名仅在本测试中使用，不与其他用例的环境变量冲突
        unsafe {
            std::env::remove_var("BRIDGE_TEST_UNSET_PORT");
            std::env::set_var("BRIDGE_TEST_PORT", "8443");
            std::env::set_var("BRIDGE_TEST_BAD_PORT", "70000");
        }

        assert_eq!(read_parsed_with_default::<u16>("BRIDGE_TEST_UNSET_PORT", 1883).expect("default"), 1883);
        assert_eq!(read_parsed_with_default::<u16>("BRIDGE_TEST_PORT", 1883).expect("parsed"), 8443);
        let err = read_parsed_with_default::<u16>("BRIDGE_TEST_BAD_PORT", 1883).expect_err("out of range");
        assert!(matches!(err, ConfigError::Invalid(key, value) if key == "BRIDGE_TEST_BAD_PORT" && value == "70000"));
    }
}
