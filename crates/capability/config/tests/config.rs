use bridge_config::{AppConfig, ClientKind, ConfigError, load_points, parse_points};
use bridge_protocol::{SecurityMode, SecurityPolicy};

const POINTS: &str = r#"[
    {"id": "ns=2;s=Temperature", "name": "Temperature", "unit": "C"},
    {"id": "ns=2;s=Humidity", "name": "Humidity", "unit": "%"},
    {"id": "ns=2;s=Status", "name": "Status"}
]"#;

#[test]
fn load_config_from_env() {
    let dir = tempfile::tempdir().expect("tempdir");
    let points_path = dir.path().join("points.json");
    std::fs::write(&points_path, POINTS).expect("write points");

    // Rust 2024 中 set_var 需要显式标注 unsafe（测试进程内可控）。
    unsafe {
        std::env::set_var("BRIDGE_OPCUA_ENDPOINT", "opc.tcp://127.0.0.1:4840");
        std::env::set_var("BRIDGE_OPCUA_APPLICATION_URI", "urn:bridge:client");
        std::env::set_var("BRIDGE_OPCUA_SECURITY_MODE", "Sign");
        std::env::set_var("BRIDGE_OPCUA_CLIENT", "simulated");
        std::env::set_var("BRIDGE_POINTS_FILE", &points_path);
        std::env::set_var("BRIDGE_HTTP", "true");
        std::env::set_var("BRIDGE_MQTT_PUBLISH_INTERVAL_MS", "250");
    }

    let config = AppConfig::from_env().expect("config");
    assert_eq!(config.opcua_endpoint, "opc.tcp://127.0.0.1:4840");
    assert_eq!(config.opcua_security_policy, SecurityPolicy::Basic256Sha256);
    assert_eq!(config.opcua_security_mode, SecurityMode::Sign);
    assert_eq!(config.opcua_client, ClientKind::Simulated);
    assert_eq!(config.subscription_interval_ms, 500);
    assert_eq!(config.points.len(), 3);
    assert!(config.mqtt_enabled);
    assert_eq!(config.mqtt_topic_prefix, "opcua/plc/");
    assert_eq!(config.mqtt_publish_interval_ms, 250);
    assert!(config.http_enabled);
    assert!(config.http_cors);
    assert!(!config.terminal_enabled);
}

#[test]
fn points_keep_file_order_and_optional_unit() {
    let points = parse_points(POINTS).expect("points");
    let names: Vec<&str> = points.iter().map(|point| point.name.as_str()).collect();
    assert_eq!(names, vec!["Temperature", "Humidity", "Status"]);
    assert_eq!(points[2].unit_or_empty(), "");
}

#[test]
fn duplicate_point_names_are_rejected() {
    let err = parse_points(
        r#"[{"id": "ns=2;i=1", "name": "A"}, {"id": "ns=2;i=2", "name": "A"}]"#,
    )
    .expect_err("duplicate");
    assert!(matches!(err, ConfigError::Invalid(_, value) if value == "A"));
}

#[test]
fn empty_point_id_is_rejected() {
    let err = parse_points(r#"[{"id": " ", "name": "A"}]"#).expect_err("empty id");
    assert!(matches!(err, ConfigError::Invalid(key, _) if key == "point.id"));
}

#[test]
fn missing_points_file_reports_path() {
    let err = load_points("/nonexistent/points.json").expect_err("missing file");
    assert!(matches!(err, ConfigError::Points(path, _) if path.contains("points.json")));
}
