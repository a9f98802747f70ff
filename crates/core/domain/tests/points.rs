use domain::{MonitoredPoint, PointValueData};

#[test]
fn monitored_point_unit_defaults_to_empty() {
    let point = MonitoredPoint::new("ns=2;s=Level", "Level", None);

    assert_eq!(point.id, "ns=2;s=Level");
    assert_eq!(point.name, "Level");
    assert_eq!(point.unit_or_empty(), "");
}

#[test]
fn monitored_point_parses_without_unit() {
    let point: MonitoredPoint =
        serde_json::from_str(r#"{"id": "ns=2;i=7", "name": "Pump"}"#).expect("point");
    assert!(point.unit.is_none());
}

#[test]
fn point_value_serializes_as_bare_scalar() {
    assert_eq!(
        serde_json::to_string(&PointValueData::F64(21.5)).expect("json"),
        "21.5"
    );
    assert_eq!(
        serde_json::to_string(&PointValueData::I64(60)).expect("json"),
        "60"
    );
    assert_eq!(
        serde_json::to_string(&PointValueData::Bool(true)).expect("json"),
        "true"
    );
    assert_eq!(
        serde_json::to_string(&PointValueData::from("RUN")).expect("json"),
        "\"RUN\""
    );
}

#[test]
fn point_value_display_is_plain() {
    assert_eq!(PointValueData::F64(22.5).to_string(), "22.5");
    assert_eq!(PointValueData::from("idle").to_string(), "idle");
}
