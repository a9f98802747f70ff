//! 启动编排与有序退出。
//!
//! 启动：身份准备 → 注册 sink → 连接 → 订阅 → MQTT 发布 → HTTP → 终端。
//! 退出：终端 → 引擎断开 → 定时发布停止 → MQTT 断开 → HTTP 关闭。
//! 启动中途失败时，按退出顺序拆除已启动的部分。

use crate::AppState;
use crate::routes::create_router;
use crate::terminal::TerminalMonitor;
use bridge_config::{AppConfig, ClientKind};
use bridge_credentials::{CredentialProvisioner, ProvisioningError};
use bridge_ingest::{ConnectError, SubscribeError, SubscriptionEngine};
use bridge_protocol::{
    ClientCredentials, DataSourceClient, SessionConfig, SimulatedClient, SimulatedConfig,
};
use bridge_publish::{
    DEFAULT_STOP_TIMEOUT, MqttPublisher, MqttPublisherConfig, MqttSink, PublishScheduler,
};
use domain::MonitoredPoint;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// 模拟源的值变化周期。
const SIMULATED_CHANGE_INTERVAL_MS: u64 = 1000;

/// 启动失败。
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("credential provisioning failed: {0}")]
    Provisioning(#[from] ProvisioningError),
    #[error("data source client unavailable: {0}")]
    Client(String),
    #[error("connect failed: {0}")]
    Connect(#[from] ConnectError),
    #[error("subscribe failed: {0}")]
    Subscribe(#[from] SubscribeError),
    #[error("http bind {0} failed: {1}")]
    Http(String, #[source] std::io::Error),
}

struct MqttOutput {
    publisher: MqttPublisher,
    eventloop: JoinHandle<()>,
    scheduler: PublishScheduler,
}

struct HttpServer {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// 运行中的桥接进程。
pub struct Bridge {
    engine: SubscriptionEngine,
    mqtt_sink: Option<MqttSink>,
    mqtt: Option<MqttOutput>,
    http: Option<HttpServer>,
    terminal: Option<TerminalMonitor>,
}

impl Bridge {
    pub async fn start(config: &AppConfig) -> Result<Self, StartupError> {
        let credentials = CredentialProvisioner::new(&config.cert_dir)
            .ensure_credentials(&config.opcua_application_uri)?;
        let client = build_client(config.opcua_client, &config.points)?;
        let engine =
            SubscriptionEngine::new(client).with_interval_ms(config.subscription_interval_ms);

        // sink 先于订阅注册，初始读值也会送达
        let mqtt_sink = config.mqtt_enabled.then(|| {
            let sink = MqttSink::new(config.mqtt_topic_prefix.clone());
            engine.dispatcher().register(Arc::new(sink.clone()));
            sink
        });
        let terminal = config.terminal_enabled.then(|| {
            let monitor = TerminalMonitor::new();
            engine.dispatcher().register(Arc::new(monitor.clone()));
            monitor
        });

        let mut bridge = Self {
            engine,
            mqtt_sink,
            mqtt: None,
            http: None,
            terminal,
        };
        let session = SessionConfig {
            endpoint: config.opcua_endpoint.clone(),
            application_uri: config.opcua_application_uri.clone(),
            security_policy: config.opcua_security_policy,
            security_mode: config.opcua_security_mode,
            credentials: Some(ClientCredentials {
                certificate_path: credentials.certificate_path,
                private_key_path: credentials.private_key_path,
            }),
        };
        if let Err(err) = bridge.bring_up(config, &session).await {
            bridge.shutdown().await;
            return Err(err);
        }
        Ok(bridge)
    }

    async fn bring_up(
        &mut self,
        config: &AppConfig,
        session: &SessionConfig,
    ) -> Result<(), StartupError> {
        self.engine.connect(session).await?;
        let summary = self.engine.subscribe(config.points.clone()).await?;
        if !summary.failed.is_empty() {
            warn!(
                target: "bridge.app",
                failed = ?summary.failed,
                "points_not_subscribed"
            );
        }
        info!(
            target: "bridge.app",
            subscribed = summary.subscribed.len(),
            failed = summary.failed.len(),
            "points_subscribed"
        );

        if let Some(sink) = &self.mqtt_sink {
            let (publisher, eventloop) = MqttPublisher::connect(MqttPublisherConfig {
                host: config.mqtt_host.clone(),
                port: config.mqtt_port,
                client_id: config.mqtt_client_id.clone(),
                username: config.mqtt_username.clone(),
                password: config.mqtt_password.clone(),
                qos: config.mqtt_qos,
            });
            let scheduler = PublishScheduler::new(
                sink.clone(),
                Arc::new(publisher.clone()),
                Duration::from_millis(config.mqtt_publish_interval_ms),
            );
            scheduler.start();
            info!(
                target: "bridge.app",
                host = %config.mqtt_host,
                port = config.mqtt_port,
                topic_prefix = %config.mqtt_topic_prefix,
                "mqtt_output_started"
            );
            self.mqtt = Some(MqttOutput {
                publisher,
                eventloop,
                scheduler,
            });
        }

        if config.http_enabled {
            self.http = Some(start_http(config, self.engine.cache().clone()).await?);
        }

        if let Some(terminal) = &self.terminal {
            terminal.start();
        }
        Ok(())
    }

    /// 固定顺序拆除；各步骤错误只记录日志。
    pub async fn shutdown(mut self) {
        if let Some(terminal) = self.terminal.take() {
            terminal.stop().await;
        }
        self.engine.disconnect().await;
        if let Some(mqtt) = self.mqtt.take() {
            mqtt.scheduler.stop().await;
            mqtt.publisher
                .shutdown(mqtt.eventloop, DEFAULT_STOP_TIMEOUT)
                .await;
        }
        if let Some(http) = self.http.take() {
            let _ = http.shutdown.send(());
            let abort = http.task.abort_handle();
            if tokio::time::timeout(DEFAULT_STOP_TIMEOUT, http.task)
                .await
                .is_err()
            {
                abort.abort();
                warn!(target: "bridge.app", "http_shutdown_abort");
            }
        }
        info!(target: "bridge.app", "bridge_stopped");
    }
}

fn build_client(
    kind: ClientKind,
    points: &[MonitoredPoint],
) -> Result<Arc<dyn DataSourceClient>, StartupError> {
    match kind {
        ClientKind::Simulated => {
            let client = points.iter().fold(
                SimulatedClient::new(SimulatedConfig {
                    change_interval_ms: Some(SIMULATED_CHANGE_INTERVAL_MS),
                }),
                |client, point| client.with_value(point.id.clone(), 0.0),
            );
            Ok(Arc::new(client))
        }
        ClientKind::OpcUa => opcua_client(),
    }
}

#[cfg(feature = "opcua-client")]
fn opcua_client() -> Result<Arc<dyn DataSourceClient>, StartupError> {
    Ok(Arc::new(bridge_protocol::OpcUaClient::new()))
}

#[cfg(not(feature = "opcua-client"))]
fn opcua_client() -> Result<Arc<dyn DataSourceClient>, StartupError> {
    Err(StartupError::Client(
        "built without the `opcua-client` feature; rebuild with it or set BRIDGE_OPCUA_CLIENT=simulated"
            .to_string(),
    ))
}

async fn start_http(
    config: &AppConfig,
    cache: bridge_ingest::ValueCache,
) -> Result<HttpServer, StartupError> {
    let listener = tokio::net::TcpListener::bind(&config.http_addr)
        .await
        .map_err(|err| StartupError::Http(config.http_addr.clone(), err))?;
    let app = create_router(AppState { cache }, config.http_cors);
    let (shutdown, shutdown_rx) = oneshot::channel::<()>();
    let addr = config.http_addr.clone();
    let task = tokio::spawn(async move {
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await;
        if let Err(err) = served {
            warn!(target: "bridge.http", error = %err, "http_server_error");
        }
    });
    info!(target: "bridge.http", addr = %addr, cors = config.http_cors, "http_listening");
    Ok(HttpServer { shutdown, task })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_protocol::{SecurityMode, SecurityPolicy};

    fn test_config(cert_dir: &std::path::Path) -> AppConfig {
        AppConfig {
            opcua_endpoint: "opc.tcp://localhost:4840".to_string(),
            opcua_application_uri: "urn:example:opcua-bridge".to_string(),
            opcua_security_policy: SecurityPolicy::None,
            opcua_security_mode: SecurityMode::None,
            opcua_client: ClientKind::Simulated,
            subscription_interval_ms: 500,
            cert_dir: cert_dir.display().to_string(),
            points_file: "points.json".to_string(),
            points: vec![
                MonitoredPoint::new("ns=2;s=Temperature", "Temperature", Some("C".to_string())),
                MonitoredPoint::new("ns=2;s=Pressure", "Pressure", Some("bar".to_string())),
            ],
            mqtt_enabled: false,
            mqtt_host: "127.0.0.1".to_string(),
            mqtt_port: 1883,
            mqtt_client_id: "opc_gateway".to_string(),
            mqtt_username: None,
            mqtt_password: None,
            mqtt_topic_prefix: "opcua/plc/".to_string(),
            mqtt_publish_interval_ms: 500,
            mqtt_qos: 1,
            http_enabled: false,
            http_addr: "127.0.0.1:0".to_string(),
            http_cors: true,
            terminal_enabled: false,
        }
    }

    #[tokio::test]
    async fn simulated_bridge_starts_seeds_and_stops() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = test_config(dir.path());
        config.http_enabled = true;

        let bridge = Bridge::start(&config).await.expect("start");
        assert_eq!(bridge.engine.cache().len(), 2);
        assert!(dir.path().join(bridge_credentials::CERTIFICATE_FILE).is_file());

        bridge.shutdown().await;
    }

    #[cfg(not(feature = "opcua-client"))]
    #[tokio::test]
    async fn opcua_client_without_feature_is_a_startup_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = test_config(dir.path());
        config.opcua_client = ClientKind::OpcUa;

        let err = Bridge::start(&config).await.err().expect("must fail");
        assert!(matches!(err, StartupError::Client(_)));
    }

    #[tokio::test]
    async fn http_bind_failure_tears_down_engine() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = test_config(dir.path());
        config.http_enabled = true;
        config.http_addr = "not-an-address".to_string();

        let err = Bridge::start(&config).await.err().expect("must fail");
        assert!(matches!(err, StartupError::Http(..)));
    }
}
