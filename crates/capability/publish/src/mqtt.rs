//! rumqttc 发布器。
//!
//! 事件循环在独立任务中轮询；收到 ConnAck 视为已连接，轮询出错视为断开并在 1 秒后重试。

use crate::{PublishError, Publisher};
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Outgoing, Packet, QoS};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// MQTT 发布器配置。
#[derive(Debug, Clone)]
pub struct MqttPublisherConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub qos: u8,
}

/// MQTT 发布器。
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
    qos: QoS,
    connected: Arc<AtomicBool>,
}

impl MqttPublisher {
    /// 创建客户端并启动事件循环任务；返回的句柄交给 [`MqttPublisher::shutdown`]。
    pub fn connect(config: MqttPublisherConfig) -> (Self, JoinHandle<()>) {
        let mut options = MqttOptions::new(config.client_id, config.host.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(30));
        if let (Some(username), Some(password)) = (config.username, config.password) {
            options.set_credentials(username, password);
        }
        let (client, mut eventloop) = AsyncClient::new(options, 10);
        let connected = Arc::new(AtomicBool::new(false));

        let state = connected.clone();
        let host = config.host;
        let port = config.port;
        let handle = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        state.store(true, Ordering::SeqCst);
                        info!(
                            target: "bridge.publish",
                            host = %host,
                            port,
                            code = ?ack.code,
                            "mqtt_connected"
                        );
                    }
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                        state.store(false, Ordering::SeqCst);
                        debug!(target: "bridge.publish", "mqtt_disconnect_sent");
                        break;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        if state.swap(false, Ordering::SeqCst) {
                            warn!(target: "bridge.publish", error = %err, "mqtt_connection_lost");
                        } else {
                            debug!(target: "bridge.publish", error = %err, "mqtt_connect_retry");
                        }
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        (
            Self {
                client,
                qos: qos_from_u8(config.qos),
                connected,
            },
            handle,
        )
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// 请求断开并在 `timeout` 内等待事件循环退出，超时则终止任务。
    pub async fn shutdown(&self, handle: JoinHandle<()>, timeout: Duration) {
        if let Err(err) = self.client.try_disconnect() {
            debug!(target: "bridge.publish", error = %err, "mqtt_disconnect_request_failed");
        }
        let abort = handle.abort_handle();
        match tokio::time::timeout(timeout, handle).await {
            Ok(_) => info!(target: "bridge.publish", "mqtt_eventloop_stopped"),
            Err(_) => {
                abort.abort();
                warn!(
                    target: "bridge.publish",
                    timeout_ms = timeout.as_millis() as u64,
                    "mqtt_eventloop_abort"
                );
            }
        }
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        self.client
            .publish(topic, self.qos, false, payload)
            .await
            .map_err(|err| PublishError::Publish(err.to_string()))
    }

    fn is_ready(&self) -> bool {
        self.is_connected()
    }
}

fn qos_from_u8(value: u8) -> QoS {
    match value {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}
