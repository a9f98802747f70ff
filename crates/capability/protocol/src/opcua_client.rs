//! 基于 `opcua` crate 的 OPC UA 客户端
//!
//! `opcua` 的会话 API 为阻塞调用（内部自带运行时），统一放在 `spawn_blocking` 中执行。
//! 服务端证书不做链校验（`trust_server_certs`）。

use crate::client::DataSourceClient;
use crate::error::ClientError;
use crate::types::{
    ChangeMetadata, DataChange, MonitoredHandle, NotificationSender, SecurityMode,
    SessionConfig, SubscriptionId,
};
use async_trait::async_trait;
use domain::PointValueData;
use opcua::client::prelude::*;
use opcua::sync::RwLock;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

const APPLICATION_NAME: &str = "ua-bridge";

struct Connected {
    session: Arc<RwLock<Session>>,
    runner: oneshot::Sender<SessionCommand>,
}

/// 服务端返回的 NodeId 文本可能与配置写法不同（如省略 ns=0），按请求时的写法回报
type NodeAliases = Arc<Mutex<HashMap<NodeId, String>>>;

/// OPC UA 客户端
#[derive(Default)]
pub struct OpcUaClient {
    connected: Mutex<Option<Connected>>,
    aliases: NodeAliases,
}

impl OpcUaClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, Option<Connected>> {
        self.connected.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn session(&self) -> Result<Arc<RwLock<Session>>, ClientError> {
        self.state()
            .as_ref()
            .map(|connected| connected.session.clone())
            .ok_or(ClientError::NotConnected)
    }
}

async fn blocking<T, F>(f: F) -> Result<T, ClientError>
where
    F: FnOnce() -> Result<T, ClientError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ClientError::Internal(format!("blocking task: {}", e)))?
}

fn message_mode(mode: SecurityMode) -> MessageSecurityMode {
    match mode {
        SecurityMode::None => MessageSecurityMode::None,
        SecurityMode::Sign => MessageSecurityMode::Sign,
        SecurityMode::SignAndEncrypt => MessageSecurityMode::SignAndEncrypt,
    }
}

fn open_session(config: &SessionConfig) -> Result<Connected, ClientError> {
    let mut builder = ClientBuilder::new()
        .application_name(APPLICATION_NAME)
        .application_uri(config.application_uri.as_str())
        .product_uri(config.application_uri.as_str())
        .trust_server_certs(true)
        .create_sample_keypair(false)
        .session_retry_limit(0);
    if let Some(credentials) = &config.credentials {
        if let Some(dir) = credentials.certificate_path.parent() {
            builder = builder.pki_dir(dir);
        }
        builder = builder
            .certificate_path(&credentials.certificate_path)
            .private_key_path(&credentials.private_key_path);
    }
    let mut client = builder
        .client()
        .ok_or_else(|| ClientError::Connection("invalid client configuration".to_string()))?;

    let policy_uri = config.security_policy.uri();
    let endpoint: EndpointDescription = (
        config.endpoint.as_str(),
        policy_uri.as_str(),
        message_mode(config.security_mode),
        UserTokenPolicy::anonymous(),
    )
        .into();
    let session = client
        .connect_to_endpoint(endpoint, IdentityToken::Anonymous)
        .map_err(|status| ClientError::Connection(format!("{}: {:?}", config.endpoint, status)))?;
    let runner = Session::run_async(session.clone());
    Ok(Connected { session, runner })
}

fn parse_node(node_id: &str) -> Result<NodeId, ClientError> {
    NodeId::from_str(node_id).map_err(|_| ClientError::MonitoredItem {
        node_id: node_id.to_string(),
        reason: "invalid node id".to_string(),
    })
}

/// 服务端标量转为点位值；数组等复合类型按调试文本给出
fn variant_to_value(variant: &Variant) -> PointValueData {
    match variant {
        Variant::Boolean(v) => PointValueData::Bool(*v),
        Variant::SByte(v) => PointValueData::I64(i64::from(*v)),
        Variant::Byte(v) => PointValueData::I64(i64::from(*v)),
        Variant::Int16(v) => PointValueData::I64(i64::from(*v)),
        Variant::UInt16(v) => PointValueData::I64(i64::from(*v)),
        Variant::Int32(v) => PointValueData::I64(i64::from(*v)),
        Variant::UInt32(v) => PointValueData::I64(i64::from(*v)),
        Variant::Int64(v) => PointValueData::I64(*v),
        Variant::UInt64(v) => i64::try_from(*v)
            .map(PointValueData::I64)
            .unwrap_or(PointValueData::F64(*v as f64)),
        Variant::Float(v) => PointValueData::F64(f64::from(*v)),
        Variant::Double(v) => PointValueData::F64(*v),
        Variant::String(v) => PointValueData::String(v.as_ref().to_string()),
        Variant::DateTime(v) => PointValueData::String(v.as_chrono().to_rfc3339()),
        other => PointValueData::String(format!("{:?}", other)),
    }
}

#[async_trait]
impl DataSourceClient for OpcUaClient {
    async fn connect(&self, config: &SessionConfig) -> Result<(), ClientError> {
        info!(
            target: "bridge.protocol.opcua",
            endpoint = %config.endpoint,
            security_policy = %config.security_policy,
            security_mode = %config.security_mode,
            "session_connecting"
        );
        let config = config.clone();
        let connected = blocking(move || open_session(&config)).await?;
        if let Some(previous) = self.state().replace(connected) {
            let _ = previous.runner.send(SessionCommand::Stop);
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ClientError> {
        let Some(connected) = self.state().take() else {
            return Ok(());
        };
        self.aliases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        blocking(move || {
            connected.session.read().disconnect();
            let _ = connected.runner.send(SessionCommand::Stop);
            Ok(())
        })
        .await
    }

    async fn create_subscription(
        &self,
        interval_ms: u64,
        notifications: NotificationSender,
    ) -> Result<SubscriptionId, ClientError> {
        let session = self.session()?;
        let aliases = self.aliases.clone();
        blocking(move || {
            let callback = DataChangeCallback::new(move |changed_items| {
                for item in changed_items {
                    let node = &item.item_to_monitor().node_id;
                    let data_value = item.last_value();
                    let Some(variant) = data_value.value.as_ref() else {
                        continue;
                    };
                    let node_id = aliases
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .get(node)
                        .cloned()
                        .unwrap_or_else(|| node.to_string());
                    let change = DataChange {
                        node_id,
                        value: variant_to_value(variant),
                        metadata: ChangeMetadata {
                            source_timestamp: data_value.source_timestamp.as_ref().map(|ts| ts.as_chrono()),
                            status: data_value.status.map(|status| format!("{:?}", status)),
                        },
                    };
                    if notifications.send(change).is_err() {
                        debug!(target: "bridge.protocol.opcua", "notification_receiver_closed");
                    }
                }
            });
            session
                .read()
                .create_subscription(interval_ms as f64, 10, 30, 0, 0, true, callback)
                .map(SubscriptionId)
                .map_err(|status| ClientError::Subscription(format!("{:?}", status)))
        })
        .await
    }

    async fn subscribe_data_change(
        &self,
        subscription: SubscriptionId,
        node_id: &str,
    ) -> Result<MonitoredHandle, ClientError> {
        let session = self.session()?;
        let node = parse_node(node_id)?;
        let requested = node_id.to_string();
        let aliases = self.aliases.clone();
        blocking(move || {
            let item_error = |reason: String| ClientError::MonitoredItem {
                node_id: requested.clone(),
                reason,
            };
            let results = session
                .read()
                .create_monitored_items(subscription.0, TimestampsToReturn::Both, &[node.clone().into()])
                .map_err(|status| item_error(format!("{:?}", status)))?;
            let result = results
                .first()
                .ok_or_else(|| item_error("empty result".to_string()))?;
            if !result.status_code.is_good() {
                return Err(item_error(format!("{:?}", result.status_code)));
            }
            let handle = MonitoredHandle(result.monitored_item_id);
            aliases
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(node, requested.clone());
            Ok(handle)
        })
        .await
    }

    async fn unsubscribe(
        &self,
        subscription: SubscriptionId,
        handle: MonitoredHandle,
    ) -> Result<(), ClientError> {
        let session = self.session()?;
        blocking(move || {
            let results = session
                .read()
                .delete_monitored_items(subscription.0, &[handle.0])
                .map_err(|status| ClientError::Subscription(format!("{:?}", status)))?;
            match results.first() {
                Some(status) if !status.is_good() => {
                    warn!(
                        target: "bridge.protocol.opcua",
                        monitored_item = handle.0,
                        status = ?status,
                        "monitored_item_delete_rejected"
                    );
                    Err(ClientError::Subscription(format!("{:?}", status)))
                }
                _ => Ok(()),
            }
        })
        .await
    }

    async fn delete_subscription(&self, subscription: SubscriptionId) -> Result<(), ClientError> {
        let session = self.session()?;
        blocking(move || {
            let status = session
                .read()
                .delete_subscription(subscription.0)
                .map_err(|status| ClientError::Subscription(format!("{:?}", status)))?;
            if status.is_good() {
                Ok(())
            } else {
                Err(ClientError::Subscription(format!("{:?}", status)))
            }
        })
        .await
    }

    async fn read_value(&self, node_id: &str) -> Result<PointValueData, ClientError> {
        let session = self.session()?;
        let requested = node_id.to_string();
        let node = NodeId::from_str(node_id).map_err(|_| ClientError::Read {
            node_id: requested.clone(),
            reason: "invalid node id".to_string(),
        })?;
        blocking(move || {
            let read_error = |reason: String| ClientError::Read {
                node_id: requested.clone(),
                reason,
            };
            let request = ReadValueId {
                node_id: node,
                attribute_id: AttributeId::Value as u32,
                index_range: UAString::null(),
                data_encoding: QualifiedName::null(),
            };
            let values = session
                .read()
                .read(&[request], TimestampsToReturn::Neither, 0.0)
                .map_err(|status| read_error(format!("{:?}", status)))?;
            let data_value = values
                .first()
                .ok_or_else(|| read_error("empty result".to_string()))?;
            if let Some(status) = data_value.status {
                if !status.is_good() {
                    return Err(read_error(format!("{:?}", status)));
                }
            }
            data_value
                .value
                .as_ref()
                .map(variant_to_value)
                .ok_or_else(|| read_error("no value".to_string()))
        })
        .await
    }
}
