//! 协议相关类型定义

use chrono::{DateTime, Utc};
use domain::PointValueData;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tokio::sync::mpsc;

/// 安全策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityPolicy {
    None,
    Basic128Rsa15,
    Basic256,
    Basic256Sha256,
    Aes128Sha256RsaOaep,
    Aes256Sha256RsaPss,
}

impl SecurityPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Basic128Rsa15 => "Basic128Rsa15",
            Self::Basic256 => "Basic256",
            Self::Basic256Sha256 => "Basic256Sha256",
            Self::Aes128Sha256RsaOaep => "Aes128_Sha256_RsaOaep",
            Self::Aes256Sha256RsaPss => "Aes256_Sha256_RsaPss",
        }
    }

    /// 完整策略 URI
    pub fn uri(&self) -> String {
        format!("http://opcfoundation.org/UA/SecurityPolicy#{}", self.as_str())
    }
}

impl fmt::Display for SecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecurityPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        // 同时接受策略名与 URI 末段（http://opcfoundation.org/UA/SecurityPolicy#Basic256Sha256）
        let name = value.rsplit('#').next().unwrap_or(value).trim();
        match name.replace('_', "").to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "basic128rsa15" => Ok(Self::Basic128Rsa15),
            "basic256" => Ok(Self::Basic256),
            "basic256sha256" => Ok(Self::Basic256Sha256),
            "aes128sha256rsaoaep" => Ok(Self::Aes128Sha256RsaOaep),
            "aes256sha256rsapss" => Ok(Self::Aes256Sha256RsaPss),
            _ => Err(format!("unknown security policy: {}", value)),
        }
    }
}

/// 消息安全模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityMode {
    None,
    Sign,
    SignAndEncrypt,
}

impl SecurityMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Sign => "Sign",
            Self::SignAndEncrypt => "SignAndEncrypt",
        }
    }
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecurityMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "sign" => Ok(Self::Sign),
            "signandencrypt" | "sign_and_encrypt" | "sign-and-encrypt" => Ok(Self::SignAndEncrypt),
            _ => Err(format!("unknown security mode: {}", value)),
        }
    }
}

/// 客户端证书与私钥路径
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub certificate_path: PathBuf,
    pub private_key_path: PathBuf,
}

/// 会话建立参数
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// 服务端地址（opc.tcp://host:port/path）
    pub endpoint: String,
    /// 客户端 application URI（需与证书 SAN 一致）
    pub application_uri: String,
    pub security_policy: SecurityPolicy,
    pub security_mode: SecurityMode,
    /// 安全模式为 None 时可为空
    pub credentials: Option<ClientCredentials>,
}

/// 服务端随通知附带的元数据（仅记录日志，不参与缓存时间戳）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeMetadata {
    pub source_timestamp: Option<DateTime<Utc>>,
    pub status: Option<String>,
}

/// 数据变更通知
#[derive(Debug, Clone, PartialEq)]
pub struct DataChange {
    pub node_id: String,
    pub value: PointValueData,
    pub metadata: ChangeMetadata,
}

impl DataChange {
    pub fn new(node_id: impl Into<String>, value: impl Into<PointValueData>) -> Self {
        Self {
            node_id: node_id.into(),
            value: value.into(),
            metadata: ChangeMetadata::default(),
        }
    }
}

/// 通知投递通道（客户端回调上下文中同步发送）
pub type NotificationSender = mpsc::UnboundedSender<DataChange>;
/// 通知接收端
pub type NotificationReceiver = mpsc::UnboundedReceiver<DataChange>;

/// 订阅标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u32);

/// 监控项句柄（取消订阅时需要）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MonitoredHandle(pub u32);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for MonitoredHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
