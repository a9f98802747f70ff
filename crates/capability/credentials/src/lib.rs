//! 客户端身份准备：确保证书与私钥存在于磁盘。
//!
//! 已存在则原样复用（身份跨重启保持稳定），否则生成一次。

mod identity;

use chrono::Utc;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

pub use identity::{GeneratedIdentity, IdentitySubject, RSA_KEY_BITS, generate_identity};

/// 证书文件名（DER）。
pub const CERTIFICATE_FILE: &str = "certificate.der";
/// 私钥文件名（PKCS#8 PEM）。
pub const PRIVATE_KEY_FILE: &str = "private_key.pem";
/// 证书有效期（天）。
pub const DEFAULT_VALIDITY_DAYS: u32 = 365;

/// 身份准备错误；出现后不应再尝试连接。
#[derive(Debug, thiserror::Error)]
pub enum ProvisioningError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("crypto error: {0}")]
    Crypto(String),
    #[error("invalid identity: {0}")]
    Identity(String),
}

/// 证书与私钥路径。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialPaths {
    pub certificate_path: PathBuf,
    pub private_key_path: PathBuf,
}

/// 证书目录管理。
#[derive(Debug, Clone)]
pub struct CredentialProvisioner {
    cert_dir: PathBuf,
    subject: IdentitySubject,
    validity_days: u32,
}

impl CredentialProvisioner {
    pub fn new(cert_dir: impl Into<PathBuf>) -> Self {
        Self {
            cert_dir: cert_dir.into(),
            subject: IdentitySubject::default(),
            validity_days: DEFAULT_VALIDITY_DAYS,
        }
    }

    pub fn with_subject(mut self, subject: IdentitySubject) -> Self {
        self.subject = subject;
        self
    }

    pub fn cert_dir(&self) -> &Path {
        &self.cert_dir
    }

    /// 两个文件都存在时直接返回路径；否则创建目录并生成新身份。
    pub fn ensure_credentials(&self, identity_uri: &str) -> Result<CredentialPaths, ProvisioningError> {
        let cert_dir = std::path::absolute(&self.cert_dir).map_err(|source| ProvisioningError::Io {
            path: self.cert_dir.clone(),
            source,
        })?;
        let paths = CredentialPaths {
            certificate_path: cert_dir.join(CERTIFICATE_FILE),
            private_key_path: cert_dir.join(PRIVATE_KEY_FILE),
        };

        if paths.certificate_path.is_file() && paths.private_key_path.is_file() {
            info!(
                target: "bridge.credentials",
                cert_dir = %cert_dir.display(),
                "credentials_reused"
            );
            return Ok(paths);
        }

        info!(
            target: "bridge.credentials",
            cert_dir = %cert_dir.display(),
            identity_uri = %identity_uri,
            "credentials_generating"
        );
        fs::create_dir_all(&cert_dir).map_err(|source| ProvisioningError::Io {
            path: cert_dir.clone(),
            source,
        })?;

        let identity = generate_identity(
            &self.subject,
            identity_uri,
            Utc::now().date_naive(),
            self.validity_days,
        )?;
        write_private_key(&paths.private_key_path, identity.private_key_pem.as_bytes())?;
        fs::write(&paths.certificate_path, &identity.certificate_der).map_err(|source| {
            ProvisioningError::Io {
                path: paths.certificate_path.clone(),
                source,
            }
        })?;

        info!(
            target: "bridge.credentials",
            certificate = %paths.certificate_path.display(),
            private_key = %paths.private_key_path.display(),
            "credentials_generated"
        );
        Ok(paths)
    }
}

/// 便捷入口：在 `cert_dir` 下确保身份存在。
pub fn ensure_credentials(
    cert_dir: impl Into<PathBuf>,
    identity_uri: &str,
) -> Result<CredentialPaths, ProvisioningError> {
    CredentialProvisioner::new(cert_dir).ensure_credentials(identity_uri)
}

fn write_private_key(path: &Path, pem: &[u8]) -> Result<(), ProvisioningError> {
    let to_error = |source| ProvisioningError::Io {
        path: path.to_path_buf(),
        source,
    };
    fs::write(path, pem).map_err(to_error)?;
    // 私钥仅属主可读写。
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(to_error)?;
    }
    Ok(())
}
