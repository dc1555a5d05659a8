//! Credential Sources
//!
//! The individual steps of the credential chain: environment variables,
//! the base64-encoded cloud config, the plain cloud config and the
//! instance RAM role.

use crate::domain::ports::{CredentialSource, Credentials, InstanceMetadataRef};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

// =============================================================================
// Cloud Config File Format
// =============================================================================

/// Cloud config document shared by the encoded and plain credential files
#[derive(Debug, Default, Deserialize)]
struct CloudConfig {
    #[serde(rename = "Global", alias = "global", default)]
    global: GlobalSection,
}

#[derive(Debug, Default, Deserialize)]
struct GlobalSection {
    #[serde(rename = "accessKeyID", alias = "AccessKeyID", alias = "accessKeyId", default)]
    access_key_id: String,
    #[serde(rename = "accessKeySecret", alias = "AccessKeySecret", default)]
    access_key_secret: String,
}

/// Read and parse a cloud config file; `None` when absent or unreadable
async fn read_cloud_config(path: &Path) -> Option<GlobalSection> {
    match tokio::fs::metadata(path).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("Credential file {} not present", path.display());
            return None;
        }
        Err(e) => {
            warn!("Cannot stat credential file {}: {}", path.display(), e);
            return None;
        }
    }

    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Read credential file {} failed: {}", path.display(), e);
            return None;
        }
    };

    match serde_json::from_slice::<CloudConfig>(&raw) {
        Ok(config) => Some(config.global),
        Err(e) => {
            warn!("Parse credential file {} failed: {}", path.display(), e);
            None
        }
    }
}

// =============================================================================
// Environment
// =============================================================================

/// Static credentials from a pair of environment variables
pub struct EnvCredentials {
    id_var: String,
    secret_var: String,
}

impl EnvCredentials {
    pub fn new(id_var: impl Into<String>, secret_var: impl Into<String>) -> Self {
        Self {
            id_var: id_var.into(),
            secret_var: secret_var.into(),
        }
    }
}

#[async_trait]
impl CredentialSource for EnvCredentials {
    fn name(&self) -> &str {
        "environment"
    }

    async fn load(&self) -> Option<Credentials> {
        let id = std::env::var(&self.id_var).unwrap_or_default();
        let secret = std::env::var(&self.secret_var).unwrap_or_default();
        if id.is_empty() || secret.is_empty() {
            return None;
        }
        Some(Credentials::new(id, secret))
    }
}

// =============================================================================
// Encoded File
// =============================================================================

/// Cloud config whose key fields are base64 encoded
pub struct EncodedFileCredentials {
    path: PathBuf,
}

impl EncodedFileCredentials {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn decode(&self, field: &str, value: &str) -> Option<String> {
        let bytes = match STANDARD.decode(value.trim()) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Decode {} from {} failed: {}", field, self.path.display(), e);
                return None;
            }
        };
        match String::from_utf8(bytes) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!("Decoded {} from {} is not UTF-8: {}", field, self.path.display(), e);
                None
            }
        }
    }
}

#[async_trait]
impl CredentialSource for EncodedFileCredentials {
    fn name(&self) -> &str {
        "encoded-file"
    }

    async fn load(&self) -> Option<Credentials> {
        let global = read_cloud_config(&self.path).await?;
        let id = self.decode("accessKeyID", &global.access_key_id)?;
        let secret = self.decode("accessKeySecret", &global.access_key_secret)?;
        Some(Credentials::new(id, secret))
    }
}

// =============================================================================
// Plain File
// =============================================================================

/// Cloud config holding the keys verbatim
pub struct PlainFileCredentials {
    path: PathBuf,
}

impl PlainFileCredentials {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CredentialSource for PlainFileCredentials {
    fn name(&self) -> &str {
        "plain-file"
    }

    async fn load(&self) -> Option<Credentials> {
        let global = read_cloud_config(&self.path).await?;
        Some(Credentials::new(
            global.access_key_id.trim(),
            global.access_key_secret.trim(),
        ))
    }
}

// =============================================================================
// Instance Role
// =============================================================================

/// Temporary credentials issued for the host's RAM role
pub struct RoleCredentials {
    metadata: InstanceMetadataRef,
}

impl RoleCredentials {
    pub fn new(metadata: InstanceMetadataRef) -> Self {
        Self { metadata }
    }
}

#[async_trait]
impl CredentialSource for RoleCredentials {
    fn name(&self) -> &str {
        "instance-role"
    }

    async fn load(&self) -> Option<Credentials> {
        let role = self.metadata.role_name().await;
        if role.is_empty() {
            warn!("No RAM role assigned to this instance");
            return None;
        }

        let credentials = self.metadata.role_credentials(&role).await;
        if !credentials.is_usable() {
            warn!("Metadata returned no usable credentials for role {}", role);
            return None;
        }
        debug!("Obtained temporary credentials for role {}", role);
        Some(credentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeMetadata;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn test_env_requires_both_vars() {
        std::env::set_var("SRC_TEST_ENV_ID_A", "id-a");
        std::env::remove_var("SRC_TEST_ENV_SECRET_A");
        let source = EnvCredentials::new("SRC_TEST_ENV_ID_A", "SRC_TEST_ENV_SECRET_A");
        assert!(source.load().await.is_none());

        std::env::set_var("SRC_TEST_ENV_SECRET_A", "secret-a");
        let creds = source.load().await.unwrap();
        assert_eq!(creds, Credentials::new("id-a", "secret-a"));
    }

    #[tokio::test]
    async fn test_encoded_file_decodes_fields() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "cloud-config.alicloud",
            r#"{"Global": {"KubernetesClusterTag": "c1", "accessKeyID": "TFRBSWlk", "accessKeySecret": "c2VjcmV0"}}"#,
        );

        let creds = EncodedFileCredentials::new(path).load().await.unwrap();
        assert_eq!(creds.access_key_id, "LTAIid");
        assert_eq!(creds.access_key_secret, "secret");
        assert!(creds.security_token.is_none());
    }

    #[tokio::test]
    async fn test_encoded_file_bad_base64_falls_through() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "cloud-config.alicloud",
            r#"{"Global": {"accessKeyID": "not base64!", "accessKeySecret": "c2VjcmV0"}}"#,
        );
        assert!(EncodedFileCredentials::new(path).load().await.is_none());
    }

    #[tokio::test]
    async fn test_plain_file_and_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "cloud-config",
            r#"{"Global": {"accessKeyID": "plain-id", "accessKeySecret": "plain-secret", "region": "cn-hangzhou"}}"#,
        );
        let creds = PlainFileCredentials::new(path).load().await.unwrap();
        assert_eq!(creds, Credentials::new("plain-id", "plain-secret"));

        let missing = PlainFileCredentials::new(dir.path().join("absent"));
        assert!(missing.load().await.is_none());
    }

    #[tokio::test]
    async fn test_malformed_file_falls_through() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "cloud-config", "{ not json");
        assert!(PlainFileCredentials::new(path).load().await.is_none());
    }

    #[tokio::test]
    async fn test_role_credentials() {
        let metadata = FakeMetadata::new("cn-hangzhou", "cn-hangzhou-b").with_role(
            "KubernetesMasterRole",
            "STS.id",
            "sts-secret",
            "sts-token",
        );
        let creds = RoleCredentials::new(Arc::new(metadata)).load().await.unwrap();
        assert_eq!(creds.access_key_id, "STS.id");
        assert_eq!(creds.security_token.as_deref(), Some("sts-token"));

        let no_role = FakeMetadata::new("cn-hangzhou", "cn-hangzhou-b");
        assert!(RoleCredentials::new(Arc::new(no_role)).load().await.is_none());
    }
}
