//! Credential Resolution
//!
//! Resolves ECS API credentials from an ordered chain of sources:
//! - Environment variables (static keys)
//! - Base64-encoded cloud config file
//! - Plain cloud config file
//! - Instance RAM role (temporary keys with a session token)
//!
//! Credentials are resolved fresh for every operation; nothing is cached.

pub mod sources;

pub use sources::*;

use crate::domain::ports::{CredentialSourceRef, Credentials, InstanceMetadataRef};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

// =============================================================================
// Configuration
// =============================================================================

/// Locations the credential chain reads from
#[derive(Debug, Clone)]
pub struct CredentialConfig {
    /// Environment variable holding the access key id
    pub access_key_id_env: String,
    /// Environment variable holding the access key secret
    pub access_key_secret_env: String,
    /// Cloud config with base64-encoded keys
    pub encoded_path: PathBuf,
    /// Cloud config with plain keys
    pub plain_path: PathBuf,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            access_key_id_env: "ACCESS_KEY_ID".to_string(),
            access_key_secret_env: "ACCESS_KEY_SECRET".to_string(),
            encoded_path: PathBuf::from("/etc/kubernetes/cloud-config.alicloud"),
            plain_path: PathBuf::from("/etc/kubernetes/cloud-config"),
        }
    }
}

// =============================================================================
// Credential Chain
// =============================================================================

/// Ordered list of credential sources; the first usable result wins
pub struct CredentialChain {
    sources: Vec<CredentialSourceRef>,
}

impl CredentialChain {
    /// Build a chain from explicit sources
    pub fn new(sources: Vec<CredentialSourceRef>) -> Self {
        Self { sources }
    }

    /// Standard chain: environment, encoded file, plain file, instance role
    pub fn from_config(config: &CredentialConfig, metadata: InstanceMetadataRef) -> Self {
        let sources: Vec<CredentialSourceRef> = vec![
            Arc::new(EnvCredentials::new(
                config.access_key_id_env.clone(),
                config.access_key_secret_env.clone(),
            )),
            Arc::new(EncodedFileCredentials::new(config.encoded_path.clone())),
            Arc::new(PlainFileCredentials::new(config.plain_path.clone())),
            Arc::new(RoleCredentials::new(metadata)),
        ];
        Self::new(sources)
    }

    /// Resolve credentials; empty when every source is exhausted
    pub async fn resolve(&self) -> Credentials {
        for source in &self.sources {
            match source.load().await {
                Some(credentials) if credentials.is_usable() => {
                    info!(
                        "Using credentials from {} (key id {})",
                        source.name(),
                        credentials.access_key_id
                    );
                    return credentials;
                }
                Some(_) => debug!("Credential source {} returned incomplete keys", source.name()),
                None => debug!("Credential source {} yielded nothing", source.name()),
            }
        }

        warn!("No credential source produced usable credentials");
        Credentials::default()
    }
}
