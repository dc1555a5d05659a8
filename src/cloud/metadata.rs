//! Instance Metadata Client
//!
//! Reads region, zone and RAM role credentials from the ECS instance
//! metadata service. Lookups never fail: errors are logged and reported
//! as empty values.

use crate::domain::ports::{Credentials, InstanceMetadata};
use crate::error::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the metadata client
#[derive(Debug, Clone)]
pub struct MetadataConfig {
    /// Base URL of the metadata tree
    pub base_url: String,
    /// Per-request timeout; `None` keeps the transport default
    pub timeout: Option<Duration>,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            base_url: "http://100.100.100.200/latest/meta-data/".to_string(),
            timeout: None,
        }
    }
}

const PATH_REGION_ID: &str = "region-id";
const PATH_ZONE_ID: &str = "zone-id";
const PATH_RAM_ROLE: &str = "ram/security-credentials/";

/// STS token document served for a RAM role
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RoleToken {
    #[serde(default)]
    code: String,
    #[serde(default)]
    access_key_id: String,
    #[serde(default)]
    access_key_secret: String,
    #[serde(default)]
    security_token: String,
    #[serde(default)]
    expiration: String,
}

// =============================================================================
// HTTP Metadata Client
// =============================================================================

/// Metadata client backed by HTTP
pub struct HttpMetadataClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpMetadataClient {
    /// Create a new metadata client
    pub fn new(config: MetadataConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        let mut base_url = config.base_url;
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self {
            base_url,
            client: builder.build()?,
        })
    }

    /// Fetch a metadata path as trimmed text
    async fn fetch(&self, path: &str) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);
        let body = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(body.trim().to_string())
    }

    async fn fetch_or_empty(&self, path: &str) -> String {
        match self.fetch(path).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Metadata lookup {} failed: {}", path, e);
                String::new()
            }
        }
    }
}

#[async_trait]
impl InstanceMetadata for HttpMetadataClient {
    async fn region(&self) -> String {
        self.fetch_or_empty(PATH_REGION_ID).await
    }

    async fn zone(&self) -> String {
        self.fetch_or_empty(PATH_ZONE_ID).await
    }

    async fn role_name(&self) -> String {
        let roles = self.fetch_or_empty(PATH_RAM_ROLE).await;
        roles.lines().next().unwrap_or_default().trim().to_string()
    }

    async fn role_credentials(&self, role_name: &str) -> Credentials {
        let path = format!("{}{}", PATH_RAM_ROLE, role_name);
        let body = self.fetch_or_empty(&path).await;
        if body.is_empty() {
            return Credentials::default();
        }

        let token: RoleToken = match serde_json::from_str(&body) {
            Ok(token) => token,
            Err(e) => {
                warn!("Parse STS token for role {} failed: {}", role_name, e);
                return Credentials::default();
            }
        };
        if !token.code.is_empty() && token.code != "Success" {
            warn!("STS token for role {} not issued: {}", role_name, token.code);
            return Credentials::default();
        }

        debug!("STS token for role {} expires at {}", role_name, token.expiration);
        Credentials {
            access_key_id: token.access_key_id,
            access_key_secret: token.access_key_secret,
            security_token: Some(token.security_token).filter(|t| !t.is_empty()),
        }
    }
}
