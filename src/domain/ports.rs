//! Domain Ports - Core types and trait definitions for the disk provisioner
//!
//! These traits define the boundaries between the provisioning logic and
//! external systems (instance metadata, credential sources, the disk API).
//! Adapters implement these traits to provide concrete functionality.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Bytes per GiB
pub const GIB: u64 = 1024 * 1024 * 1024;

// =============================================================================
// Disk Category
// =============================================================================

/// ECS disk category
///
/// `Available` is not a real category: it asks the provisioner to pick the
/// best category the zone offers, walking the fallback ladder
/// `Efficiency -> Ssd -> Basic`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum DiskCategory {
    #[default]
    Available,
    Efficiency,
    Ssd,
    Basic,
    /// Provider category without fallback semantics (e.g. `cloud_essd`)
    Other(String),
}

impl DiskCategory {
    /// Parse a category name; unknown names pass through as `Other`
    pub fn from_name(name: &str) -> Self {
        match name.trim() {
            "" | "available" => DiskCategory::Available,
            "cloud_efficiency" => DiskCategory::Efficiency,
            "cloud_ssd" => DiskCategory::Ssd,
            "cloud" => DiskCategory::Basic,
            other => DiskCategory::Other(other.to_string()),
        }
    }

    /// Wire name used by the ECS API
    pub fn as_str(&self) -> &str {
        match self {
            DiskCategory::Available => "available",
            DiskCategory::Efficiency => "cloud_efficiency",
            DiskCategory::Ssd => "cloud_ssd",
            DiskCategory::Basic => "cloud",
            DiskCategory::Other(name) => name,
        }
    }

    /// Next category to try when this one is not supported in the zone
    pub fn fallback(&self) -> Option<DiskCategory> {
        match self {
            DiskCategory::Efficiency => Some(DiskCategory::Ssd),
            DiskCategory::Ssd => Some(DiskCategory::Basic),
            _ => None,
        }
    }
}

impl std::fmt::Display for DiskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Provisioning Request / Placement
// =============================================================================

/// Request to provision a disk for a volume claim
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvisionRequest {
    /// Requested capacity in bytes
    pub capacity_bytes: u64,
    /// Storage class parameters
    pub parameters: BTreeMap<String, String>,
    /// Claim label selector (`matchLabels`)
    pub selector: Option<BTreeMap<String, String>>,
    /// Requested access modes
    pub access_modes: Vec<String>,
    /// Reclaim policy for the resulting volume
    pub reclaim_policy: String,
}

impl ProvisionRequest {
    /// Capacity in whole GiB, rounded up
    pub fn size_gib(&self) -> u64 {
        self.capacity_bytes.div_ceil(GIB)
    }
}

/// Where and how a disk should be created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementDecision {
    pub region_id: String,
    pub zone_id: String,
    pub category: DiskCategory,
    pub fs_type: String,
    pub read_only: bool,
    pub encrypted: bool,
}

impl PlacementDecision {
    /// Region and zone are both known
    pub fn is_complete(&self) -> bool {
        !self.region_id.is_empty() && !self.zone_id.is_empty()
    }
}

// =============================================================================
// Volume Descriptor
// =============================================================================

/// A provisioned disk as seen by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeDescriptor {
    /// ECS disk id
    pub id: String,
    /// Size in GiB
    pub size_gib: u64,
    pub region_id: String,
    pub zone_id: String,
    /// Category the disk was created with, if recorded
    pub category: Option<DiskCategory>,
    /// Identity of the provisioner that created the disk
    pub owner_tag: Option<String>,
}

/// Result of a delete request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The disk was deleted
    Deleted,
    /// The volume belongs to another provisioner; do not retry or alarm
    Ignored { reason: String },
}

// =============================================================================
// Credentials
// =============================================================================

/// API credentials
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub access_key_secret: String,
    /// Session token for temporary (role) credentials
    pub security_token: Option<String>,
}

impl Credentials {
    /// Static credentials without a session token
    pub fn new(access_key_id: impl Into<String>, access_key_secret: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            access_key_secret: access_key_secret.into(),
            security_token: None,
        }
    }

    /// No usable key id
    pub fn is_empty(&self) -> bool {
        self.access_key_id.is_empty()
    }

    /// Both id and secret are present
    pub fn is_usable(&self) -> bool {
        !self.access_key_id.is_empty() && !self.access_key_secret.is_empty()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &"***")
            .field("security_token", &self.security_token.as_ref().map(|_| "***"))
            .finish()
    }
}

// =============================================================================
// Disk API Arguments
// =============================================================================

/// Arguments for a create-disk call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateDiskArgs {
    pub size_gib: u64,
    pub region_id: String,
    pub zone_id: String,
    pub category: DiskCategory,
    pub encrypted: bool,
}

/// Arguments for a delete-disk call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteDiskArgs {
    pub disk_id: String,
}

// =============================================================================
// Instance Metadata Port
// =============================================================================

/// Port for the host's instance metadata service
///
/// Every lookup degrades to an empty value on failure.
#[async_trait]
pub trait InstanceMetadata: Send + Sync {
    /// Region the host runs in
    async fn region(&self) -> String;

    /// Zone the host runs in
    async fn zone(&self) -> String;

    /// RAM role assigned to the host
    async fn role_name(&self) -> String;

    /// Temporary credentials issued for a role
    async fn role_credentials(&self, role_name: &str) -> Credentials;
}

// =============================================================================
// Credential Source Port
// =============================================================================

/// One step of the credential precedence chain
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Attempt to produce credentials; `None` falls through to the next source
    async fn load(&self) -> Option<Credentials>;
}

// =============================================================================
// Disk Service Port
// =============================================================================

/// Port for the cloud block-storage API
#[async_trait]
pub trait DiskService: Send + Sync {
    /// Create a disk and return its id
    async fn create_disk(&self, credentials: &Credentials, args: &CreateDiskArgs) -> Result<String>;

    /// Delete a disk
    async fn delete_disk(&self, credentials: &Credentials, args: &DeleteDiskArgs) -> Result<()>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type InstanceMetadataRef = Arc<dyn InstanceMetadata>;
pub type CredentialSourceRef = Arc<dyn CredentialSource>;
pub type DiskServiceRef = Arc<dyn DiskService>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_gib_rounds_up() {
        let request = |bytes| ProvisionRequest {
            capacity_bytes: bytes,
            ..Default::default()
        };
        assert_eq!(request(1).size_gib(), 1);
        assert_eq!(request(GIB).size_gib(), 1);
        assert_eq!(request(3 * GIB).size_gib(), 3);
        assert_eq!(request(3 * GIB + 1).size_gib(), 4);
        assert_eq!(request(20 * 1024 * 1024 * 1024 - 512).size_gib(), 20);
        assert_eq!(request(0).size_gib(), 0);
    }

    #[test]
    fn test_category_names() {
        assert_eq!(DiskCategory::from_name("available"), DiskCategory::Available);
        assert_eq!(DiskCategory::from_name(""), DiskCategory::Available);
        assert_eq!(DiskCategory::from_name("cloud_efficiency"), DiskCategory::Efficiency);
        assert_eq!(DiskCategory::from_name("cloud_ssd"), DiskCategory::Ssd);
        assert_eq!(DiskCategory::from_name("cloud"), DiskCategory::Basic);
        assert_eq!(
            DiskCategory::from_name("cloud_essd"),
            DiskCategory::Other("cloud_essd".into())
        );
        assert_eq!(format!("{}", DiskCategory::Ssd), "cloud_ssd");
        assert_eq!(format!("{}", DiskCategory::Other("cloud_essd".into())), "cloud_essd");
    }

    #[test]
    fn test_category_fallback_ladder() {
        assert_eq!(DiskCategory::Efficiency.fallback(), Some(DiskCategory::Ssd));
        assert_eq!(DiskCategory::Ssd.fallback(), Some(DiskCategory::Basic));
        assert_eq!(DiskCategory::Basic.fallback(), None);
        assert_eq!(DiskCategory::Available.fallback(), None);
        assert_eq!(DiskCategory::Other("cloud_essd".into()).fallback(), None);
    }

    #[test]
    fn test_credentials_debug_hides_secret() {
        let mut creds = Credentials::new("LTAIid", "topsecret");
        creds.security_token = Some("token".into());
        let text = format!("{:?}", creds);
        assert!(text.contains("LTAIid"));
        assert!(!text.contains("topsecret"));
        assert!(!text.contains("\"token\""));
        assert!(creds.is_usable());
        assert!(Credentials::default().is_empty());
    }
}
