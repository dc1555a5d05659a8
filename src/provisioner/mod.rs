//! Disk Provisioner
//!
//! Turns volume claims into ECS disks and releases them again:
//! - [`placement`]: region/zone/category resolution
//! - [`create`]: disk creation with category fallback
//! - [`delete`]: ownership-checked deletion with bounded retry
//! - [`volume`]: mapping to and from Kubernetes objects

pub mod create;
pub mod delete;
pub mod placement;
pub mod volume;

pub use create::{CreatedVolume, VolumeCreateEngine};
pub use delete::{DeleteRetryPolicy, VolumeDeleteEngine};
pub use placement::PlacementResolver;
pub use volume::{VolumeOptions, ANNOTATION_PROVISIONED_BY};

use crate::cloud::{EcsClient, EcsConfig, HttpMetadataClient, MetadataConfig};
use crate::credentials::{CredentialChain, CredentialConfig};
use crate::domain::ports::{DeleteOutcome, DiskServiceRef, InstanceMetadataRef};
use crate::error::{Error, Result};
use k8s_openapi::api::core::v1::PersistentVolume;
use std::sync::Arc;
use tracing::{error, info};

/// Identity written to the volumes this provisioner creates
pub const PROVISIONER_ID: &str = "alicloud-disk-dynamic-provisioner";

/// Provisioner name storage classes refer to by default
pub const PROVISIONER_NAME: &str = "alicloud/disk";

/// FlexVolume driver that attaches the disks
pub const FLEX_DRIVER: &str = "alicloud/disk";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the disk provisioner
#[derive(Debug, Clone)]
pub struct ProvisionerConfig {
    /// Provisioner name storage classes refer to
    pub name: String,
    /// Ownership identity recorded on created volumes
    pub provisioner_id: String,
    /// FlexVolume driver name
    pub driver: String,
    /// Filesystem used when the storage class names none
    pub default_fs_type: String,
    /// Credential sources
    pub credentials: CredentialConfig,
    /// Instance metadata service
    pub metadata: MetadataConfig,
    /// ECS API
    pub ecs: EcsConfig,
    /// Retry policy for disks still attached
    pub delete_retry: DeleteRetryPolicy,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            name: PROVISIONER_NAME.to_string(),
            provisioner_id: PROVISIONER_ID.to_string(),
            driver: FLEX_DRIVER.to_string(),
            default_fs_type: placement::DEFAULT_FS_TYPE.to_string(),
            credentials: CredentialConfig::default(),
            metadata: MetadataConfig::default(),
            ecs: EcsConfig::default(),
            delete_retry: DeleteRetryPolicy::default(),
        }
    }
}

// =============================================================================
// Disk Provisioner
// =============================================================================

/// Kubernetes-facing provisioner for Alibaba Cloud disks
pub struct DiskProvisioner {
    name: String,
    provisioner_id: String,
    driver: String,
    creator: VolumeCreateEngine,
    deleter: VolumeDeleteEngine,
}

impl DiskProvisioner {
    /// Create a provisioner talking to the real metadata service and ECS
    pub fn new(config: ProvisionerConfig) -> Result<Self> {
        let metadata: InstanceMetadataRef =
            Arc::new(HttpMetadataClient::new(config.metadata.clone())?);
        let disks: DiskServiceRef = Arc::new(EcsClient::new(config.ecs.clone())?);
        let credentials = Arc::new(CredentialChain::from_config(
            &config.credentials,
            metadata.clone(),
        ));
        Ok(Self::with_collaborators(config, credentials, metadata, disks))
    }

    /// Create a provisioner from explicit collaborators
    pub fn with_collaborators(
        config: ProvisionerConfig,
        credentials: Arc<CredentialChain>,
        metadata: InstanceMetadataRef,
        disks: DiskServiceRef,
    ) -> Self {
        let placement = Arc::new(
            PlacementResolver::new(metadata).with_default_fs_type(config.default_fs_type.clone()),
        );

        Self {
            creator: VolumeCreateEngine::new(
                credentials.clone(),
                placement,
                disks.clone(),
                config.provisioner_id.clone(),
            ),
            deleter: VolumeDeleteEngine::new(
                credentials,
                disks,
                config.provisioner_id.clone(),
                config.delete_retry,
            ),
            name: config.name,
            provisioner_id: config.provisioner_id,
            driver: config.driver,
        }
    }

    /// Create a disk for a claim and describe it as a PersistentVolume
    pub async fn provision(&self, options: &VolumeOptions) -> Result<PersistentVolume> {
        if let Some(requested) = options.requested_provisioner() {
            if requested != self.name {
                return Err(Error::Configuration(format!(
                    "claim is routed to provisioner {}, this is {}",
                    requested, self.name
                )));
            }
        }

        let request = options.to_request()?;
        info!(
            "Provisioning {} bytes with parameters {:?}",
            request.capacity_bytes, request.parameters
        );

        let created = self.creator.create(&request).await.map_err(|e| {
            error!("Create disk failed: {}", e);
            e
        })?;

        let pv = volume::build_volume(&created, options, &self.provisioner_id, &self.driver);
        info!(
            "Built volume {}: {} GiB in {}/{}, reclaim {}, fsType {}, readOnly {}",
            created.descriptor.id,
            created.descriptor.size_gib,
            created.descriptor.region_id,
            created.descriptor.zone_id,
            options.reclaim_policy,
            created.placement.fs_type,
            created.placement.read_only
        );
        Ok(pv)
    }

    /// Delete the disk behind a released PersistentVolume
    pub async fn delete(&self, volume: &PersistentVolume) -> Result<DeleteOutcome> {
        let descriptor = volume::describe_volume(volume)?;
        self.deleter.delete(&descriptor).await
    }
}
