//! Disk Creation
//!
//! Creates an ECS disk for a provisioning request. When the storage class
//! asks for the `available` category the engine walks the fallback ladder
//! `cloud_efficiency -> cloud_ssd -> cloud` until a category is accepted
//! by the zone.

use crate::credentials::CredentialChain;
use crate::domain::ports::{
    CreateDiskArgs, DiskCategory, DiskServiceRef, PlacementDecision, ProvisionRequest,
    VolumeDescriptor,
};
use crate::error::{ApiErrorKind, Error, Result};
use crate::provisioner::placement::PlacementResolver;
use std::sync::Arc;
use tracing::{info, warn};

/// A successfully created disk together with the placement it was created for
#[derive(Debug, Clone)]
pub struct CreatedVolume {
    pub descriptor: VolumeDescriptor,
    pub placement: PlacementDecision,
}

/// Engine that turns provisioning requests into ECS disks
pub struct VolumeCreateEngine {
    credentials: Arc<CredentialChain>,
    placement: Arc<PlacementResolver>,
    disks: DiskServiceRef,
    identity: String,
}

impl VolumeCreateEngine {
    pub fn new(
        credentials: Arc<CredentialChain>,
        placement: Arc<PlacementResolver>,
        disks: DiskServiceRef,
        identity: impl Into<String>,
    ) -> Self {
        Self {
            credentials,
            placement,
            disks,
            identity: identity.into(),
        }
    }

    /// Create a disk for the request
    pub async fn create(&self, request: &ProvisionRequest) -> Result<CreatedVolume> {
        let size_gib = request.size_gib();
        if size_gib == 0 {
            return Err(Error::Configuration(
                "requested capacity must be at least one byte".into(),
            ));
        }

        let credentials = self.credentials.resolve().await;
        if credentials.is_empty() {
            return Err(Error::MissingCredentials {
                operation: "create disk".into(),
            });
        }

        let placement = self.placement.resolve(request).await;
        if !placement.is_complete() {
            return Err(Error::MissingPlacement {
                region: placement.region_id,
                zone: placement.zone_id,
            });
        }

        // `available` is resolved by the ladder, starting from efficiency disks
        let use_ladder = placement.category == DiskCategory::Available;
        let first = if use_ladder {
            DiskCategory::Efficiency
        } else {
            placement.category.clone()
        };

        let mut args = CreateDiskArgs {
            size_gib,
            region_id: placement.region_id.clone(),
            zone_id: placement.zone_id.clone(),
            category: first,
            encrypted: placement.encrypted,
        };

        let disk_id = loop {
            match self.disks.create_disk(&credentials, &args).await {
                Ok(disk_id) => break disk_id,
                Err(Error::Api(e)) if use_ladder && e.kind() == ApiErrorKind::CategoryNotSupported => {
                    let Some(next) = args.category.fallback() else {
                        return Err(create_failed(&args, e.to_string()));
                    };
                    warn!(
                        "Category {} not supported in zone {}, retrying with {}",
                        args.category, args.zone_id, next
                    );
                    args.category = next;
                }
                Err(e) => return Err(create_failed(&args, e.to_string())),
            }
        };

        info!(
            "Successfully created disk {}: {} GiB, {}/{}, {}",
            disk_id, size_gib, args.region_id, args.zone_id, args.category
        );

        Ok(CreatedVolume {
            descriptor: VolumeDescriptor {
                id: disk_id,
                size_gib,
                region_id: args.region_id,
                zone_id: args.zone_id,
                category: Some(args.category),
                owner_tag: Some(self.identity.clone()),
            },
            placement,
        })
    }
}

fn create_failed(args: &CreateDiskArgs, reason: String) -> Error {
    Error::CreateFailed {
        category: args.category.to_string(),
        region: args.region_id.clone(),
        zone: args.zone_id.clone(),
        reason,
    }
}
