//! Placement Resolution
//!
//! Derives region, zone, disk category, filesystem type and the
//! read-only/encrypted flags for a provisioning request. Sources, in
//! increasing precedence: storage class parameters, claim selector labels.
//! Host metadata fills in region and zone when either is still missing.

use crate::domain::ports::{DiskCategory, InstanceMetadataRef, PlacementDecision, ProvisionRequest};
use tracing::{debug, warn};

/// Parameter keys (matched case-insensitively)
pub const PARAM_REGION_ID: &str = "regionid";
pub const PARAM_ZONE_ID: &str = "zoneid";
pub const PARAM_TYPE: &str = "type";
pub const PARAM_FS_TYPE: &str = "fstype";
pub const PARAM_READ_ONLY: &str = "readonly";
pub const PARAM_ENCRYPTED: &str = "encrypted";

/// Topology labels honoured in claim selectors and written to volumes
pub const LABEL_REGION: &str = "failure-domain.beta.kubernetes.io/region";
pub const LABEL_ZONE: &str = "failure-domain.beta.kubernetes.io/zone";

/// Filesystem used when the storage class does not name one
pub const DEFAULT_FS_TYPE: &str = "ext4";

/// Boolean parameter parsing: `true`, `1` and `yes` in any case
pub fn parse_bool(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

/// Resolves a [`PlacementDecision`] for each request
pub struct PlacementResolver {
    metadata: InstanceMetadataRef,
    default_fs_type: String,
}

impl PlacementResolver {
    pub fn new(metadata: InstanceMetadataRef) -> Self {
        Self {
            metadata,
            default_fs_type: DEFAULT_FS_TYPE.to_string(),
        }
    }

    /// Override the default filesystem type
    pub fn with_default_fs_type(mut self, fs_type: impl Into<String>) -> Self {
        self.default_fs_type = fs_type.into();
        self
    }

    /// Resolve placement for a request
    ///
    /// Never fails: an empty region or zone in the result means no source
    /// could supply one, and the caller must reject the request.
    pub async fn resolve(&self, request: &ProvisionRequest) -> PlacementDecision {
        let mut region_id = String::new();
        let mut zone_id = String::new();
        let mut category = String::new();
        let mut fs_type = self.default_fs_type.clone();
        let mut read_only = false;
        let mut encrypted = false;

        for (key, value) in &request.parameters {
            match key.to_ascii_lowercase().as_str() {
                PARAM_REGION_ID => region_id = value.trim().to_string(),
                PARAM_ZONE_ID => zone_id = value.trim().to_string(),
                PARAM_TYPE => category = value.trim().to_string(),
                PARAM_FS_TYPE => fs_type = value.trim().to_string(),
                PARAM_READ_ONLY => read_only = parse_bool(value),
                PARAM_ENCRYPTED => encrypted = parse_bool(value),
                _ => {}
            }
        }

        if let Some(selector) = &request.selector {
            if let Some(region) = selector.get(LABEL_REGION) {
                region_id = region.clone();
            }
            if let Some(zone) = selector.get(LABEL_ZONE) {
                zone_id = zone.clone();
            }
        }

        // Region and zone always come from the same source
        if region_id.is_empty() || zone_id.is_empty() {
            if !region_id.is_empty() || !zone_id.is_empty() {
                warn!(
                    "Incomplete placement (region {:?}, zone {:?}); using host metadata for both",
                    region_id, zone_id
                );
            }
            region_id = self.metadata.region().await.trim().to_string();
            zone_id = self.metadata.zone().await.trim().to_string();
            debug!("Placement from host metadata: {}/{}", region_id, zone_id);
        }

        let placement = PlacementDecision {
            region_id,
            zone_id,
            category: DiskCategory::from_name(&category),
            fs_type,
            read_only,
            encrypted,
        };
        debug!("Resolved placement: {:?}", placement);
        placement
    }
}
