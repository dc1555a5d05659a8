//! Kubernetes Object Mapping
//!
//! Converts between Kubernetes objects and the provisioner's domain types:
//! claims become [`ProvisionRequest`]s, created disks become FlexVolume
//! backed PersistentVolumes, and released volumes become
//! [`VolumeDescriptor`]s again.

use crate::domain::ports::{DiskCategory, ProvisionRequest, VolumeDescriptor, GIB};
use crate::error::{Error, Result};
use crate::provisioner::create::CreatedVolume;
use crate::provisioner::placement::{LABEL_REGION, LABEL_ZONE};
use k8s_openapi::api::core::v1::{
    FlexPersistentVolumeSource, PersistentVolume, PersistentVolumeClaim, PersistentVolumeSpec,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Annotation naming the provisioner that created a volume
pub const ANNOTATION_PROVISIONED_BY: &str = "pv.kubernetes.io/provisioned-by";

/// Annotation recording the disk category actually created
pub const ANNOTATION_DISK_CATEGORY: &str = "storage.alicloud.com/disk-category";

/// Claim annotations naming the provisioner expected to serve it
pub const ANNOTATION_STORAGE_PROVISIONER: &str = "volume.kubernetes.io/storage-provisioner";
pub const ANNOTATION_STORAGE_PROVISIONER_BETA: &str =
    "volume.beta.kubernetes.io/storage-provisioner";

/// FlexVolume option carrying the disk id
pub const FLEX_OPTION_VOLUME_ID: &str = "VolumeId";

const RESOURCE_STORAGE: &str = "storage";

/// Default reclaim policy for dynamically provisioned volumes
pub const DEFAULT_RECLAIM_POLICY: &str = "Delete";

// =============================================================================
// Volume Options
// =============================================================================

/// Everything the controller hands over for one provisioning request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeOptions {
    /// The claim being provisioned
    pub pvc: Option<PersistentVolumeClaim>,
    /// Storage class parameters
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    /// Reclaim policy for the new volume
    #[serde(default = "default_reclaim_policy")]
    pub reclaim_policy: String,
}

fn default_reclaim_policy() -> String {
    DEFAULT_RECLAIM_POLICY.to_string()
}

impl VolumeOptions {
    pub fn new(pvc: PersistentVolumeClaim) -> Self {
        Self {
            pvc: Some(pvc),
            parameters: BTreeMap::new(),
            reclaim_policy: default_reclaim_policy(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_reclaim_policy(mut self, policy: impl Into<String>) -> Self {
        self.reclaim_policy = policy.into();
        self
    }

    /// Provisioner the claim was routed to, if the controller recorded one
    pub fn requested_provisioner(&self) -> Option<&str> {
        let annotations = self.pvc.as_ref()?.metadata.annotations.as_ref()?;
        annotations
            .get(ANNOTATION_STORAGE_PROVISIONER)
            .or_else(|| annotations.get(ANNOTATION_STORAGE_PROVISIONER_BETA))
            .map(String::as_str)
    }

    /// Build the domain request from the claim
    pub fn to_request(&self) -> Result<ProvisionRequest> {
        let pvc = self
            .pvc
            .as_ref()
            .ok_or_else(|| Error::Configuration("volume options carry no claim".into()))?;
        let spec = pvc.spec.as_ref().ok_or_else(|| {
            Error::Configuration(format!("claim {} has no spec", claim_name(pvc)))
        })?;

        let storage = spec
            .resources
            .as_ref()
            .and_then(|r| r.requests.as_ref())
            .and_then(|r| r.get(RESOURCE_STORAGE))
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "claim {} does not request storage",
                    claim_name(pvc)
                ))
            })?;

        Ok(ProvisionRequest {
            capacity_bytes: parse_quantity(&storage.0)?,
            parameters: self.parameters.clone(),
            selector: spec
                .selector
                .as_ref()
                .and_then(|s| s.match_labels.clone()),
            access_modes: spec.access_modes.clone().unwrap_or_default(),
            reclaim_policy: self.reclaim_policy.clone(),
        })
    }
}

fn claim_name(pvc: &PersistentVolumeClaim) -> String {
    match (&pvc.metadata.namespace, &pvc.metadata.name) {
        (Some(ns), Some(name)) => format!("{}/{}", ns, name),
        (None, Some(name)) => name.clone(),
        _ => "<unnamed>".to_string(),
    }
}

// =============================================================================
// Quantity Parsing
// =============================================================================

/// Parse a Kubernetes resource quantity into bytes, rounding fractions up
///
/// Accepts plain numbers, decimal SI suffixes (`k M G T P E`), binary
/// suffixes (`Ki Mi Gi Ti Pi Ei`), the milli suffix `m` and decimal
/// exponents (`1e9`, `5E3`, `25e-1`).
pub fn parse_quantity(value: &str) -> Result<u64> {
    let invalid = |why: &str| Error::CapacityParse(format!("{:?}: {}", value, why));
    let value = value.trim();

    let split = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(value.len());
    let (number, suffix) = value.split_at(split);

    let (mul, div): (u128, u128) = match suffix {
        "" => (1, 1),
        "m" => (1, 1000),
        "k" => (1000, 1),
        "M" => (1000u128.pow(2), 1),
        "G" => (1000u128.pow(3), 1),
        "T" => (1000u128.pow(4), 1),
        "P" => (1000u128.pow(5), 1),
        "E" => (1000u128.pow(6), 1),
        "Ki" => (1 << 10, 1),
        "Mi" => (1 << 20, 1),
        "Gi" => (1 << 30, 1),
        "Ti" => (1 << 40, 1),
        "Pi" => (1 << 50, 1),
        "Ei" => (1 << 60, 1),
        _ => decimal_exponent(suffix).ok_or_else(|| invalid("unsupported suffix"))?,
    };

    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid("missing number"));
    }
    if fraction.contains('.') {
        return Err(invalid("malformed number"));
    }
    if fraction.len() > 18 {
        return Err(invalid("too many fractional digits"));
    }

    let digits = format!("{}{}", whole, fraction);
    let numerator: u128 = digits.parse().map_err(|_| invalid("number out of range"))?;
    let scale = 10u128.pow(fraction.len() as u32);

    let numerator = numerator
        .checked_mul(mul)
        .ok_or_else(|| invalid("number out of range"))?;
    let denominator = scale
        .checked_mul(div)
        .ok_or_else(|| invalid("number out of range"))?;
    let bytes = numerator.div_ceil(denominator);

    u64::try_from(bytes).map_err(|_| invalid("number out of range"))
}

/// Multiplier and divisor for an `e<n>` / `E<n>` suffix
fn decimal_exponent(suffix: &str) -> Option<(u128, u128)> {
    let exponent: i32 = suffix.strip_prefix(['e', 'E'])?.parse().ok()?;
    let factor = 10u128.checked_pow(exponent.unsigned_abs())?;
    if exponent >= 0 {
        Some((factor, 1))
    } else {
        Some((1, factor))
    }
}

// =============================================================================
// PersistentVolume Mapping
// =============================================================================

/// Build the PersistentVolume for a created disk
pub fn build_volume(
    created: &CreatedVolume,
    options: &VolumeOptions,
    provisioner_id: &str,
    driver: &str,
) -> PersistentVolume {
    let descriptor = &created.descriptor;
    let placement = &created.placement;

    let labels = BTreeMap::from([
        (LABEL_REGION.to_string(), descriptor.region_id.clone()),
        (LABEL_ZONE.to_string(), descriptor.zone_id.clone()),
    ]);

    let mut annotations = BTreeMap::from([(
        ANNOTATION_PROVISIONED_BY.to_string(),
        provisioner_id.to_string(),
    )]);
    if let Some(category) = &descriptor.category {
        annotations.insert(ANNOTATION_DISK_CATEGORY.to_string(), category.to_string());
    }

    let access_modes = options
        .pvc
        .as_ref()
        .and_then(|pvc| pvc.spec.as_ref())
        .and_then(|spec| spec.access_modes.clone());

    PersistentVolume {
        metadata: ObjectMeta {
            name: Some(descriptor.id.clone()),
            labels: Some(labels),
            annotations: Some(annotations),
            ..Default::default()
        },
        spec: Some(PersistentVolumeSpec {
            persistent_volume_reclaim_policy: Some(options.reclaim_policy.clone()),
            access_modes,
            capacity: Some(BTreeMap::from([(
                RESOURCE_STORAGE.to_string(),
                Quantity(format!("{}Gi", descriptor.size_gib)),
            )])),
            flex_volume: Some(FlexPersistentVolumeSource {
                driver: driver.to_string(),
                options: Some(BTreeMap::from([(
                    FLEX_OPTION_VOLUME_ID.to_string(),
                    descriptor.id.clone(),
                )])),
                read_only: Some(placement.read_only),
                fs_type: Some(placement.fs_type.clone()),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Rebuild the descriptor of a provisioned volume
pub fn describe_volume(volume: &PersistentVolume) -> Result<VolumeDescriptor> {
    let meta = &volume.metadata;
    let name = meta
        .name
        .clone()
        .ok_or_else(|| Error::Configuration("persistent volume has no name".into()))?;

    // Prefer the FlexVolume option; fall back to the object name
    let id = volume
        .spec
        .as_ref()
        .and_then(|s| s.flex_volume.as_ref())
        .and_then(|f| f.options.as_ref())
        .and_then(|o| o.get(FLEX_OPTION_VOLUME_ID))
        .cloned()
        .unwrap_or(name);

    let size_gib = match volume
        .spec
        .as_ref()
        .and_then(|s| s.capacity.as_ref())
        .and_then(|c| c.get(RESOURCE_STORAGE))
    {
        Some(quantity) => match parse_quantity(&quantity.0) {
            Ok(bytes) => bytes.div_ceil(GIB),
            Err(e) => {
                warn!("Ignoring capacity of volume {}: {}", id, e);
                0
            }
        },
        None => 0,
    };

    let label = |key: &str| {
        meta.labels
            .as_ref()
            .and_then(|l| l.get(key))
            .cloned()
            .unwrap_or_default()
    };
    let annotation = |key: &str| meta.annotations.as_ref().and_then(|a| a.get(key)).cloned();

    Ok(VolumeDescriptor {
        id,
        size_gib,
        region_id: label(LABEL_REGION),
        zone_id: label(LABEL_ZONE),
        category: annotation(ANNOTATION_DISK_CATEGORY).map(|c| DiskCategory::from_name(&c)),
        owner_tag: annotation(ANNOTATION_PROVISIONED_BY),
    })
}
