//! Alibaba Cloud Disk Provisioner
//!
//! Dynamically provisions ECS cloud disks for Kubernetes volume claims and
//! deletes them again when the volume is released.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                         DiskProvisioner                              │
//! │           PVC -> ProvisionRequest      PersistentVolume -> Descriptor │
//! ├───────────────────────────────┬──────────────────────────────────────┤
//! │     Volume Create Engine      │        Volume Delete Engine          │
//! │  (category fallback ladder)   │  (ownership check, bounded retry)    │
//! ├───────────────┬───────────────┴──────────────┬───────────────────────┤
//! │   Placement   │        Credential Chain      │                       │
//! │   Resolver    │  env -> encoded -> plain ->  │                       │
//! │               │        instance role         │                       │
//! ├───────────────┴──────────────────────────────┴───────────────────────┤
//! │        Instance Metadata (HTTP)        │     ECS Disk API (signed)    │
//! └────────────────────────────────────────┴─────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`provisioner`]: Kubernetes-facing provisioner and its engines
//! - [`credentials`]: Credential resolution chain
//! - [`cloud`]: Metadata and ECS clients
//! - [`domain`]: Core domain types and traits
//! - [`logging`]: Subscriber setup and log file rotation
//! - [`error`]: Error types and handling

pub mod cloud;
pub mod credentials;
pub mod domain;
pub mod error;
pub mod logging;
pub mod provisioner;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use cloud::{EcsClient, EcsConfig, HttpMetadataClient, MetadataConfig};
pub use credentials::{CredentialChain, CredentialConfig};
pub use domain::ports::{
    Credentials, DeleteOutcome, DiskCategory, PlacementDecision, ProvisionRequest,
    VolumeDescriptor,
};
pub use error::{Error, ErrorAction, Result};
pub use provisioner::{
    DeleteRetryPolicy, DiskProvisioner, ProvisionerConfig, VolumeOptions, FLEX_DRIVER,
    PROVISIONER_ID, PROVISIONER_NAME,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Identity presented to the cloud API as the User-Agent
pub fn identity() -> String {
    format!("Kubernetes.Alicloud/Provision.Disk-v{}", VERSION)
}
