//! Alibaba Cloud Clients
//!
//! HTTP implementations of the cloud-facing ports:
//! - [`metadata`]: instance metadata service (placement, RAM role tokens)
//! - [`ecs`]: signed ECS disk API

pub mod ecs;
pub mod metadata;

pub use ecs::{EcsClient, EcsConfig};
pub use metadata::{HttpMetadataClient, MetadataConfig};
