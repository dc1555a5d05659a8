//! Domain layer - Core types and port definitions
//!
//! This module defines the provisioning data model and the traits (ports)
//! that the cloud and credential adapters implement.

pub mod ports;

pub use ports::*;
