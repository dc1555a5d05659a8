//! Error types for the disk provisioner
//!
//! Provides structured error types for credential resolution, placement,
//! disk creation/deletion, and the cloud API and cluster clients.

use std::time::Duration;
use thiserror::Error;

/// Error code returned when a disk category is not offered in a zone
pub const CODE_CATEGORY_NOT_SUPPORTED: &str = "InvalidDataDiskCategory.NotSupported";

/// Error code returned when a disk cannot be deleted in its current state
pub const CODE_INCORRECT_DISK_STATUS: &str = "IncorrectDiskStatus";

/// Unified error type for the provisioner
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Provisioning Errors
    // =========================================================================
    #[error("No credentials available for {operation}")]
    MissingCredentials { operation: String },

    #[error("Cannot resolve placement: region_id={region:?}, zone_id={zone:?}")]
    MissingPlacement { region: String, zone: String },

    #[error("Create disk failed (category {category}, region {region}, zone {zone}): {reason}")]
    CreateFailed {
        category: String,
        region: String,
        zone: String,
        reason: String,
    },

    #[error("Delete disk {volume} failed after {attempts} attempt(s): {reason}")]
    DeleteFailed {
        volume: String,
        attempts: u32,
        reason: String,
    },

    #[error("Volume {volume} is missing the ownership annotation")]
    MissingOwnership { volume: String },

    // =========================================================================
    // Cloud API Errors
    // =========================================================================
    #[error("Cloud API error: {0}")]
    Api(#[from] ApiError),

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    // =========================================================================
    // Kubernetes Errors
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("Capacity parse error: {0}")]
    CapacityParse(String),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Cloud API Error
// =============================================================================

/// Error response returned by the ECS API
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message} (status {status}, request id {request_id})")]
pub struct ApiError {
    /// Machine-readable error code, e.g. `IncorrectDiskStatus`
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Request id assigned by the API, empty when unknown
    pub request_id: String,
    /// HTTP status code
    pub status: u16,
}

/// Classification of API error codes that drive retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// The requested disk category is unavailable in the target zone
    CategoryNotSupported,
    /// The disk is not in a deletable state (usually still attached)
    IncorrectDiskStatus,
    /// Any other code
    Other,
}

impl ApiError {
    /// Create a new API error
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            request_id: String::new(),
            status: 400,
        }
    }

    /// Classify this error by its code
    pub fn kind(&self) -> ApiErrorKind {
        if code_matches(&self.code, CODE_CATEGORY_NOT_SUPPORTED) {
            ApiErrorKind::CategoryNotSupported
        } else if code_matches(&self.code, CODE_INCORRECT_DISK_STATUS) {
            ApiErrorKind::IncorrectDiskStatus
        } else {
            ApiErrorKind::Other
        }
    }
}

/// Codes match exactly or as a dotted refinement (`IncorrectDiskStatus.Initializing`)
fn code_matches(code: &str, expected: &str) -> bool {
    code == expected
        || code
            .strip_prefix(expected)
            .is_some_and(|rest| rest.starts_with('.'))
}

// =============================================================================
// Error Actions
// =============================================================================

/// Action the orchestrator should take for a failed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Requeue with exponential backoff
    RequeueWithBackoff,
    /// Requeue after specific duration
    RequeueAfter(Duration),
    /// Don't requeue, wait for changes
    NoRequeue,
}

impl Error {
    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self {
            // Transient errors - retry with backoff
            Error::Transport(_) | Error::Kube(_) | Error::Api(_) | Error::CreateFailed { .. } => {
                ErrorAction::RequeueWithBackoff
            }

            // Disk still attached - give the driver time to detach
            Error::DeleteFailed { .. } => ErrorAction::RequeueAfter(Duration::from_secs(30)),

            // Configuration/validation errors - don't retry automatically
            Error::Configuration(_)
            | Error::MissingCredentials { .. }
            | Error::MissingPlacement { .. }
            | Error::MissingOwnership { .. }
            | Error::CapacityParse(_)
            | Error::JsonParse(_)
            | Error::YamlParse(_) => ErrorAction::NoRequeue,

            // All other errors - retry with backoff
            _ => ErrorAction::RequeueWithBackoff,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::NoRequeue)
    }

    /// Check if this error is transient
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Kube(_))
    }
}

/// Result type alias for the provisioner
pub type Result<T> = std::result::Result<T, Error>;
