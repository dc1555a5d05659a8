//! Disk Deletion
//!
//! Deletes disks this provisioner created. Detaching is asynchronous with
//! respect to the release of a volume, so a disk that is still attached is
//! retried a bounded number of times before giving up.

use crate::credentials::CredentialChain;
use crate::domain::ports::{DeleteDiskArgs, DeleteOutcome, DiskServiceRef, VolumeDescriptor};
use crate::error::{ApiErrorKind, Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Retry policy for disks that are not yet deletable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteRetryPolicy {
    /// Total delete attempts, including the first
    pub attempts: u32,
    /// Pause between attempts
    pub interval: Duration,
}

impl Default for DeleteRetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            interval: Duration::from_secs(3),
        }
    }
}

/// Engine that deletes disks on volume release
pub struct VolumeDeleteEngine {
    credentials: Arc<CredentialChain>,
    disks: DiskServiceRef,
    identity: String,
    retry: DeleteRetryPolicy,
}

impl VolumeDeleteEngine {
    pub fn new(
        credentials: Arc<CredentialChain>,
        disks: DiskServiceRef,
        identity: impl Into<String>,
        retry: DeleteRetryPolicy,
    ) -> Self {
        Self {
            credentials,
            disks,
            identity: identity.into(),
            retry,
        }
    }

    /// Delete the disk behind a volume
    ///
    /// Volumes created by another provisioner are reported as
    /// [`DeleteOutcome::Ignored`] without touching the API.
    pub async fn delete(&self, volume: &VolumeDescriptor) -> Result<DeleteOutcome> {
        let Some(owner) = volume.owner_tag.as_deref() else {
            return Err(Error::MissingOwnership {
                volume: volume.id.clone(),
            });
        };
        if owner != self.identity {
            let reason = format!(
                "provisioner {} did not create volume {} and cannot delete it; {} did",
                self.identity, volume.id, owner
            );
            warn!("{}", reason);
            return Ok(DeleteOutcome::Ignored { reason });
        }

        let credentials = self.credentials.resolve().await;
        if credentials.is_empty() {
            return Err(Error::MissingCredentials {
                operation: "delete disk".into(),
            });
        }

        let args = DeleteDiskArgs {
            disk_id: volume.id.clone(),
        };
        let max_attempts = self.retry.attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.disks.delete_disk(&credentials, &args).await {
                Ok(()) => {
                    info!("Successfully deleted disk {}", volume.id);
                    return Ok(DeleteOutcome::Deleted);
                }
                Err(Error::Api(e))
                    if e.kind() == ApiErrorKind::IncorrectDiskStatus && attempt < max_attempts =>
                {
                    warn!(
                        "Disk {} not deletable yet (attempt {}/{}): {}",
                        volume.id, attempt, max_attempts, e
                    );
                    tokio::time::sleep(self.retry.interval).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(
                        "Delete disk {} failed after {} attempt(s): {}",
                        volume.id, attempt, e
                    );
                    return Err(Error::DeleteFailed {
                        volume: volume.id.clone(),
                        attempts: attempt,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }
}
