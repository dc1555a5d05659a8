//! In-memory fakes for the domain ports, shared by unit tests.

use crate::domain::ports::{
    CreateDiskArgs, CredentialSource, Credentials, DeleteDiskArgs, DiskService, InstanceMetadata,
};
use crate::error::{ApiError, Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::Instant;

// =============================================================================
// Instance Metadata
// =============================================================================

/// Metadata service with fixed answers
#[derive(Debug, Clone, Default)]
pub struct FakeMetadata {
    region: String,
    zone: String,
    role: Option<(String, Credentials)>,
    lookups: Arc<AtomicUsize>,
}

impl FakeMetadata {
    pub fn new(region: &str, zone: &str) -> Self {
        Self {
            region: region.to_string(),
            zone: zone.to_string(),
            ..Default::default()
        }
    }

    pub fn with_role(mut self, role: &str, id: &str, secret: &str, token: &str) -> Self {
        let credentials = Credentials {
            access_key_id: id.to_string(),
            access_key_secret: secret.to_string(),
            security_token: Some(token.to_string()),
        };
        self.role = Some((role.to_string(), credentials));
        self
    }

    /// Number of region/zone lookups served
    pub fn placement_lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InstanceMetadata for FakeMetadata {
    async fn region(&self) -> String {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.region.clone()
    }

    async fn zone(&self) -> String {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.zone.clone()
    }

    async fn role_name(&self) -> String {
        self.role
            .as_ref()
            .map(|(name, _)| name.clone())
            .unwrap_or_default()
    }

    async fn role_credentials(&self, role_name: &str) -> Credentials {
        match &self.role {
            Some((name, credentials)) if name == role_name => credentials.clone(),
            _ => Credentials::default(),
        }
    }
}

// =============================================================================
// Credentials
// =============================================================================

/// Credential source that always yields the same keys
pub struct StaticCredentials(pub Credentials);

#[async_trait]
impl CredentialSource for StaticCredentials {
    fn name(&self) -> &str {
        "static"
    }

    async fn load(&self) -> Option<Credentials> {
        Some(self.0.clone())
    }
}

// =============================================================================
// Disk Service
// =============================================================================

/// Disk API that replays queued responses in FIFO order and records calls
///
/// With nothing queued, create returns `d-fake` and delete succeeds.
#[derive(Default)]
pub struct ScriptedDiskService {
    create_responses: Mutex<VecDeque<std::result::Result<String, ApiError>>>,
    delete_responses: Mutex<VecDeque<std::result::Result<(), ApiError>>>,
    create_calls: Mutex<Vec<CreateDiskArgs>>,
    delete_calls: Mutex<Vec<(DeleteDiskArgs, Instant)>>,
    seen_credentials: Mutex<Vec<Credentials>>,
}

impl ScriptedDiskService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_create_ok(&self, disk_id: &str) {
        self.create_responses.lock().push_back(Ok(disk_id.to_string()));
    }

    pub fn push_create_err(&self, code: &str) {
        self.create_responses
            .lock()
            .push_back(Err(ApiError::new(code, "scripted failure")));
    }

    pub fn push_delete_ok(&self) {
        self.delete_responses.lock().push_back(Ok(()));
    }

    pub fn push_delete_err(&self, code: &str) {
        self.delete_responses
            .lock()
            .push_back(Err(ApiError::new(code, "scripted failure")));
    }

    pub fn create_calls(&self) -> Vec<CreateDiskArgs> {
        self.create_calls.lock().clone()
    }

    pub fn delete_calls(&self) -> Vec<(DeleteDiskArgs, Instant)> {
        self.delete_calls.lock().clone()
    }

    pub fn seen_credentials(&self) -> Vec<Credentials> {
        self.seen_credentials.lock().clone()
    }
}

#[async_trait]
impl DiskService for ScriptedDiskService {
    async fn create_disk(&self, credentials: &Credentials, args: &CreateDiskArgs) -> Result<String> {
        self.seen_credentials.lock().push(credentials.clone());
        self.create_calls.lock().push(args.clone());
        match self.create_responses.lock().pop_front() {
            Some(Ok(id)) => Ok(id),
            Some(Err(e)) => Err(Error::Api(e)),
            None => Ok("d-fake".to_string()),
        }
    }

    async fn delete_disk(&self, credentials: &Credentials, args: &DeleteDiskArgs) -> Result<()> {
        self.seen_credentials.lock().push(credentials.clone());
        self.delete_calls.lock().push((args.clone(), Instant::now()));
        match self.delete_responses.lock().pop_front() {
            Some(Ok(())) | None => Ok(()),
            Some(Err(e)) => Err(Error::Api(e)),
        }
    }
}

// =============================================================================
// HTTP
// =============================================================================

/// Serve a router on an ephemeral local port
pub async fn serve(router: axum::Router) -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}
