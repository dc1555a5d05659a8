//! ECS Disk API Client
//!
//! Issues signed RPC-style requests (signature version 1.0, HMAC-SHA1)
//! against the ECS OpenAPI for disk creation and deletion.

use crate::domain::ports::{CreateDiskArgs, Credentials, DeleteDiskArgs, DiskService};
use crate::error::{ApiError, Error, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha1::Sha1;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

// =============================================================================
// Configuration
// =============================================================================

/// ECS API version spoken by this client
pub const API_VERSION: &str = "2014-05-26";

/// Configuration for the ECS client
#[derive(Debug, Clone)]
pub struct EcsConfig {
    /// API endpoint
    pub endpoint: String,
    /// User-Agent sent with every request
    pub user_agent: String,
    /// Per-request timeout; `None` keeps the transport default
    pub timeout: Option<Duration>,
}

impl Default for EcsConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://ecs.aliyuncs.com".to_string(),
            user_agent: crate::identity(),
            timeout: None,
        }
    }
}

// =============================================================================
// Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateDiskResponse {
    disk_id: String,
    #[serde(default)]
    request_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EmptyResponse {
    #[serde(default)]
    request_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorResponse {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    request_id: String,
}

// =============================================================================
// Request Signing
// =============================================================================

/// RFC 3986 percent-encoding as required by the signature scheme
fn percent_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Canonical, sorted query string
fn canonicalize(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Compute the request signature over the sorted parameters
pub fn sign(secret: &str, params: &BTreeMap<String, String>) -> Result<String> {
    let string_to_sign = format!(
        "GET&{}&{}",
        percent_encode("/"),
        percent_encode(&canonicalize(params))
    );
    let mut mac = Hmac::<Sha1>::new_from_slice(format!("{}&", secret).as_bytes())
        .map_err(|e| Error::Internal(format!("invalid signing key: {}", e)))?;
    mac.update(string_to_sign.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Full parameter set for an action, without the signature
fn request_params(
    credentials: &Credentials,
    action: &str,
    mut params: BTreeMap<String, String>,
    timestamp: &str,
    nonce: &str,
) -> BTreeMap<String, String> {
    params.insert("Action".into(), action.into());
    params.insert("Format".into(), "JSON".into());
    params.insert("Version".into(), API_VERSION.into());
    params.insert("AccessKeyId".into(), credentials.access_key_id.clone());
    params.insert("SignatureMethod".into(), "HMAC-SHA1".into());
    params.insert("SignatureVersion".into(), "1.0".into());
    params.insert("SignatureNonce".into(), nonce.into());
    params.insert("Timestamp".into(), timestamp.into());
    if let Some(token) = credentials.security_token.as_deref().filter(|t| !t.is_empty()) {
        params.insert("SecurityToken".into(), token.into());
    }
    params
}

// =============================================================================
// ECS Client
// =============================================================================

/// ECS API client; credentials are supplied per call
pub struct EcsClient {
    config: EcsConfig,
    client: reqwest::Client,
}

impl EcsClient {
    /// Create a new ECS client
    pub fn new(config: EcsConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(config.user_agent.clone());
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            config,
            client: builder.build()?,
        })
    }

    /// Invoke an action and decode its JSON response
    async fn invoke<T: DeserializeOwned>(
        &self,
        credentials: &Credentials,
        action: &str,
        params: BTreeMap<String, String>,
    ) -> Result<T> {
        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let nonce = uuid::Uuid::new_v4().to_string();
        let params = request_params(credentials, action, params, &timestamp, &nonce);
        let signature = sign(&credentials.access_key_secret, &params)?;

        let url = format!(
            "{}/?{}&Signature={}",
            self.config.endpoint.trim_end_matches('/'),
            canonicalize(&params),
            percent_encode(&signature)
        );
        debug!("Invoking ECS {} (nonce {})", action, nonce);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if status.is_success() {
            return Ok(serde_json::from_slice(&body)?);
        }

        let parsed: ErrorResponse = serde_json::from_slice(&body).unwrap_or_default();
        let code = if parsed.code.is_empty() {
            format!("HTTP{}", status.as_u16())
        } else {
            parsed.code
        };
        let message = if parsed.message.is_empty() {
            String::from_utf8_lossy(&body).into_owned()
        } else {
            parsed.message
        };
        Err(Error::Api(ApiError {
            code,
            message,
            request_id: parsed.request_id,
            status: status.as_u16(),
        }))
    }
}

#[async_trait]
impl DiskService for EcsClient {
    async fn create_disk(&self, credentials: &Credentials, args: &CreateDiskArgs) -> Result<String> {
        let mut params = BTreeMap::new();
        params.insert("RegionId".to_string(), args.region_id.clone());
        params.insert("ZoneId".to_string(), args.zone_id.clone());
        params.insert("DiskCategory".to_string(), args.category.to_string());
        params.insert("Size".to_string(), args.size_gib.to_string());
        params.insert("Encrypted".to_string(), args.encrypted.to_string());

        let response: CreateDiskResponse = self.invoke(credentials, "CreateDisk", params).await?;
        info!(
            "ECS CreateDisk returned {} (request {})",
            response.disk_id, response.request_id
        );
        Ok(response.disk_id)
    }

    async fn delete_disk(&self, credentials: &Credentials, args: &DeleteDiskArgs) -> Result<()> {
        let mut params = BTreeMap::new();
        params.insert("DiskId".to_string(), args.disk_id.clone());

        let response: EmptyResponse = self.invoke(credentials, "DeleteDisk", params).await?;
        debug!(
            "ECS DeleteDisk {} accepted (request {})",
            args.disk_id, response.request_id
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::DiskCategory;
    use crate::error::{ApiErrorKind, CODE_CATEGORY_NOT_SUPPORTED};
    use crate::test_support::serve;
    use assert_matches::assert_matches;
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;

    const SECRET: &str = "secret";

    #[test]
    fn test_signature_reference_vector() {
        let params: BTreeMap<String, String> = [
            ("AccessKeyId", "testid"),
            ("Action", "DescribeRegions"),
            ("Format", "XML"),
            ("SignatureMethod", "HMAC-SHA1"),
            ("SignatureNonce", "3ee8c1b8-83d3-44af-a94f-4e0ad82fd6cf"),
            ("SignatureVersion", "1.0"),
            ("Timestamp", "2016-02-23T12:46:24Z"),
            ("Version", "2014-05-26"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        assert_eq!(sign("testsecret", &params).unwrap(), "OLeaidS1JvxuMvnyHOwuJ+uX5qY=");
    }

    #[test]
    fn test_request_params_include_token() {
        let mut creds = Credentials::new("STS.id", SECRET);
        creds.security_token = Some("tok".into());
        let params = request_params(&creds, "DeleteDisk", BTreeMap::new(), "ts", "n1");
        assert_eq!(params["Action"], "DeleteDisk");
        assert_eq!(params["Format"], "JSON");
        assert_eq!(params["SecurityToken"], "tok");

        let params = request_params(&Credentials::new("id", SECRET), "DeleteDisk", BTreeMap::new(), "ts", "n1");
        assert!(!params.contains_key("SecurityToken"));
    }

    #[test]
    fn test_percent_encoding() {
        assert_eq!(percent_encode("a b*c~d/e:f"), "a%20b%2Ac~d%2Fe%3Af");
    }

    /// Fake ECS endpoint that verifies signatures and echoes parameters
    async fn fake_ecs(
        Query(mut query): Query<BTreeMap<String, String>>,
    ) -> (StatusCode, String) {
        let Some(signature) = query.remove("Signature") else {
            return (StatusCode::BAD_REQUEST, r#"{"Code":"MissingSignature"}"#.into());
        };
        if sign(SECRET, &query).ok().as_deref() != Some(signature.as_str()) {
            return (
                StatusCode::FORBIDDEN,
                r#"{"Code":"SignatureDoesNotMatch","Message":"bad signature","RequestId":"r-sig"}"#.into(),
            );
        }

        match query.get("Action").map(String::as_str) {
            Some("CreateDisk") if query.get("DiskCategory").map(String::as_str) == Some("cloud_ssd") => (
                StatusCode::FORBIDDEN,
                format!(
                    r#"{{"Code":"{}","Message":"not supported","RequestId":"r-cat"}}"#,
                    CODE_CATEGORY_NOT_SUPPORTED
                ),
            ),
            Some("CreateDisk") => (
                StatusCode::OK,
                format!(
                    r#"{{"DiskId":"d-{}-{}-{}","RequestId":"r-1"}}"#,
                    query["ZoneId"], query["Size"], query["Encrypted"]
                ),
            ),
            Some("DeleteDisk") if query["DiskId"] == "d-attached" => (
                StatusCode::FORBIDDEN,
                r#"{"Code":"IncorrectDiskStatus","Message":"disk attached","RequestId":"r-2"}"#.into(),
            ),
            Some("DeleteDisk") => (StatusCode::OK, r#"{"RequestId":"r-3"}"#.into()),
            _ => (StatusCode::BAD_REQUEST, "not json".into()),
        }
    }

    async fn client() -> EcsClient {
        let addr = serve(Router::new().route("/", get(fake_ecs))).await;
        EcsClient::new(EcsConfig {
            endpoint: format!("http://{}", addr),
            user_agent: "test-agent".into(),
            timeout: Some(Duration::from_secs(5)),
        })
        .unwrap()
    }

    fn args(category: DiskCategory) -> CreateDiskArgs {
        CreateDiskArgs {
            size_gib: 20,
            region_id: "cn-hangzhou".into(),
            zone_id: "cn-hangzhou-g".into(),
            category,
            encrypted: true,
        }
    }

    #[tokio::test]
    async fn test_create_disk() {
        let client = client().await;
        let id = client
            .create_disk(&Credentials::new("id", SECRET), &args(DiskCategory::Efficiency))
            .await
            .unwrap();
        assert_eq!(id, "d-cn-hangzhou-g-20-true");
    }

    #[tokio::test]
    async fn test_create_disk_error_code() {
        let client = client().await;
        let err = client
            .create_disk(&Credentials::new("id", SECRET), &args(DiskCategory::Ssd))
            .await
            .unwrap_err();
        assert_matches!(err, Error::Api(ref e) => {
            assert_eq!(e.kind(), ApiErrorKind::CategoryNotSupported);
            assert_eq!(e.request_id, "r-cat");
            assert_eq!(e.status, 403);
        });
    }

    #[tokio::test]
    async fn test_wrong_secret_is_rejected() {
        let client = client().await;
        let err = client
            .create_disk(&Credentials::new("id", "other"), &args(DiskCategory::Basic))
            .await
            .unwrap_err();
        assert_matches!(err, Error::Api(ref e) if e.code == "SignatureDoesNotMatch");
    }

    #[tokio::test]
    async fn test_delete_disk() {
        let client = client().await;
        let creds = Credentials::new("id", SECRET);

        client
            .delete_disk(&creds, &DeleteDiskArgs { disk_id: "d-free".into() })
            .await
            .unwrap();

        let err = client
            .delete_disk(&creds, &DeleteDiskArgs { disk_id: "d-attached".into() })
            .await
            .unwrap_err();
        assert_matches!(err, Error::Api(ref e) if e.kind() == ApiErrorKind::IncorrectDiskStatus);
    }
}
