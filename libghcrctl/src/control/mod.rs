//! Forge package REST API client.
//!
//! The control plane lists a package's versions as numbered records with
//! their digest, tags and timestamps. It is canonical for version ids; the
//! registry is authoritative for tags.

use crate::auth::Credentials;
use crate::client::{
    error_body, extract_next_link, normalize_url, rate_limit_delay, resolve_link,
    retry_after_seconds, translate_reqwest_error,
};
use crate::digest::digests_equal;
use crate::error::{GhcrError, Result};
use crate::operation::Operation;
use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

#[cfg(test)]
mod tests;

/// Default forge API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Versions requested per page.
const PAGE_SIZE: u32 = 100;

/// Rate-limited requests are retried this many times.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

const GITHUB_ACCEPT: &str = "application/vnd.github+json";
const GITHUB_API_VERSION: &str = "2022-11-28";

/// Whether a package owner is a user or an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerKind {
    User,
    #[serde(alias = "org")]
    Organization,
}

impl OwnerKind {
    /// Path segment used by the packages API.
    pub fn api_segment(&self) -> &'static str {
        match self {
            Self::User => "users",
            Self::Organization => "orgs",
        }
    }
}

impl fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Organization => f.write_str("organization"),
        }
    }
}

impl FromStr for OwnerKind {
    type Err = GhcrError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "organization" | "org" => Ok(Self::Organization),
            other => Err(GhcrError::validation(format!(
                "invalid owner type '{}': expected user or organization",
                other
            ))),
        }
    }
}

/// One stored manifest as the control plane sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRecord {
    /// Opaque, stable version id
    pub id: i64,
    /// Manifest digest (the API's `name` field)
    pub digest: String,
    /// Tags in API order
    pub tags: Vec<String>,
    /// RFC 3339 creation time
    pub created_at: String,
    /// RFC 3339 update time
    pub updated_at: String,
    /// Manifest media type, empty when unknown
    pub media_type: String,
    /// Web page of the version
    pub html_url: String,
}

impl VersionRecord {
    /// True if the record carries `tag`.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

#[derive(Debug, Deserialize)]
struct ApiVersion {
    id: i64,
    name: String,
    #[serde(default)]
    created_at: String,
    #[serde(default)]
    updated_at: String,
    #[serde(default)]
    html_url: Option<String>,
    #[serde(default)]
    metadata: Option<ApiMetadata>,
}

#[derive(Debug, Deserialize)]
struct ApiMetadata {
    #[serde(default)]
    container: Option<ApiContainer>,
}

#[derive(Debug, Deserialize)]
struct ApiContainer {
    #[serde(default)]
    tags: Vec<String>,
}

impl From<ApiVersion> for VersionRecord {
    fn from(v: ApiVersion) -> Self {
        Self {
            id: v.id,
            digest: v.name,
            tags: v
                .metadata
                .and_then(|m| m.container)
                .map(|c| c.tags)
                .unwrap_or_default(),
            created_at: v.created_at,
            updated_at: v.updated_at,
            media_type: String::new(),
            html_url: v.html_url.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiOwner {
    #[serde(rename = "type", default)]
    kind: String,
}

/// Control-plane capabilities the core depends on.
#[async_trait]
pub trait VersionLister: Send + Sync {
    /// Returns whether `owner` is a user or an organization.
    async fn owner_kind(&self, owner: &str) -> Result<OwnerKind>;

    /// Lists every version of a container package.
    async fn list_versions(
        &self,
        owner: &str,
        kind: OwnerKind,
        package: &str,
    ) -> Result<Vec<VersionRecord>>;
}

/// Client for the forge packages API.
#[derive(Debug, Clone)]
pub struct ControlClient {
    http: reqwest::Client,
    api_url: String,
    credentials: Credentials,
    operation: Operation,
    owners: Arc<RwLock<HashMap<String, OwnerKind>>>,
}

impl ControlClient {
    /// Creates a client for `api_url` authenticating with `token`.
    pub fn new(
        http: reqwest::Client,
        api_url: &str,
        token: impl Into<String>,
        operation: Operation,
    ) -> Result<Self> {
        Ok(Self {
            http,
            api_url: normalize_url(api_url)?,
            credentials: Credentials::bearer(token),
            operation,
            owners: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Returns the base API URL.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Seeds the owner memo so no probe is made for `owner`.
    pub fn remember_owner(&self, owner: &str, kind: OwnerKind) {
        if let Ok(mut owners) = self.owners.write() {
            owners.insert(owner.to_ascii_lowercase(), kind);
        }
    }

    fn remembered_owner(&self, owner: &str) -> Option<OwnerKind> {
        self.owners
            .read()
            .ok()
            .and_then(|owners| owners.get(&owner.to_ascii_lowercase()).copied())
    }

    /// Classifies `owner`, probing `/users` then `/orgs` on first sight.
    pub async fn classify_owner(&self, owner: &str) -> Result<OwnerKind> {
        if let Some(kind) = self.remembered_owner(owner) {
            return Ok(kind);
        }

        let url = format!("{}/users/{}", self.api_url, owner);
        let response = self.get(&url).await?;
        let kind = match response.status() {
            StatusCode::OK => {
                let body: ApiOwner = self.read_json(response, "owner response").await?;
                if body.kind.eq_ignore_ascii_case("organization") {
                    OwnerKind::Organization
                } else {
                    OwnerKind::User
                }
            }
            StatusCode::NOT_FOUND => {
                let url = format!("{}/orgs/{}", self.api_url, owner);
                let response = self.get(&url).await?;
                match response.status() {
                    StatusCode::OK => OwnerKind::Organization,
                    StatusCode::NOT_FOUND => {
                        return Err(GhcrError::OwnerNotFound {
                            owner: owner.to_string(),
                        });
                    }
                    _ => return Err(self.status_error(response, owner).await),
                }
            }
            _ => return Err(self.status_error(response, owner).await),
        };

        tracing::debug!(owner = %owner, kind = %kind, "classified owner");
        self.remember_owner(owner, kind);
        Ok(kind)
    }

    /// Lists all versions of `owner/package`, following pagination.
    pub async fn list_versions(
        &self,
        owner: &str,
        kind: OwnerKind,
        package: &str,
    ) -> Result<Vec<VersionRecord>> {
        let mut url = format!(
            "{}/{}/{}/packages/container/{}/versions?per_page={}",
            self.api_url,
            kind.api_segment(),
            owner,
            package,
            PAGE_SIZE
        );
        let mut records = Vec::new();

        loop {
            let response = self.get(&url).await?;
            if !response.status().is_success() {
                if response.status() == StatusCode::NOT_FOUND {
                    return Err(GhcrError::PackageNotFound {
                        package: format!("{}/{}", owner, package),
                    });
                }
                return Err(self.status_error(response, owner).await);
            }

            let next = extract_next_link(response.headers());
            let page: Vec<ApiVersion> = self.read_json(response, "package versions").await?;
            records.extend(page.into_iter().map(VersionRecord::from));

            match next {
                Some(target) => url = resolve_link(&self.api_url, &target),
                None => break,
            }
        }

        tracing::debug!(
            package = %format!("{}/{}", owner, package),
            versions = records.len(),
            "listed versions"
        );
        Ok(records)
    }

    /// Returns the id of the version whose digest is `digest`.
    pub async fn get_version_id_by_digest(
        &self,
        owner: &str,
        kind: OwnerKind,
        package: &str,
        digest: &str,
    ) -> Result<i64> {
        self.list_versions(owner, kind, package)
            .await?
            .iter()
            .find(|r| digests_equal(&r.digest, digest))
            .map(|r| r.id)
            .ok_or_else(|| GhcrError::DigestNotFound {
                digest: digest.to_string(),
            })
    }

    /// Sends a GET, retrying rate-limited responses.
    ///
    /// Returns any other response as is, success or not.
    async fn get(&self, url: &str) -> Result<Response> {
        let mut retries = 0;
        loop {
            tracing::debug!(method = "GET", url = %url, "control request");
            let request = self
                .http
                .get(url)
                .header(reqwest::header::AUTHORIZATION, self.credentials.to_header_value())
                .header(reqwest::header::ACCEPT, GITHUB_ACCEPT)
                .header("X-GitHub-Api-Version", GITHUB_API_VERSION);

            let response = self
                .operation
                .run(async {
                    request
                        .send()
                        .await
                        .map_err(|e| translate_reqwest_error(e, url))
                })
                .await?;

            if !is_rate_limited(&response) {
                return Ok(response);
            }

            let now = chrono::Utc::now();
            if retries >= MAX_RATE_LIMIT_RETRIES {
                return Err(GhcrError::RateLimited {
                    message: format!(
                        "{} still rate limited after {} retries",
                        url, MAX_RATE_LIMIT_RETRIES
                    ),
                    retry_after: retry_after_seconds(response.headers(), now),
                });
            }

            let delay = rate_limit_delay(response.headers(), now);
            retries += 1;
            tracing::warn!(
                url = %url,
                attempt = retries,
                delay_secs = delay.as_secs(),
                "rate limited, retrying"
            );
            self.operation.sleep(delay).await?;
        }
    }

    /// Reads and parses a JSON body under the operation.
    async fn read_json<T: DeserializeOwned>(&self, response: Response, what: &str) -> Result<T> {
        let bytes = self
            .operation
            .run(async {
                response.bytes().await.map_err(|e| {
                    GhcrError::transient_with_source(format!("Failed to read {}", what), e)
                })
            })
            .await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| GhcrError::validation_with_source(format!("Failed to parse {}", what), e))
    }

    async fn status_error(&self, response: Response, owner: &str) -> GhcrError {
        let status = response.status();
        let url = response.url().to_string();
        let body = match self
            .operation
            .run(async { Ok(error_body(response).await) })
            .await
        {
            Ok(body) => body,
            Err(e) => return e,
        };
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GhcrError::auth(
                format!("access denied to {} (owner '{}'): {}", url, owner, body),
                Some(status.as_u16()),
            ),
            s if s.is_server_error() => GhcrError::transient(format!(
                "server error {} from {}: {}",
                s.as_u16(),
                url,
                body
            )),
            s => GhcrError::validation(format!(
                "unexpected HTTP {} from {}: {}",
                s.as_u16(),
                url,
                body
            )),
        }
    }
}

/// 429, or 403 with an exhausted `X-RateLimit-Remaining`.
fn is_rate_limited(response: &Response) -> bool {
    match response.status() {
        StatusCode::TOO_MANY_REQUESTS => true,
        StatusCode::FORBIDDEN => response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim() == "0"),
        _ => false,
    }
}

#[async_trait]
impl VersionLister for ControlClient {
    async fn owner_kind(&self, owner: &str) -> Result<OwnerKind> {
        self.classify_owner(owner).await
    }

    async fn list_versions(
        &self,
        owner: &str,
        kind: OwnerKind,
        package: &str,
    ) -> Result<Vec<VersionRecord>> {
        ControlClient::list_versions(self, owner, kind, package).await
    }
}
