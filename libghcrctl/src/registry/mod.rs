//! OCI distribution client for the registry plane.
//!
//! Speaks the subset of the OCI Distribution Specification v2 the tool needs:
//! tag lookup, manifest fetch and push, and blob fetch. Manifest bytes are
//! kept exactly as served so that re-pushing them preserves the digest.

use crate::auth::{AuthChallenge, Credentials, TOKEN_USERNAME, TokenCache, request_token};
use crate::client::{error_body, normalize_url, retry_after_seconds, translate_reqwest_error};
use crate::digest::{SHA256_PREFIX, digests_equal, sha256_digest};
use crate::error::{GhcrError, Result};
use crate::oci::{ImageConfiguration, ImageManifest, MANIFEST_ACCEPT, ManifestRef};
use crate::operation::Operation;
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};


/// Default registry endpoint.
pub const DEFAULT_REGISTRY_URL: &str = "https://ghcr.io";

const DOCKER_CONTENT_DIGEST: &str = "docker-content-digest";

/// Tag-to-digest lookup.
#[async_trait]
pub trait TagLookup: Send + Sync {
    /// Returns the digest `tag` currently points at.
    async fn resolve_tag(&self, image: &str, tag: &str) -> Result<String>;
}

/// Manifest storage operations used by discovery and tag mutation.
#[async_trait]
pub trait ManifestStore: TagLookup {
    /// Fetches a manifest by tag or digest, verifying its digest.
    async fn fetch_manifest(&self, image: &str, reference: &str) -> Result<ManifestRef>;

    /// Pushes `raw` unchanged under `tag`, returning the stored digest.
    async fn push_manifest(
        &self,
        image: &str,
        tag: &str,
        raw: &[u8],
        media_type: &str,
    ) -> Result<String>;

    /// Fetches and parses the config blob of a single-platform manifest.
    async fn fetch_config(
        &self,
        image: &str,
        manifest: &ImageManifest,
    ) -> Result<ImageConfiguration>;
}

/// Client for a GHCR-style OCI registry.
///
/// Cloning shares the token cache.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    http: reqwest::Client,
    registry_url: String,
    credentials: Credentials,
    tokens: TokenCache,
    operation: Operation,
}

impl RegistryClient {
    /// Creates a client for `registry_url` exchanging `token` for registry tokens.
    pub fn new(
        http: reqwest::Client,
        registry_url: &str,
        token: &str,
        operation: Operation,
    ) -> Result<Self> {
        Ok(Self {
            http,
            registry_url: normalize_url(registry_url)?,
            credentials: Credentials::basic(TOKEN_USERNAME, token),
            tokens: TokenCache::new(),
            operation,
        })
    }

    /// Returns the base registry URL.
    pub fn registry_url(&self) -> &str {
        &self.registry_url
    }

    /// Returns the shared token cache.
    pub fn token_cache(&self) -> &TokenCache {
        &self.tokens
    }

    fn manifest_url(&self, image: &str, reference: &str) -> String {
        format!("{}/v2/{}/manifests/{}", self.registry_url, image, reference)
    }

    fn blob_url(&self, image: &str, digest: &str) -> String {
        format!("{}/v2/{}/blobs/{}", self.registry_url, image, digest)
    }

    /// Sends a request, answering one Bearer challenge.
    ///
    /// The first attempt reuses a cached token covering `action` on `image`,
    /// or goes anonymous. A `401` with a Bearer challenge fetches a token and
    /// retries once; whatever comes back then is returned.
    async fn send<F>(
        &self,
        method: Method,
        url: &str,
        image: &str,
        action: &str,
        build: F,
    ) -> Result<Response>
    where
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        let mut bearer = self.tokens.find_for(image, action).await;
        let mut challenged = false;

        loop {
            tracing::debug!(method = %method, url = %url, cached_token = bearer.is_some(), "registry request");
            let mut request = build(self.http.request(method.clone(), url));
            if let Some(token) = &bearer {
                request = request.bearer_auth(token);
            }

            let response = self
                .operation
                .run(async {
                    request
                        .send()
                        .await
                        .map_err(|e| translate_reqwest_error(e, url))
                })
                .await?;

            if response.status() != StatusCode::UNAUTHORIZED || challenged {
                return Ok(response);
            }

            let challenge = response
                .headers()
                .get(reqwest::header::WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok())
                .map(AuthChallenge::parse)
                .transpose()?;

            let Some(challenge) = challenge.filter(|c| c.is_bearer()) else {
                return Err(GhcrError::auth(
                    format!("{} requires authentication but sent no Bearer challenge", url),
                    Some(401),
                ));
            };

            let (token, expires_in) = self
                .operation
                .run(request_token(&self.http, &challenge, &self.credentials))
                .await?;
            self.tokens
                .insert(
                    challenge.service.as_deref().unwrap_or(""),
                    challenge.scope.as_deref().unwrap_or(""),
                    token.clone(),
                    expires_in,
                )
                .await;
            tracing::debug!(scope = ?challenge.scope, "obtained registry token");

            bearer = Some(token);
            challenged = true;
        }
    }

    /// Maps a non-success response to an error; `not_found` builds the 404 case.
    async fn check_status<F>(response: Response, not_found: F) -> Result<Response>
    where
        F: FnOnce() -> GhcrError,
    {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        match status {
            StatusCode::NOT_FOUND => Err(not_found()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let url = response.url().to_string();
                let body = error_body(response).await;
                Err(GhcrError::auth(
                    format!("access denied to {}: {}", url, body),
                    Some(status.as_u16()),
                ))
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = retry_after_seconds(response.headers(), chrono::Utc::now());
                Err(GhcrError::RateLimited {
                    message: format!("registry rate limit exceeded for {}", response.url()),
                    retry_after,
                })
            }
            s if s.is_server_error() => {
                let url = response.url().to_string();
                let body = error_body(response).await;
                Err(GhcrError::transient(format!(
                    "server error {} from {}: {}",
                    s.as_u16(),
                    url,
                    body
                )))
            }
            s => {
                let url = response.url().to_string();
                let body = error_body(response).await;
                Err(GhcrError::validation(format!(
                    "unexpected HTTP {} from {}: {}",
                    s.as_u16(),
                    url,
                    body
                )))
            }
        }
    }

    /// Resolves `tag` to the digest the registry stores under it.
    pub async fn resolve_tag(&self, image: &str, tag: &str) -> Result<String> {
        let url = self.manifest_url(image, tag);
        let response = self
            .send(Method::HEAD, &url, image, "pull", |r| {
                r.header(reqwest::header::ACCEPT, MANIFEST_ACCEPT)
            })
            .await?;
        let response = Self::check_status(response, || GhcrError::TagNotFound {
            tag: tag.to_string(),
            status_code: 404,
        })
        .await?;

        header_digest(&response).ok_or_else(|| GhcrError::ManifestUnknown {
            reference: format!("{}:{}", image, tag),
        })
    }

    /// Fetches the manifest stored under `reference` (tag or digest).
    pub async fn fetch_manifest(&self, image: &str, reference: &str) -> Result<ManifestRef> {
        let url = self.manifest_url(image, reference);
        let by_digest = reference.starts_with(SHA256_PREFIX);

        let response = self
            .send(Method::GET, &url, image, "pull", |r| {
                r.header(reqwest::header::ACCEPT, MANIFEST_ACCEPT)
            })
            .await?;
        let response = Self::check_status(response, || {
            if by_digest {
                GhcrError::DigestNotFound {
                    digest: reference.to_string(),
                }
            } else {
                GhcrError::TagNotFound {
                    tag: reference.to_string(),
                    status_code: 404,
                }
            }
        })
        .await?;

        let declared = header_digest(&response).or_else(|| by_digest.then(|| reference.to_string()));
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let raw = self
            .operation
            .run(async {
                response.bytes().await.map_err(|e| {
                    GhcrError::transient_with_source("Failed to read manifest response", e)
                })
            })
            .await?
            .to_vec();

        let manifest = ManifestRef::from_raw(raw, content_type.as_deref())?;
        if let Some(expected) = declared
            && !digests_equal(&expected, &manifest.digest)
        {
            return Err(GhcrError::CorruptManifest {
                reference: display_reference(image, reference),
                expected,
                actual: manifest.digest,
            });
        }

        tracing::debug!(
            reference = %display_reference(image, reference),
            digest = %manifest.digest,
            media_type = %manifest.media_type,
            size = manifest.size,
            "fetched manifest"
        );
        Ok(manifest)
    }

    /// Pushes manifest bytes verbatim under `tag`.
    pub async fn push_manifest(
        &self,
        image: &str,
        tag: &str,
        raw: &[u8],
        media_type: &str,
    ) -> Result<String> {
        let url = self.manifest_url(image, tag);
        let response = self
            .send(Method::PUT, &url, image, "push", |r| {
                r.header(reqwest::header::CONTENT_TYPE, media_type)
                    .body(raw.to_vec())
            })
            .await?;

        if response.status() == StatusCode::BAD_REQUEST {
            let body = error_body(response).await;
            let lowered = body.to_ascii_lowercase();
            if body.contains("MANIFEST_INVALID") || lowered.contains("manifest invalid") {
                return Err(GhcrError::ManifestInvalid { message: body });
            }
            return Err(GhcrError::validation(format!(
                "registry rejected manifest for {}:{}: {}",
                image, tag, body
            )));
        }

        let response = Self::check_status(response, || GhcrError::PackageNotFound {
            package: image.to_string(),
        })
        .await?;

        let digest = header_digest(&response).unwrap_or_else(|| sha256_digest(raw));
        tracing::debug!(image = %image, tag = %tag, digest = %digest, "pushed manifest");
        Ok(digest)
    }

    /// Fetches a blob and verifies it hashes to `digest`.
    pub async fn fetch_blob(&self, image: &str, digest: &str) -> Result<Vec<u8>> {
        let url = self.blob_url(image, digest);
        let response = self
            .send(Method::GET, &url, image, "pull", |r| r)
            .await?;
        let response = Self::check_status(response, || GhcrError::DigestNotFound {
            digest: digest.to_string(),
        })
        .await?;

        let bytes = self
            .operation
            .run(async {
                response.bytes().await.map_err(|e| {
                    GhcrError::transient_with_source("Failed to read blob response", e)
                })
            })
            .await?;

        let actual = sha256_digest(&bytes);
        if !digests_equal(&actual, digest) {
            return Err(GhcrError::CorruptManifest {
                reference: format!("blob {}@{}", image, digest),
                expected: digest.to_string(),
                actual,
            });
        }

        Ok(bytes.to_vec())
    }

    /// Fetches and parses the config blob of `manifest`.
    pub async fn fetch_config(
        &self,
        image: &str,
        manifest: &ImageManifest,
    ) -> Result<ImageConfiguration> {
        let digest = manifest.config().digest().to_string();
        let bytes = self.fetch_blob(image, &digest).await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            GhcrError::validation_with_source(format!("Failed to parse image config {}", digest), e)
        })
    }
}

/// Lowercased `Docker-Content-Digest`, if present.
fn header_digest(response: &Response) -> Option<String> {
    response
        .headers()
        .get(DOCKER_CONTENT_DIGEST)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
}

fn display_reference(image: &str, reference: &str) -> String {
    if reference.starts_with(SHA256_PREFIX) {
        format!("{}@{}", image, reference)
    } else {
        format!("{}:{}", image, reference)
    }
}

#[async_trait]
impl TagLookup for RegistryClient {
    async fn resolve_tag(&self, image: &str, tag: &str) -> Result<String> {
        RegistryClient::resolve_tag(self, image, tag).await
    }
}

#[async_trait]
impl ManifestStore for RegistryClient {
    async fn fetch_manifest(&self, image: &str, reference: &str) -> Result<ManifestRef> {
        RegistryClient::fetch_manifest(self, image, reference).await
    }

    async fn push_manifest(
        &self,
        image: &str,
        tag: &str,
        raw: &[u8],
        media_type: &str,
    ) -> Result<String> {
        RegistryClient::push_manifest(self, image, tag, raw, media_type).await
    }

    async fn fetch_config(
        &self,
        image: &str,
        manifest: &ImageManifest,
    ) -> Result<ImageConfiguration> {
        RegistryClient::fetch_config(self, image, manifest).await
    }
}
