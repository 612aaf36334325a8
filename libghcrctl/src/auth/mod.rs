//! Authentication handling for the registry plane.
//!
//! GHCR answers unauthenticated registry requests with a `401` and a Bearer
//! challenge. The client exchanges the user's GitHub token for a registry
//! token at the challenge's realm, caches it per scope, and retries once.

use crate::error::{GhcrError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;


/// Username GHCR expects alongside a GitHub token in Basic auth.
pub const TOKEN_USERNAME: &str = "x-access-token";

/// Lifetime assumed for registry tokens that don't state one.
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 300;

/// Margin subtracted from token lifetimes.
const TOKEN_EXPIRY_MARGIN_SECS: u64 = 30;

/// Credentials for an HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// HTTP Basic authentication with username and password
    Basic {
        /// Username for authentication
        username: String,
        /// Password for authentication
        password: String,
    },

    /// Bearer token authentication (OAuth2-style)
    Bearer {
        /// The bearer token
        token: String,
    },
}

impl Credentials {
    /// Creates Basic authentication credentials.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Creates Bearer token credentials.
    ///
    /// # Examples
    ///
    /// ```
    /// use libghcrctl::auth::Credentials;
    ///
    /// let creds = Credentials::bearer("token123");
    /// assert_eq!(creds.to_header_value(), "Bearer token123");
    /// ```
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer {
            token: token.into(),
        }
    }

    /// Returns the Authorization header value for these credentials.
    pub fn to_header_value(&self) -> String {
        match self {
            Self::Basic { username, password } => {
                use base64::{Engine as _, engine::general_purpose};
                let credentials = format!("{}:{}", username, password);
                let encoded = general_purpose::STANDARD.encode(credentials);
                format!("Basic {}", encoded)
            }
            Self::Bearer { token } => format!("Bearer {}", token),
        }
    }
}

/// Information parsed from a WWW-Authenticate header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    /// The authentication scheme (e.g., "Bearer")
    pub scheme: String,

    /// The authentication realm
    pub realm: String,

    /// The service identifier
    pub service: Option<String>,

    /// The scope being requested
    pub scope: Option<String>,
}

impl AuthChallenge {
    /// Parses a WWW-Authenticate header value.
    ///
    /// Commas inside quoted values are kept, so scopes like
    /// `repository:octo/app:pull,push` survive intact.
    ///
    /// # Examples
    ///
    /// ```
    /// use libghcrctl::auth::AuthChallenge;
    ///
    /// let header = r#"Bearer realm="https://ghcr.io/token",service="ghcr.io",scope="repository:octo/app:pull,push""#;
    /// let challenge = AuthChallenge::parse(header).unwrap();
    /// assert_eq!(challenge.scheme, "Bearer");
    /// assert_eq!(challenge.scope.as_deref(), Some("repository:octo/app:pull,push"));
    /// ```
    pub fn parse(header: &str) -> Result<Self> {
        let header = header.trim();

        let (scheme, params) = header
            .split_once(' ')
            .ok_or_else(|| GhcrError::validation("Invalid WWW-Authenticate header format"))?;

        let mut realm = None;
        let mut service = None;
        let mut scope = None;

        for param in split_params(params) {
            if let Some((key, value)) = param.split_once('=') {
                let value = value.trim().trim_matches('"').to_string();
                match key.trim() {
                    "realm" => realm = Some(value),
                    "service" => service = Some(value),
                    "scope" => scope = Some(value),
                    _ => {}
                }
            }
        }

        let realm = realm.ok_or_else(|| {
            GhcrError::validation("WWW-Authenticate header missing required 'realm' parameter")
        })?;

        Ok(Self {
            scheme: scheme.to_string(),
            realm,
            service,
            scope,
        })
    }

    /// True for the Bearer token flow.
    pub fn is_bearer(&self) -> bool {
        self.scheme.eq_ignore_ascii_case("bearer")
    }
}

/// Splits challenge parameters on commas outside double quotes.
fn split_params(params: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in params.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(params[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(params[start..].trim());
    parts.into_iter().filter(|p| !p.is_empty()).collect()
}

/// Body returned by a token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
    expires_in: Option<u64>,
}

/// Exchanges `credentials` for a registry token at the challenge realm.
pub async fn request_token(
    http: &reqwest::Client,
    challenge: &AuthChallenge,
    credentials: &Credentials,
) -> Result<(String, Option<u64>)> {
    let mut query: Vec<(&str, &str)> = Vec::new();
    if let Some(service) = &challenge.service {
        query.push(("service", service.as_str()));
    }
    if let Some(scope) = &challenge.scope {
        query.push(("scope", scope.as_str()));
    }

    let mut request = http
        .get(&challenge.realm)
        .header(reqwest::header::AUTHORIZATION, credentials.to_header_value());
    if !query.is_empty() {
        request = request.query(&query);
    }

    let response = request
        .send()
        .await
        .map_err(|e| {
            GhcrError::transient_with_source(
                format!("Failed to reach token endpoint {}", challenge.realm),
                e,
            )
        })?;

    let status = response.status();
    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(GhcrError::auth(
            format!("token endpoint {} rejected credentials", challenge.realm),
            Some(status.as_u16()),
        ));
    }
    if status.is_server_error() {
        return Err(GhcrError::transient(format!(
            "token endpoint {} returned HTTP {}",
            challenge.realm,
            status.as_u16()
        )));
    }
    if !status.is_success() {
        return Err(GhcrError::auth(
            format!(
                "token endpoint {} returned HTTP {}",
                challenge.realm,
                status.as_u16()
            ),
            Some(status.as_u16()),
        ));
    }

    let body: TokenResponse = response.json().await.map_err(|e| {
        GhcrError::validation_with_source("Failed to parse token endpoint response", e)
    })?;

    let token = body.token.or(body.access_token).ok_or_else(|| {
        GhcrError::auth("token endpoint response carried no token", None)
    })?;

    Ok((token, body.expires_in))
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Registry tokens keyed by `(service, scope)`.
///
/// Cloning shares the underlying cache.
#[derive(Debug, Clone, Default)]
pub struct TokenCache {
    tokens: Arc<RwLock<HashMap<(String, String), CachedToken>>>,
}

impl TokenCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns any live token whose scope grants `action` on `repository`.
    pub async fn find_for(&self, repository: &str, action: &str) -> Option<String> {
        let prefix = format!("repository:{}:", repository);
        let tokens = self.tokens.read().await;
        tokens
            .iter()
            .filter(|(_, cached)| cached.expires_at > Instant::now())
            .find(|((_, scope), _)| {
                scope
                    .split(' ')
                    .filter_map(|s| s.strip_prefix(&prefix))
                    .any(|actions| actions.split(',').any(|a| a == action || a == "*"))
            })
            .map(|(_, cached)| cached.token.clone())
    }

    /// Stores a token, expiring it ahead of its stated lifetime.
    pub async fn insert(
        &self,
        service: &str,
        scope: &str,
        token: String,
        expires_in_seconds: Option<u64>,
    ) {
        let lifetime = expires_in_seconds.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        let expires_at =
            Instant::now() + Duration::from_secs(lifetime.saturating_sub(TOKEN_EXPIRY_MARGIN_SECS));
        let mut tokens = self.tokens.write().await;
        tokens.retain(|_, cached| cached.expires_at > Instant::now());
        tokens.insert(
            (service.to_string(), scope.to_string()),
            CachedToken { token, expires_at },
        );
    }
}
