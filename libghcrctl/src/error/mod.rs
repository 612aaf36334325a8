//! Error types for ghcrctl
//!
//! Every failure surfaced by the library is a [`GhcrError`]. Each variant maps
//! to a stable kind string (see [`GhcrError::kind`]) so callers and scripts can
//! branch on the failure class without parsing messages. Errors raised on one
//! plane keep their original message when wrapped with [`ResultExt::context`].

use thiserror::Error;


/// Number of ambiguous candidates shown in an error message.
const AMBIGUOUS_SHOWN: usize = 5;

/// Main error type for ghcrctl operations
#[derive(Error, Debug)]
pub enum GhcrError {
    /// No token could be obtained from the environment or the CLI helper
    #[error("no credentials available: {message}")]
    NoCredentials { message: String },

    /// 401/403 from either plane
    #[error("authentication failed (status: {status_code:?}): {message}")]
    Auth {
        message: String,
        status_code: Option<u16>,
    },

    /// Owner is neither a user nor an organization
    #[error("owner '{owner}' not found")]
    OwnerNotFound { owner: String },

    /// Package does not exist for the owner
    #[error("package '{package}' not found")]
    PackageNotFound { package: String },

    /// No version carries the requested id
    #[error("version {id} not found")]
    VersionNotFound { id: i64 },

    /// No version carries the requested digest or prefix
    #[error("digest '{digest}' not found")]
    DigestNotFound { digest: String },

    /// Registry has no manifest under the tag
    #[error("tag '{tag}' not found in registry (HTTP {status_code})")]
    TagNotFound { tag: String, status_code: u16 },

    /// A short digest prefix matches more than one version
    #[error("digest prefix '{prefix}' is ambiguous, {} candidates: {}", .candidates.len(), shown_candidates(.candidates))]
    AmbiguousDigest {
        prefix: String,
        candidates: Vec<String>,
    },

    /// The control plane and the registry disagree, or an invariant broke
    #[error("inconsistent state: {message}")]
    InconsistentState { message: String },

    /// Content does not hash to its declared digest
    #[error("corrupt content for {reference}: expected {expected}, computed {actual}")]
    CorruptManifest {
        reference: String,
        expected: String,
        actual: String,
    },

    /// Registry answered without a Docker-Content-Digest header
    #[error("registry returned no digest for manifest '{reference}'")]
    ManifestUnknown { reference: String },

    /// Registry rejected a pushed manifest
    #[error("manifest invalid: {message}")]
    ManifestInvalid { message: String },

    /// The tag did not resolve to the pushed digest after a re-tag
    #[error("tag '{tag}' resolves to {actual} after push, expected {expected}")]
    RetagVerification {
        tag: String,
        expected: String,
        actual: String,
    },

    /// Rate limit still in effect after retries
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<u64>,
    },

    /// Network errors, 5xx responses and timeouts
    #[error("transient error: {message}")]
    Transient {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation aborted by the cancellation handle
    #[error("operation cancelled")]
    Cancelled,

    /// Bad command-line input (package reference, selector flags)
    #[error("{message}")]
    Usage { message: String },

    /// Malformed data (digest strings, JSON bodies, headers)
    #[error("validation error: {message}")]
    Validation {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration file errors
    #[error("configuration error: {message}")]
    Config {
        message: String,
        path: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A wrapped error with a description of what was being attempted
    #[error("{message}: {source}")]
    Context {
        message: String,
        #[source]
        source: Box<GhcrError>,
    },
}

fn shown_candidates(candidates: &[String]) -> String {
    let mut shown = candidates
        .iter()
        .take(AMBIGUOUS_SHOWN)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    if candidates.len() > AMBIGUOUS_SHOWN {
        shown.push_str(&format!(", ... ({} more)", candidates.len() - AMBIGUOUS_SHOWN));
    }
    shown
}

/// Result type alias for ghcrctl operations
pub type Result<T> = std::result::Result<T, GhcrError>;

impl GhcrError {
    /// Creates a new authentication error.
    ///
    /// # Examples
    ///
    /// ```
    /// use libghcrctl::error::GhcrError;
    ///
    /// let err = GhcrError::auth("bad credentials", Some(401));
    /// assert_eq!(err.kind(), "Auth");
    /// ```
    pub fn auth<S: Into<String>>(message: S, status_code: Option<u16>) -> Self {
        Self::Auth {
            message: message.into(),
            status_code,
        }
    }

    /// Creates a new transient error.
    pub fn transient<S: Into<String>>(message: S) -> Self {
        Self::Transient {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new transient error with a source error.
    ///
    /// # Examples
    ///
    /// ```
    /// use libghcrctl::error::GhcrError;
    /// use std::io;
    ///
    /// let io_err = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
    /// let err = GhcrError::transient_with_source("connection dropped", io_err);
    /// assert!(err.is_retriable());
    /// ```
    pub fn transient_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transient {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new usage error.
    pub fn usage<S: Into<String>>(message: S) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }

    /// Creates a new validation error.
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new validation error with a source error.
    pub fn validation_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Validation {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new configuration error.
    pub fn config<S: Into<String>>(message: S, path: Option<S>) -> Self {
        Self::Config {
            message: message.into(),
            path: path.map(|p| p.into()),
            source: None,
        }
    }

    /// Creates a new configuration error with a source error.
    pub fn config_with_source<S, E>(message: S, path: Option<S>, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Config {
            message: message.into(),
            path: path.map(|p| p.into()),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new inconsistent state error.
    pub fn inconsistent<S: Into<String>>(message: S) -> Self {
        Self::InconsistentState {
            message: message.into(),
        }
    }

    /// Wraps this error with a description of the failed step.
    ///
    /// # Examples
    ///
    /// ```
    /// use libghcrctl::error::GhcrError;
    ///
    /// let err = GhcrError::TagNotFound { tag: "v1.0".into(), status_code: 404 }
    ///     .wrap("failed to resolve source tag 'v1.0'");
    /// assert_eq!(err.kind(), "TagNotFound");
    /// assert_eq!(
    ///     err.to_string(),
    ///     "failed to resolve source tag 'v1.0': tag 'v1.0' not found in registry (HTTP 404)"
    /// );
    /// ```
    pub fn wrap<S: Into<String>>(self, message: S) -> Self {
        Self::Context {
            message: message.into(),
            source: Box::new(self),
        }
    }

    /// Returns the innermost error, skipping context wrappers.
    pub fn root(&self) -> &GhcrError {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Returns the stable kind string for this error.
    pub fn kind(&self) -> &'static str {
        match self.root() {
            Self::NoCredentials { .. } => "NoCredentials",
            Self::Auth { .. } => "Auth",
            Self::OwnerNotFound { .. } => "OwnerNotFound",
            Self::PackageNotFound { .. } => "PackageNotFound",
            Self::VersionNotFound { .. } => "VersionNotFound",
            Self::DigestNotFound { .. } => "DigestNotFound",
            Self::TagNotFound { .. } => "TagNotFound",
            Self::AmbiguousDigest { .. } => "AmbiguousDigest",
            Self::InconsistentState { .. } => "InconsistentState",
            Self::CorruptManifest { .. } => "CorruptManifest",
            Self::ManifestUnknown { .. } => "ManifestUnknown",
            Self::ManifestInvalid { .. } => "ManifestInvalid",
            Self::RetagVerification { .. } => "RetagVerification",
            Self::RateLimited { .. } => "RateLimited",
            Self::Transient { .. } => "Transient",
            Self::Cancelled => "Cancelled",
            Self::Usage { .. } => "Usage",
            Self::Validation { .. } => "Validation",
            Self::Config { .. } => "Config",
            Self::Context { .. } => unreachable!("root() never returns a context wrapper"),
        }
    }

    /// Whether the caller may retry the operation unchanged.
    pub fn is_retriable(&self) -> bool {
        matches!(self.root(), Self::Transient { .. })
    }

    /// Process exit code for this error at the CLI boundary.
    pub fn exit_code(&self) -> u8 {
        match self.root() {
            Self::Usage { .. } => 2,
            Self::Cancelled => 130,
            _ => 1,
        }
    }
}

/// Adds [`GhcrError::wrap`] to results.
pub trait ResultExt<T> {
    /// Wraps the error, if any, with a lazily built message.
    fn context<S, F>(self, f: F) -> Result<T>
    where
        S: Into<String>,
        F: FnOnce() -> S;
}

impl<T> ResultExt<T> for Result<T> {
    fn context<S, F>(self, f: F) -> Result<T>
    where
        S: Into<String>,
        F: FnOnce() -> S,
    {
        self.map_err(|e| e.wrap(f()))
    }
}
