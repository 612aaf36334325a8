//! Selector resolution.
//!
//! Collapses a tag, full digest, short digest prefix or numeric version id
//! into one canonical digest. The local step is pure; only a tag the
//! listing does not know goes to the registry.

use crate::digest::{SHA256_PREFIX, digests_equal, is_full_digest, normalize_prefix};
use crate::discover::VersionView;
use crate::error::{GhcrError, Result};
use crate::registry::TagLookup;
use std::fmt;


/// Shortest digest prefix accepted from the command line.
pub const MIN_PREFIX_LEN: usize = 4;

/// Identifies one version of a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    ByTag(String),
    /// Full `sha256:` digest or bare hex prefix
    ByDigest(String),
    ByVersionId(i64),
}

impl Selector {
    /// Builds a selector from mutually exclusive command-line flags.
    ///
    /// Exactly one flag must be set, and digest prefixes must carry at least
    /// [`MIN_PREFIX_LEN`] hex characters.
    ///
    /// # Examples
    ///
    /// ```
    /// use libghcrctl::Selector;
    ///
    /// let selector = Selector::from_flags(None, Some("abcd"), None).unwrap();
    /// assert_eq!(selector, Selector::ByDigest("abcd".to_string()));
    ///
    /// let err = Selector::from_flags(None, None, None).unwrap_err();
    /// assert!(err.to_string().contains("selector required"));
    /// ```
    pub fn from_flags(tag: Option<&str>, digest: Option<&str>, version: Option<i64>) -> Result<Self> {
        match (tag, digest, version) {
            (None, None, None) => Err(GhcrError::usage(
                "selector required: pass exactly one of --tag, --digest or --version",
            )),
            (Some(tag), None, None) => {
                let tag = tag.trim();
                if tag.is_empty() {
                    return Err(GhcrError::usage("--tag cannot be empty"));
                }
                Ok(Self::ByTag(tag.to_string()))
            }
            (None, Some(digest), None) => {
                let digest = digest.trim();
                if !is_full_digest(&digest.to_ascii_lowercase()) {
                    let prefix = normalize_prefix(digest).map_err(|e| {
                        GhcrError::usage(format!("invalid --digest '{}': {}", digest, e))
                    })?;
                    if prefix.len() < MIN_PREFIX_LEN {
                        return Err(GhcrError::usage(format!(
                            "digest prefix '{}' is too short: at least {} hex characters required",
                            digest, MIN_PREFIX_LEN
                        )));
                    }
                }
                Ok(Self::ByDigest(digest.to_string()))
            }
            (None, None, Some(id)) => Ok(Self::ByVersionId(id)),
            _ => Err(GhcrError::usage(
                "conflicting selectors: pass only one of --tag, --digest or --version",
            )),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ByTag(tag) => write!(f, "tag '{}'", tag),
            Self::ByDigest(digest) => write!(f, "digest '{}'", digest),
            Self::ByVersionId(id) => write!(f, "version {}", id),
        }
    }
}

/// Outcome of resolving against the listing alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The canonical digest
    Digest(String),
    /// The tag is unknown locally; ask the registry
    NeedsRegistry(String),
}

/// Resolves `selector` against `views` without network access.
pub fn resolve_local(selector: &Selector, views: &[VersionView]) -> Result<Resolution> {
    match selector {
        Selector::ByTag(tag) => {
            let claiming: Vec<&VersionView> = views
                .iter()
                .filter(|v| v.tags().iter().any(|t| t == tag))
                .collect();
            match claiming.as_slice() {
                [] => Ok(Resolution::NeedsRegistry(tag.clone())),
                [view] => Ok(Resolution::Digest(view.digest.clone())),
                many => Err(GhcrError::inconsistent(format!(
                    "tag '{}' is claimed by {} versions: {}",
                    tag,
                    many.len(),
                    many.iter()
                        .map(|v| describe(v))
                        .collect::<Vec<_>>()
                        .join(", ")
                ))),
            }
        }
        Selector::ByDigest(digest) => resolve_digest(digest, views).map(Resolution::Digest),
        Selector::ByVersionId(id) => views
            .iter()
            .find(|v| v.id() == Some(*id))
            .map(|v| Resolution::Digest(v.digest.clone()))
            .ok_or(GhcrError::VersionNotFound { id: *id }),
    }
}

fn describe(view: &VersionView) -> String {
    match view.id() {
        Some(id) => format!("{} (id {})", view.digest, id),
        None => view.digest.clone(),
    }
}

fn resolve_digest(digest: &str, views: &[VersionView]) -> Result<String> {
    let trimmed = digest.trim();
    if is_full_digest(&trimmed.to_ascii_lowercase()) {
        return views
            .iter()
            .find(|v| digests_equal(&v.digest, trimmed))
            .map(|v| v.digest.clone())
            .ok_or_else(|| GhcrError::DigestNotFound {
                digest: trimmed.to_string(),
            });
    }

    let prefix = normalize_prefix(trimmed)?;
    let mut candidates: Vec<String> = views
        .iter()
        .filter(|v| {
            v.digest
                .strip_prefix(SHA256_PREFIX)
                .is_some_and(|hex| hex.to_ascii_lowercase().starts_with(&prefix))
        })
        .map(|v| v.digest.clone())
        .collect();
    candidates.sort();
    candidates.dedup();

    match candidates.len() {
        0 => Err(GhcrError::DigestNotFound {
            digest: trimmed.to_string(),
        }),
        1 => Ok(candidates.remove(0)),
        _ => Err(GhcrError::AmbiguousDigest {
            prefix: trimmed.to_string(),
            candidates,
        }),
    }
}

/// Resolves `selector` to a canonical digest.
///
/// Tags unknown to the listing are looked up on the registry, which is
/// authoritative for tags.
pub async fn resolve<L>(
    selector: &Selector,
    views: &[VersionView],
    image: &str,
    registry: &L,
) -> Result<String>
where
    L: TagLookup + ?Sized,
{
    match resolve_local(selector, views)? {
        Resolution::Digest(digest) => Ok(digest),
        Resolution::NeedsRegistry(tag) => {
            tracing::debug!(tag = %tag, image = %image, "tag not in listing, asking registry");
            registry.resolve_tag(image, &tag).await
        }
    }
}
