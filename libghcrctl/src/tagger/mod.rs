//! Tag mutation.
//!
//! Adding a tag re-pushes the source manifest's exact bytes under the new
//! tag, so the registry stores the same digest and no content changes.

use crate::digest::digests_equal;
use crate::error::{GhcrError, Result, ResultExt};
use crate::registry::ManifestStore;
use async_trait::async_trait;
use serde::Serialize;


/// Longest tag the distribution API accepts.
pub const MAX_TAG_LEN: usize = 128;

/// Checks `tag` against the OCI tag grammar `[A-Za-z0-9_][A-Za-z0-9._-]{0,127}`.
pub fn validate_tag(tag: &str) -> Result<()> {
    let mut chars = tag.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphanumeric() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
                && tag.len() <= MAX_TAG_LEN
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(GhcrError::usage(format!(
            "invalid tag '{}': must match [A-Za-z0-9_][A-Za-z0-9._-]{{0,127}}",
            tag
        )))
    }
}

/// What an added tag points at, and what it pointed at before.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagOutcome {
    pub digest: String,
    /// Digest the tag pointed at before the push, if it existed
    pub previous: Option<String>,
}

impl TagOutcome {
    /// True when the tag existed and pointed at a different digest.
    pub fn moved(&self) -> bool {
        self.previous
            .as_deref()
            .is_some_and(|p| !digests_equal(p, &self.digest))
    }

    /// True when the tag already pointed at the digest.
    pub fn unchanged(&self) -> bool {
        self.previous
            .as_deref()
            .is_some_and(|p| digests_equal(p, &self.digest))
    }
}

/// Adds tags to existing manifests.
#[async_trait]
pub trait TagAdder: Send + Sync {
    async fn add_tag(&self, image: &str, source_digest: &str, new_tag: &str) -> Result<TagOutcome>;
}

/// [`TagAdder`] over any [`ManifestStore`].
pub struct TagMutator<'a, S: ManifestStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: ManifestStore + ?Sized> TagMutator<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: ManifestStore + ?Sized> TagAdder for TagMutator<'_, S> {
    /// Points `new_tag` at `source_digest`.
    ///
    /// The steps run strictly in order: probe the tag, fetch the source
    /// manifest, push its bytes under the tag, then verify the tag resolves
    /// to the source digest. Re-running with the same arguments is a no-op
    /// on the registry.
    async fn add_tag(&self, image: &str, source_digest: &str, new_tag: &str) -> Result<TagOutcome> {
        let previous = match self.store.resolve_tag(image, new_tag).await {
            Ok(digest) => Some(digest),
            Err(GhcrError::TagNotFound { .. }) => None,
            Err(e) => return Err(e.wrap(format!("failed to probe tag '{}'", new_tag))),
        };

        let manifest = self
            .store
            .fetch_manifest(image, source_digest)
            .await
            .context(|| format!("failed to fetch source manifest {}", source_digest))?;

        if let Some(previous) = &previous
            && !digests_equal(previous, &manifest.digest)
        {
            tracing::warn!(
                image = %image,
                tag = %new_tag,
                from = %previous,
                to = %manifest.digest,
                "moving existing tag"
            );
        }

        tracing::info!(image = %image, tag = %new_tag, digest = %manifest.digest, "adding tag");
        self.store
            .push_manifest(image, new_tag, &manifest.raw, &manifest.media_type)
            .await
            .context(|| format!("failed to push tag '{}'", new_tag))?;

        let actual = self
            .store
            .resolve_tag(image, new_tag)
            .await
            .context(|| format!("failed to verify tag '{}'", new_tag))?;
        if !digests_equal(&actual, &manifest.digest) {
            return Err(GhcrError::RetagVerification {
                tag: new_tag.to_string(),
                expected: manifest.digest,
                actual,
            });
        }

        Ok(TagOutcome {
            digest: manifest.digest,
            previous,
        })
    }
}
