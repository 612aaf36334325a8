//! Package discovery.
//!
//! Merges the control plane's version records with the manifest graph the
//! registry serves. Each digest becomes one [`VersionView`]; parent/child and
//! subject/attestation links are kept as digests in [`Discovery`].

use crate::control::VersionRecord;
use crate::digest::is_full_digest;
use crate::error::{GhcrError, Result};
use crate::oci::{ArtifactRole, ChildRef, ManifestRef};
use crate::registry::ManifestStore;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[cfg(test)]
mod tests;

/// Default bound on concurrent registry fetches.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// How much of the manifest graph to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoverFilter {
    /// Control-plane records only.
    Records,
    /// Every version's manifest, recursing into index children.
    Manifests,
    /// One digest's manifest tree plus every untagged version, to find
    /// manifests whose `subject` points at it.
    AttestationsFor(String),
    /// Like `Manifests`, plus config blobs of platform images.
    Full,
}

/// One digest in a package, as seen from both planes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionView {
    pub digest: String,
    /// `None` for a phantom: referenced by an index but not listed
    pub record: Option<VersionRecord>,
    #[serde(skip)]
    pub manifest: Option<ManifestRef>,
    pub children: Vec<ChildRef>,
    pub subject: Option<String>,
    pub role: ArtifactRole,
    pub platform: Option<String>,
}

impl VersionView {
    pub(crate) fn from_record(record: VersionRecord) -> Self {
        Self {
            digest: record.digest.clone(),
            record: Some(record),
            manifest: None,
            children: Vec::new(),
            subject: None,
            role: ArtifactRole::PlatformImage,
            platform: None,
        }
    }

    fn phantom(child: &ChildRef) -> Self {
        Self {
            digest: child.digest.clone(),
            record: None,
            manifest: None,
            children: Vec::new(),
            subject: None,
            role: child.role,
            platform: child.platform.clone(),
        }
    }

    /// True when the control plane does not list this digest.
    pub fn is_phantom(&self) -> bool {
        self.record.is_none()
    }

    /// Tags from the control-plane record; empty for phantoms.
    pub fn tags(&self) -> &[String] {
        self.record.as_ref().map(|r| r.tags.as_slice()).unwrap_or(&[])
    }

    /// Version id from the control-plane record.
    pub fn id(&self) -> Option<i64> {
        self.record.as_ref().map(|r| r.id)
    }
}

/// Result of discovering one package.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Discovery {
    /// Listed versions in listing order, then phantoms in discovery order
    pub views: Vec<VersionView>,
    /// Child digest to parent index digest
    pub parents: BTreeMap<String, String>,
    /// Subject digest to the digests of manifests attesting to it
    pub attestations: BTreeMap<String, Vec<String>>,
}

impl Discovery {
    /// Digest-keyed view of `views`.
    ///
    /// # Panics
    ///
    /// Panics if two views share a digest; the control plane never lists a
    /// digest twice for one package.
    pub fn to_map(&self) -> BTreeMap<&str, &VersionView> {
        let mut map = BTreeMap::new();
        for view in &self.views {
            if map.insert(view.digest.as_str(), view).is_some() {
                panic!("duplicate digest {} in discovery", view.digest);
            }
        }
        map
    }

    /// Records of non-phantom views.
    pub fn records(&self) -> Vec<&VersionRecord> {
        self.views.iter().filter_map(|v| v.record.as_ref()).collect()
    }

    /// Looks up a view by digest, ignoring hex case.
    pub fn get(&self, digest: &str) -> Option<&VersionView> {
        self.views
            .iter()
            .find(|v| v.digest.eq_ignore_ascii_case(digest))
    }

    /// Parent index of `digest`, if any.
    pub fn parent_of(&self, digest: &str) -> Option<&str> {
        self.parents
            .get(&digest.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Digests attesting to `digest`.
    pub fn attestations_of(&self, digest: &str) -> &[String] {
        self.attestations
            .get(&digest.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Builds the views of one package.
///
/// Records whose digest is empty or malformed are dropped with a warning.
/// Manifests are fetched level by level with at most `concurrency` requests
/// in flight. A manifest the registry no longer has is logged and skipped.
pub async fn discover_package<S>(
    store: &S,
    image: &str,
    versions: Vec<VersionRecord>,
    filter: &DiscoverFilter,
    concurrency: usize,
) -> Result<Discovery>
where
    S: ManifestStore + ?Sized,
{
    let concurrency = concurrency.max(1);
    let mut views: Vec<VersionView> = Vec::with_capacity(versions.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for mut record in versions {
        let digest = record.digest.trim().to_ascii_lowercase();
        if !is_full_digest(&digest) {
            tracing::warn!(id = record.id, digest = %record.digest, "dropping version with malformed digest");
            continue;
        }
        record.digest = digest.clone();
        index.insert(digest, views.len());
        views.push(VersionView::from_record(record));
    }

    let mut frontier: BTreeSet<String> = match filter {
        DiscoverFilter::Records => BTreeSet::new(),
        DiscoverFilter::Manifests | DiscoverFilter::Full => {
            views.iter().map(|v| v.digest.clone()).collect()
        }
        DiscoverFilter::AttestationsFor(target) => {
            let mut set: BTreeSet<String> = views
                .iter()
                .filter(|v| v.tags().is_empty())
                .map(|v| v.digest.clone())
                .collect();
            set.insert(target.trim().to_ascii_lowercase());
            set
        }
    };

    let mut parents = BTreeMap::new();
    let mut attestations: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut fetched: BTreeSet<String> = BTreeSet::new();

    while !frontier.is_empty() {
        fetched.extend(frontier.iter().cloned());
        tracing::debug!(image = %image, count = frontier.len(), "fetching manifests");

        let mut results: Vec<(String, Result<ManifestRef>)> = stream::iter(frontier)
            .map(|digest| async move {
                let result = store.fetch_manifest(image, &digest).await;
                (digest, result)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;
        results.sort_by(|a, b| a.0.cmp(&b.0));

        let mut next = BTreeSet::new();
        for (digest, result) in results {
            let manifest = match result {
                Ok(manifest) => manifest,
                Err(GhcrError::DigestNotFound { .. }) => {
                    tracing::warn!(digest = %digest, "manifest missing from registry");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let (children, subject, role) = match manifest.parse() {
                Ok(parsed) => (parsed.children(), parsed.subject(), parsed.role()),
                Err(e) => {
                    tracing::warn!(digest = %digest, error = %e, "unparseable manifest");
                    (Vec::new(), None, ArtifactRole::PlatformImage)
                }
            };

            for child in &children {
                let child_digest = child.digest.to_ascii_lowercase();
                parents.insert(child_digest.clone(), digest.clone());

                if let Some(described) = &child.refers_to
                    && child.role != ArtifactRole::PlatformImage
                {
                    attestations
                        .entry(described.clone())
                        .or_default()
                        .push(child_digest.clone());
                }

                match index.get(&child_digest) {
                    Some(&i) => {
                        views[i].role = child.role;
                        if views[i].platform.is_none() {
                            views[i].platform = child.platform.clone();
                        }
                    }
                    None => {
                        index.insert(child_digest.clone(), views.len());
                        views.push(VersionView::phantom(child));
                    }
                }

                if !fetched.contains(&child_digest) {
                    next.insert(child_digest);
                }
            }

            if let Some(subject) = &subject {
                attestations
                    .entry(subject.to_ascii_lowercase())
                    .or_default()
                    .push(digest.clone());
            }

            let i = match index.get(&digest) {
                Some(&i) => i,
                None => {
                    // Fetched by request (attestation target) without a record.
                    index.insert(digest.clone(), views.len());
                    views.push(VersionView {
                        digest: digest.clone(),
                        record: None,
                        manifest: None,
                        children: Vec::new(),
                        subject: None,
                        role,
                        platform: None,
                    });
                    views.len() - 1
                }
            };
            let view = &mut views[i];
            view.children = children;
            if subject.is_some() || role != ArtifactRole::PlatformImage {
                view.role = role;
            }
            view.subject = subject;
            view.manifest = Some(manifest);
        }

        frontier = next;
    }

    if *filter == DiscoverFilter::Full {
        fill_platforms(store, image, &mut views, concurrency).await?;
    }

    for digests in attestations.values_mut() {
        digests.sort();
        digests.dedup();
    }

    Ok(Discovery {
        views,
        parents,
        attestations,
    })
}

/// Sets `platform` from config blobs for single-platform images lacking one.
async fn fill_platforms<S>(
    store: &S,
    image: &str,
    views: &mut [VersionView],
    concurrency: usize,
) -> Result<()>
where
    S: ManifestStore + ?Sized,
{
    let wanted: Vec<(usize, crate::oci::ImageManifest)> = views
        .iter()
        .enumerate()
        .filter(|(_, v)| v.platform.is_none() && v.role == ArtifactRole::PlatformImage)
        .filter_map(|(i, v)| {
            let parsed = v.manifest.as_ref()?.parse().ok()?;
            parsed.as_manifest().cloned().map(|m| (i, m))
        })
        .collect();

    let results: Vec<(usize, Result<crate::oci::ImageConfiguration>)> = stream::iter(wanted)
        .map(|(i, manifest)| async move { (i, store.fetch_config(image, &manifest).await) })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    for (i, result) in results {
        match result {
            Ok(config) => {
                let platform = match config.variant() {
                    Some(variant) => format!(
                        "{}/{}/{}",
                        config.os(),
                        config.architecture(),
                        variant
                    ),
                    None => format!("{}/{}", config.os(), config.architecture()),
                };
                views[i].platform = Some(platform);
            }
            Err(GhcrError::Cancelled) => return Err(GhcrError::Cancelled),
            Err(e) => {
                tracing::warn!(digest = %views[i].digest, error = %e, "could not read image config");
            }
        }
    }

    Ok(())
}
