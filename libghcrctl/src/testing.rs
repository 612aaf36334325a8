//! In-memory stand-ins for both planes, shared by unit tests.

use crate::control::{OwnerKind, VersionLister, VersionRecord};
use crate::digest::{SHA256_PREFIX, sha256_digest};
use crate::error::{GhcrError, Result};
use crate::oci::{ImageConfiguration, ImageManifest, ManifestRef};
use crate::registry::{ManifestStore, TagLookup};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

pub fn record(id: i64, digest: &str, tags: &[&str], created_at: &str) -> VersionRecord {
    VersionRecord {
        id,
        digest: digest.to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        created_at: created_at.to_string(),
        updated_at: created_at.to_string(),
        media_type: String::new(),
        html_url: String::new(),
    }
}

/// `sha256:` followed by `c` repeated to 64 hex characters.
pub fn repeated_digest(c: char) -> String {
    format!("{}{}", SHA256_PREFIX, c.to_string().repeat(64))
}

pub fn image_manifest_json(config_digest: &str, marker: &str) -> String {
    format!(
        r#"{{"schemaVersion":2,"mediaType":"application/vnd.oci.image.manifest.v1+json","config":{{"mediaType":"application/vnd.oci.image.config.v1+json","size":10,"digest":"{}"}},"layers":[],"annotations":{{"marker":"{}"}}}}"#,
        config_digest, marker
    )
}

/// OCI index listing `children` as platform manifests.
pub fn index_manifest_json(children: &[&str]) -> String {
    let manifests: Vec<String> = children
        .iter()
        .map(|d| {
            format!(
                r#"{{"mediaType":"application/vnd.oci.image.manifest.v1+json","size":1,"digest":"{}"}}"#,
                d
            )
        })
        .collect();
    format!(
        r#"{{"schemaVersion":2,"mediaType":"application/vnd.oci.image.index.v1+json","manifests":[{}]}}"#,
        manifests.join(",")
    )
}

#[derive(Default)]
pub struct FakeRegistry {
    manifests: Mutex<HashMap<String, ManifestRef>>,
    tags: Mutex<HashMap<String, String>>,
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    /// Digest reported for pushes instead of the real one
    misreport_push: Mutex<Option<String>>,
    pub fetches: AtomicUsize,
    pub pushes: AtomicUsize,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a manifest and returns its digest.
    pub fn add_manifest(&self, raw: &str, media_type: &str) -> String {
        let manifest = ManifestRef::from_raw(raw.as_bytes().to_vec(), Some(media_type))
            .unwrap_or_else(|e| panic!("bad fixture manifest: {}", e));
        let digest = manifest.digest.clone();
        self.manifests
            .lock()
            .unwrap()
            .insert(digest.clone(), manifest);
        digest
    }

    pub fn add_blob(&self, bytes: &[u8]) -> String {
        let digest = sha256_digest(bytes);
        self.blobs
            .lock()
            .unwrap()
            .insert(digest.clone(), bytes.to_vec());
        digest
    }

    pub fn set_tag(&self, tag: &str, digest: &str) {
        self.tags
            .lock()
            .unwrap()
            .insert(tag.to_string(), digest.to_string());
    }

    pub fn tag(&self, tag: &str) -> Option<String> {
        self.tags.lock().unwrap().get(tag).cloned()
    }

    /// Makes the tag point at `digest` after every push.
    pub fn misreport_pushes_as(&self, digest: &str) {
        *self.misreport_push.lock().unwrap() = Some(digest.to_string());
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn push_count(&self) -> usize {
        self.pushes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TagLookup for FakeRegistry {
    async fn resolve_tag(&self, _image: &str, tag: &str) -> Result<String> {
        self.tag(tag).ok_or_else(|| GhcrError::TagNotFound {
            tag: tag.to_string(),
            status_code: 404,
        })
    }
}

#[async_trait]
impl ManifestStore for FakeRegistry {
    async fn fetch_manifest(&self, _image: &str, reference: &str) -> Result<ManifestRef> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let digest = if reference.starts_with(SHA256_PREFIX) {
            reference.to_string()
        } else {
            self.tag(reference).ok_or_else(|| GhcrError::TagNotFound {
                tag: reference.to_string(),
                status_code: 404,
            })?
        };
        let found = self.manifests.lock().unwrap().get(&digest).cloned();
        found.ok_or(GhcrError::DigestNotFound { digest })
    }

    async fn push_manifest(
        &self,
        _image: &str,
        tag: &str,
        raw: &[u8],
        media_type: &str,
    ) -> Result<String> {
        self.pushes.fetch_add(1, Ordering::SeqCst);
        let manifest = ManifestRef::from_raw(raw.to_vec(), Some(media_type))?;
        let digest = manifest.digest.clone();
        self.manifests
            .lock()
            .unwrap()
            .insert(digest.clone(), manifest);
        let pointed = self
            .misreport_push
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| digest.clone());
        self.set_tag(tag, &pointed);
        Ok(digest)
    }

    async fn fetch_config(
        &self,
        _image: &str,
        manifest: &ImageManifest,
    ) -> Result<ImageConfiguration> {
        let digest = manifest.config().digest().to_string();
        let bytes = self
            .blobs
            .lock()
            .unwrap()
            .get(&digest)
            .cloned()
            .ok_or_else(|| GhcrError::DigestNotFound {
                digest: digest.clone(),
            })?;
        serde_json::from_slice(&bytes)
            .map_err(|e| GhcrError::validation_with_source("bad config fixture", e))
    }
}

/// Control plane backed by a fixed listing.
pub struct FakeLister {
    pub kind: OwnerKind,
    pub versions: Mutex<Vec<VersionRecord>>,
    pub probes: AtomicUsize,
}

impl FakeLister {
    pub fn new(kind: OwnerKind, versions: Vec<VersionRecord>) -> Self {
        Self {
            kind,
            versions: Mutex::new(versions),
            probes: AtomicUsize::new(0),
        }
    }

    /// Moves `tag` onto the record with `digest`, as the forge does after a push.
    pub fn retag(&self, digest: &str, tag: &str) {
        let mut versions = self.versions.lock().unwrap();
        for v in versions.iter_mut() {
            v.tags.retain(|t| t != tag);
            if v.digest == digest {
                v.tags.push(tag.to_string());
            }
        }
    }
}

#[async_trait]
impl VersionLister for FakeLister {
    async fn owner_kind(&self, _owner: &str) -> Result<OwnerKind> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        Ok(self.kind)
    }

    async fn list_versions(
        &self,
        _owner: &str,
        kind: OwnerKind,
        package: &str,
    ) -> Result<Vec<VersionRecord>> {
        if kind != self.kind {
            return Err(GhcrError::PackageNotFound {
                package: package.to_string(),
            });
        }
        Ok(self.versions.lock().unwrap().clone())
    }
}
