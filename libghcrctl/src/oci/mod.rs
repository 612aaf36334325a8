//! OCI data structures and manifest relationships.
//!
//! This module re-exports the manifest models from the `oci-spec` crate and
//! adds what the discoverer needs on top of them: the four manifest media
//! types the registry serves, raw manifest bytes with their digest, and the
//! roles of the manifests an index or a `subject` field points at.

pub use oci_spec::image::{Descriptor, ImageConfiguration, ImageIndex, ImageManifest, Platform};

use crate::digest::sha256_digest;
use crate::error::{GhcrError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;


/// Docker image manifest, schema 2.
pub const DOCKER_MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";
/// Docker manifest list (multi-arch), schema 2.
pub const DOCKER_MANIFEST_LIST_V2: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";
/// OCI image manifest.
pub const OCI_MANIFEST_V1: &str = "application/vnd.oci.image.manifest.v1+json";
/// OCI image index.
pub const OCI_INDEX_V1: &str = "application/vnd.oci.image.index.v1+json";

/// `Accept` header value sent with every manifest request.
pub const MANIFEST_ACCEPT: &str = "application/vnd.oci.image.manifest.v1+json, \
     application/vnd.oci.image.index.v1+json, \
     application/vnd.docker.distribution.manifest.v2+json, \
     application/vnd.docker.distribution.manifest.list.v2+json";

/// Annotations buildx puts on attestation descriptors inside an index.
const DOCKER_REFERENCE_TYPE: &str = "vnd.docker.reference.type";
const DOCKER_REFERENCE_DIGEST: &str = "vnd.docker.reference.digest";

/// The manifest media types a version can be stored as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediaKind {
    DockerManifest,
    DockerManifestList,
    OciManifest,
    OciIndex,
}

impl MediaKind {
    /// Maps a media type string (possibly with parameters) to a kind.
    pub fn from_media_type(media_type: &str) -> Option<Self> {
        let essence = media_type.split(';').next().unwrap_or("").trim();
        match essence {
            DOCKER_MANIFEST_V2 => Some(Self::DockerManifest),
            DOCKER_MANIFEST_LIST_V2 => Some(Self::DockerManifestList),
            OCI_MANIFEST_V1 => Some(Self::OciManifest),
            OCI_INDEX_V1 => Some(Self::OciIndex),
            _ => None,
        }
    }

    /// The canonical media type string for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DockerManifest => DOCKER_MANIFEST_V2,
            Self::DockerManifestList => DOCKER_MANIFEST_LIST_V2,
            Self::OciManifest => OCI_MANIFEST_V1,
            Self::OciIndex => OCI_INDEX_V1,
        }
    }

    /// True for manifest lists and indexes.
    pub fn is_index(&self) -> bool {
        matches!(self, Self::DockerManifestList | Self::OciIndex)
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a manifest is for, relative to the version it hangs off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactRole {
    PlatformImage,
    Attestation,
    Sbom,
    Signature,
}

impl ArtifactRole {
    /// Infers a role from an `artifactType` (or artifact config media type).
    ///
    /// # Examples
    ///
    /// ```
    /// use libghcrctl::oci::ArtifactRole;
    ///
    /// assert_eq!(ArtifactRole::from_artifact_type("application/spdx+json"), ArtifactRole::Sbom);
    /// assert_eq!(
    ///     ArtifactRole::from_artifact_type("application/vnd.dev.cosign.artifact.sig.v1+json"),
    ///     ArtifactRole::Signature
    /// );
    /// ```
    pub fn from_artifact_type(artifact_type: &str) -> Self {
        let t = artifact_type.to_ascii_lowercase();
        if t.contains("sbom") || t.contains("spdx") || t.contains("cyclonedx") {
            Self::Sbom
        } else if t.contains("signature") || t.contains("cosign") || t.contains(".sig") {
            Self::Signature
        } else {
            Self::Attestation
        }
    }

    fn from_descriptor(desc: &Descriptor) -> Self {
        let docker_attestation = desc.annotations().as_ref().is_some_and(|a| {
            a.get(DOCKER_REFERENCE_TYPE)
                .is_some_and(|v| v == "attestation-manifest")
        });
        if docker_attestation {
            return Self::Attestation;
        }
        match desc.artifact_type() {
            Some(t) => Self::from_artifact_type(&t.to_string()),
            None => Self::PlatformImage,
        }
    }
}

impl fmt::Display for ArtifactRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PlatformImage => "platform-image",
            Self::Attestation => "attestation",
            Self::Sbom => "sbom",
            Self::Signature => "signature",
        };
        f.write_str(s)
    }
}

/// A manifest referenced by an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChildRef {
    /// Digest of the child manifest
    pub digest: String,
    /// Role inferred from the descriptor
    pub role: ArtifactRole,
    /// `os/arch[/variant]` when the descriptor carries a platform
    pub platform: Option<String>,
    /// Sibling manifest an attestation describes (`vnd.docker.reference.digest`)
    pub refers_to: Option<String>,
}

/// Represents either a single-platform image manifest or a multi-platform image index.
#[derive(Debug, Clone)]
#[allow(clippy::large_enum_variant)]
pub enum ManifestOrIndex {
    /// A single-platform image manifest
    Manifest(ImageManifest),
    /// A multi-platform image index
    Index(ImageIndex),
}

impl ManifestOrIndex {
    /// Parse manifest bytes, automatically detecting whether it's a Manifest or Index.
    ///
    /// The `mediaType` field decides when present; otherwise the shape of the
    /// document does (`manifests` means index, `layers`/`config` means manifest).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_slice(bytes)
            .map_err(|e| GhcrError::validation_with_source("Failed to parse manifest JSON", e))?;

        let media_type = value
            .get("mediaType")
            .and_then(|v| v.as_str())
            .unwrap_or("");

        let is_index = if media_type.contains("index") || media_type.contains("list") {
            true
        } else if media_type.contains("manifest") {
            false
        } else if value.get("manifests").is_some() {
            true
        } else if value.get("layers").is_some() || value.get("config").is_some() {
            false
        } else {
            return Err(GhcrError::validation(
                "Unable to determine if content is a manifest or index",
            ));
        };

        if is_index {
            let index: ImageIndex = serde_json::from_slice(bytes).map_err(|e| {
                GhcrError::validation_with_source("Failed to parse image index", e)
            })?;
            Ok(ManifestOrIndex::Index(index))
        } else {
            let manifest: ImageManifest = serde_json::from_slice(bytes).map_err(|e| {
                GhcrError::validation_with_source("Failed to parse image manifest", e)
            })?;
            Ok(ManifestOrIndex::Manifest(manifest))
        }
    }

    /// Returns true if this is a multi-platform index.
    pub fn is_index(&self) -> bool {
        matches!(self, ManifestOrIndex::Index(_))
    }

    /// Returns the manifest if this is a single-platform image.
    pub fn as_manifest(&self) -> Option<&ImageManifest> {
        match self {
            ManifestOrIndex::Manifest(m) => Some(m),
            ManifestOrIndex::Index(_) => None,
        }
    }

    /// Children of an index with their inferred roles. Empty for manifests.
    pub fn children(&self) -> Vec<ChildRef> {
        match self {
            ManifestOrIndex::Manifest(_) => vec![],
            ManifestOrIndex::Index(index) => index
                .manifests()
                .iter()
                .map(|desc| ChildRef {
                    digest: desc.digest().to_string(),
                    role: ArtifactRole::from_descriptor(desc),
                    platform: desc.platform().as_ref().map(platform_string),
                    refers_to: desc
                        .annotations()
                        .as_ref()
                        .and_then(|a| a.get(DOCKER_REFERENCE_DIGEST))
                        .map(|d| d.to_ascii_lowercase()),
                })
                .collect(),
        }
    }

    /// Digest of the manifest this one attests to, if it has a `subject`.
    pub fn subject(&self) -> Option<String> {
        match self {
            ManifestOrIndex::Manifest(m) => m.subject().as_ref().map(|s| s.digest().to_string()),
            ManifestOrIndex::Index(i) => i.subject().as_ref().map(|s| s.digest().to_string()),
        }
    }

    /// Role of the manifest itself.
    ///
    /// Manifests with an `artifactType` or a `subject` are artifacts; the
    /// type (or, failing that, the config media type) picks the role.
    pub fn role(&self) -> ArtifactRole {
        match self {
            ManifestOrIndex::Index(_) => ArtifactRole::PlatformImage,
            ManifestOrIndex::Manifest(m) => match (m.artifact_type(), m.subject()) {
                (Some(t), _) => ArtifactRole::from_artifact_type(&t.to_string()),
                (None, Some(_)) => {
                    ArtifactRole::from_artifact_type(&m.config().media_type().to_string())
                }
                (None, None) => ArtifactRole::PlatformImage,
            },
        }
    }
}

/// Formats a platform as `os/arch[/variant]`.
pub fn platform_string(platform: &Platform) -> String {
    match platform.variant() {
        Some(variant) => format!(
            "{}/{}/{}",
            platform.os(),
            platform.architecture(),
            variant
        ),
        None => format!("{}/{}", platform.os(), platform.architecture()),
    }
}

/// Manifest bytes as stored by the registry, with their digest.
///
/// `raw` is never reserialized: pushing it back yields the same digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRef {
    /// `sha256:` digest of `raw`
    pub digest: String,
    /// Media type exactly as served (used verbatim when re-pushing)
    pub media_type: String,
    /// Parsed media kind
    pub kind: MediaKind,
    /// Size of `raw` in bytes
    pub size: u64,
    /// Manifest bytes
    pub raw: Vec<u8>,
}

impl ManifestRef {
    /// Builds a manifest reference from raw bytes.
    ///
    /// The media type comes from `content_type` when it names a manifest
    /// kind, else from the document's `mediaType`, else from its shape.
    pub fn from_raw(raw: Vec<u8>, content_type: Option<&str>) -> Result<Self> {
        let kind_from_header = content_type.and_then(MediaKind::from_media_type);
        let (media_type, kind) = match (content_type, kind_from_header) {
            (Some(ct), Some(kind)) => (ct.to_string(), kind),
            _ => {
                let value: serde_json::Value = serde_json::from_slice(&raw).map_err(|e| {
                    GhcrError::validation_with_source("Failed to parse manifest JSON", e)
                })?;
                let declared = value.get("mediaType").and_then(|v| v.as_str());
                match declared.and_then(MediaKind::from_media_type) {
                    Some(kind) => (declared.unwrap_or(kind.as_str()).to_string(), kind),
                    None if value.get("manifests").is_some() => {
                        (OCI_INDEX_V1.to_string(), MediaKind::OciIndex)
                    }
                    None => (OCI_MANIFEST_V1.to_string(), MediaKind::OciManifest),
                }
            }
        };

        Ok(Self {
            digest: sha256_digest(&raw),
            media_type,
            kind,
            size: raw.len() as u64,
            raw,
        })
    }

    /// Parses the raw bytes into a manifest or index.
    pub fn parse(&self) -> Result<ManifestOrIndex> {
        ManifestOrIndex::from_bytes(&self.raw)
    }
}
