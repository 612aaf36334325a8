use super::*;
use crate::oci::{OCI_INDEX_V1, OCI_MANIFEST_V1};
use crate::testing::{FakeRegistry, image_manifest_json, record, repeated_digest};

const IMAGE: &str = "octo/app";

/// Multi-arch index with two platform images and one buildx attestation.
struct MultiArch {
    registry: FakeRegistry,
    index: String,
    amd64: String,
    arm64: String,
    attestation: String,
}

fn multi_arch() -> MultiArch {
    let registry = FakeRegistry::new();
    let amd64_config = registry.add_blob(
        br#"{"architecture":"amd64","os":"linux","rootfs":{"type":"layers","diff_ids":[]}}"#,
    );
    let arm64_config = registry.add_blob(
        br#"{"architecture":"arm64","os":"linux","variant":"v8","rootfs":{"type":"layers","diff_ids":[]}}"#,
    );
    let amd64 = registry.add_manifest(&image_manifest_json(&amd64_config, "amd64"), OCI_MANIFEST_V1);
    let arm64 = registry.add_manifest(&image_manifest_json(&arm64_config, "arm64"), OCI_MANIFEST_V1);
    let attestation =
        registry.add_manifest(&image_manifest_json(&amd64_config, "attestation"), OCI_MANIFEST_V1);

    let index_json = format!(
        r#"{{"schemaVersion":2,"mediaType":"application/vnd.oci.image.index.v1+json","manifests":[
            {{"mediaType":"application/vnd.oci.image.manifest.v1+json","size":1,"digest":"{amd64}","platform":{{"architecture":"amd64","os":"linux"}}}},
            {{"mediaType":"application/vnd.oci.image.manifest.v1+json","size":1,"digest":"{arm64}"}},
            {{"mediaType":"application/vnd.oci.image.manifest.v1+json","size":1,"digest":"{attestation}",
              "annotations":{{"vnd.docker.reference.digest":"{amd64}","vnd.docker.reference.type":"attestation-manifest"}}}}
        ]}}"#
    );
    let index = registry.add_manifest(&index_json, OCI_INDEX_V1);
    registry.set_tag("v1.0.0", &index);

    MultiArch {
        registry,
        index,
        amd64,
        arm64,
        attestation,
    }
}

#[tokio::test]
async fn test_records_filter_fetches_nothing() {
    let registry = FakeRegistry::new();
    let versions = vec![
        record(1, &repeated_digest('a'), &["v1"], "2025-01-15T10:00:00Z"),
        record(2, &repeated_digest('b'), &[], "2025-01-10T10:00:00Z"),
    ];

    let discovery = discover_package(&registry, IMAGE, versions, &DiscoverFilter::Records, 8)
        .await
        .unwrap();

    assert_eq!(registry.fetch_count(), 0);
    assert_eq!(discovery.views.len(), 2);
    assert_eq!(discovery.records().len(), 2);
    assert!(discovery.views.iter().all(|v| v.manifest.is_none()));
}

#[tokio::test]
async fn test_malformed_digests_are_dropped() {
    let registry = FakeRegistry::new();
    let versions = vec![
        record(1, "", &[], "2025-01-01T00:00:00Z"),
        record(2, "sha256:nothex", &[], "2025-01-01T00:00:00Z"),
        record(3, &repeated_digest('c').to_uppercase().replacen("SHA256", "sha256", 1), &[], "2025-01-01T00:00:00Z"),
    ];

    let discovery = discover_package(&registry, IMAGE, versions, &DiscoverFilter::Records, 8)
        .await
        .unwrap();

    assert_eq!(discovery.views.len(), 1);
    assert_eq!(discovery.views[0].id(), Some(3));
    // Digests are normalized to lowercase.
    assert_eq!(discovery.views[0].digest, repeated_digest('c'));
}

#[tokio::test]
async fn test_manifests_filter_links_children_and_phantoms() {
    let fixture = multi_arch();
    // The listing knows the index and amd64 image, but not arm64 or the attestation.
    let versions = vec![
        record(10, &fixture.index, &["v1.0.0"], "2025-01-15T10:00:00Z"),
        record(11, &fixture.amd64, &[], "2025-01-15T10:00:00Z"),
    ];

    let discovery = discover_package(
        &fixture.registry,
        IMAGE,
        versions,
        &DiscoverFilter::Manifests,
        2,
    )
    .await
    .unwrap();

    assert_eq!(discovery.views.len(), 4);
    assert_eq!(discovery.records().len(), 2);

    let index = discovery.get(&fixture.index).unwrap();
    assert_eq!(index.children.len(), 3);
    assert!(index.manifest.as_ref().unwrap().kind.is_index());

    let arm64 = discovery.get(&fixture.arm64).unwrap();
    assert!(arm64.is_phantom());
    assert!(arm64.manifest.is_some());
    assert!(arm64.tags().is_empty());

    let amd64 = discovery.get(&fixture.amd64).unwrap();
    assert_eq!(amd64.platform.as_deref(), Some("linux/amd64"));
    assert_eq!(amd64.role, ArtifactRole::PlatformImage);

    let attestation = discovery.get(&fixture.attestation).unwrap();
    assert_eq!(attestation.role, ArtifactRole::Attestation);

    assert_eq!(discovery.parent_of(&fixture.arm64), Some(fixture.index.as_str()));
    assert_eq!(discovery.parent_of(&fixture.index), None);
    assert_eq!(discovery.attestations_of(&fixture.amd64), &[fixture.attestation.clone()]);

    let map = discovery.to_map();
    assert_eq!(map.len(), 4);
    // Each manifest is fetched once.
    assert_eq!(fixture.registry.fetch_count(), 4);
}

#[tokio::test]
async fn test_full_filter_reads_platform_from_config() {
    let fixture = multi_arch();
    let versions = vec![record(10, &fixture.index, &["v1.0.0"], "2025-01-15T10:00:00Z")];

    let discovery =
        discover_package(&fixture.registry, IMAGE, versions, &DiscoverFilter::Full, 8)
            .await
            .unwrap();

    // The index descriptor names no platform for arm64; the config does.
    let arm64 = discovery.get(&fixture.arm64).unwrap();
    assert_eq!(arm64.platform.as_deref(), Some("linux/arm64/v8"));
    let amd64 = discovery.get(&fixture.amd64).unwrap();
    assert_eq!(amd64.platform.as_deref(), Some("linux/amd64"));
}

#[tokio::test]
async fn test_attestations_for_finds_subject_referrers() {
    let registry = FakeRegistry::new();
    let config = registry.add_blob(b"{}");
    let image = registry.add_manifest(&image_manifest_json(&config, "image"), OCI_MANIFEST_V1);
    let other = registry.add_manifest(&image_manifest_json(&config, "other"), OCI_MANIFEST_V1);
    let sbom_json = format!(
        r#"{{"schemaVersion":2,"mediaType":"application/vnd.oci.image.manifest.v1+json","artifactType":"application/spdx+json","config":{{"mediaType":"application/vnd.oci.empty.v1+json","size":2,"digest":"{config}"}},"layers":[],"subject":{{"mediaType":"application/vnd.oci.image.manifest.v1+json","size":1,"digest":"{image}"}}}}"#
    );
    let sbom = registry.add_manifest(&sbom_json, OCI_MANIFEST_V1);

    let versions = vec![
        record(1, &image, &["v1"], "2025-01-15T10:00:00Z"),
        record(2, &sbom, &[], "2025-01-15T10:00:01Z"),
        record(3, &other, &["v0"], "2025-01-10T10:00:00Z"),
    ];

    let discovery = discover_package(
        &registry,
        IMAGE,
        versions,
        &DiscoverFilter::AttestationsFor(image.clone()),
        8,
    )
    .await
    .unwrap();

    // The target and the untagged version are fetched; the tagged `other` is not.
    assert_eq!(registry.fetch_count(), 2);
    assert_eq!(discovery.attestations_of(&image), &[sbom.clone()]);
    let sbom_view = discovery.get(&sbom).unwrap();
    assert_eq!(sbom_view.subject.as_deref(), Some(image.as_str()));
    assert_eq!(sbom_view.role, ArtifactRole::Sbom);
    assert!(discovery.get(&other).unwrap().manifest.is_none());
}

#[tokio::test]
async fn test_missing_manifest_is_skipped() {
    let registry = FakeRegistry::new();
    let versions = vec![record(1, &repeated_digest('d'), &[], "2025-01-01T00:00:00Z")];

    let discovery = discover_package(&registry, IMAGE, versions, &DiscoverFilter::Manifests, 8)
        .await
        .unwrap();
    assert_eq!(discovery.views.len(), 1);
    assert!(discovery.views[0].manifest.is_none());
}

#[test]
#[should_panic(expected = "duplicate digest")]
fn test_to_map_panics_on_duplicate() {
    let digest = repeated_digest('e');
    let discovery = Discovery {
        views: vec![
            VersionView::from_record(record(1, &digest, &[], "")),
            VersionView::from_record(record(2, &digest, &[], "")),
        ],
        ..Default::default()
    };
    discovery.to_map();
}

#[test]
fn test_get_ignores_case() {
    let digest = repeated_digest('f');
    let discovery = Discovery {
        views: vec![VersionView::from_record(record(1, &digest, &["x"], ""))],
        ..Default::default()
    };
    assert!(discovery.get(&digest.to_uppercase()).is_some());
    assert_eq!(discovery.get(&digest).unwrap().tags(), &["x".to_string()]);
}
