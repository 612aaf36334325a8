use super::*;
use std::str::FromStr;

#[test]
fn test_parse_valid_reference() {
    let pkg = PackageRef::from_str("octo/app").unwrap();
    assert_eq!(pkg.owner(), "octo");
    assert_eq!(pkg.name(), "app");
    assert_eq!(pkg.image(), "octo/app");
}

#[test]
fn test_round_trip() {
    for input in ["octo/app", "Octo-Org/my_app", "a/b", "user-1/pkg.name"] {
        let pkg = PackageRef::from_str(input).unwrap();
        let printed = pkg.to_string();
        assert_eq!(printed, input);
        assert_eq!(PackageRef::from_str(&printed).unwrap(), pkg);
    }
}

#[test]
fn test_inline_tag_rejected() {
    let err = PackageRef::from_str("owner/pkg:v1.0").unwrap_err();
    assert!(err.to_string().contains("inline tags not supported"));
    assert!(err.to_string().contains("--tag"));
    assert_eq!(err.kind(), "Usage");
}

#[test]
fn test_any_colon_rejected() {
    for input in [":", "owner:x/pkg", "owner/pkg:", "o/p@sha256:abcd"] {
        assert!(PackageRef::from_str(input).is_err(), "{}", input);
    }
}

#[test]
fn test_empty_owner() {
    let err = PackageRef::from_str("/pkg").unwrap_err();
    assert!(err.to_string().contains("owner cannot be empty"));
}

#[test]
fn test_empty_package() {
    let err = PackageRef::from_str("owner/").unwrap_err();
    assert!(err.to_string().contains("package cannot be empty"));
}

#[test]
fn test_missing_slash() {
    let err = PackageRef::from_str("justpackage").unwrap_err();
    assert!(err.to_string().contains("must be in format owner/package"));
}

#[test]
fn test_too_many_slashes() {
    let err = PackageRef::from_str("owner/nested/pkg").unwrap_err();
    assert!(err.to_string().contains("must be in format owner/package"));
}

#[test]
fn test_new_validates() {
    assert!(PackageRef::new("octo", "app").is_ok());
    assert!(PackageRef::new("", "app").is_err());
    assert!(PackageRef::new("octo", "app:latest").is_err());
}
