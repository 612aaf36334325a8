//! sha256 content digests.
//!
//! GHCR only serves sha256 digests, kept as `sha256:<hex>` strings. The
//! helpers here compute them and match the short prefixes users type.

use crate::error::{GhcrError, Result};
use sha2::{Digest, Sha256};


/// Algorithm prefix of every digest handled here.
pub const SHA256_PREFIX: &str = "sha256:";

/// Length of the hex part of a sha256 digest.
pub const SHA256_HEX_LEN: usize = 64;

/// Returns the lowercase hex sha256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Returns `sha256:<hex>` for `bytes`.
///
/// ```
/// use libghcrctl::digest::sha256_digest;
///
/// assert_eq!(
///     sha256_digest(b""),
///     "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
/// );
/// ```
pub fn sha256_digest(bytes: &[u8]) -> String {
    format!("{}{}", SHA256_PREFIX, sha256_hex(bytes))
}

/// True when `s` is `sha256:` followed by exactly 64 lowercase hex characters.
pub fn is_full_digest(s: &str) -> bool {
    s.strip_prefix(SHA256_PREFIX).is_some_and(|hex| {
        hex.len() == SHA256_HEX_LEN
            && hex
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
    })
}

/// Normalizes a short digest selector into a lowercase hex prefix.
///
/// An optional `sha256:` prefix is stripped. Hex is matched case-insensitively,
/// so the result is lowercased.
///
/// # Examples
///
/// ```
/// use libghcrctl::digest::normalize_prefix;
///
/// assert_eq!(normalize_prefix("ABC1").unwrap(), "abc1");
/// assert_eq!(normalize_prefix("sha256:abc1").unwrap(), "abc1");
/// assert!(normalize_prefix("xyz").is_err());
/// ```
pub fn normalize_prefix(s: &str) -> Result<String> {
    let trimmed = s.trim();
    let hex = trimmed
        .strip_prefix(SHA256_PREFIX)
        .or_else(|| trimmed.strip_prefix("SHA256:"))
        .unwrap_or(trimmed)
        .to_ascii_lowercase();

    if hex.is_empty() {
        return Err(GhcrError::validation("digest prefix cannot be empty"));
    }
    if hex.len() > SHA256_HEX_LEN {
        return Err(GhcrError::validation(format!(
            "digest prefix '{}' is longer than a sha256 digest",
            s
        )));
    }
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(GhcrError::validation(format!(
            "digest prefix '{}' contains non-hex characters",
            s
        )));
    }
    Ok(hex)
}

/// Compares two digest strings ignoring hex case.
pub fn digests_equal(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}
