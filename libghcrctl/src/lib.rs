//! ghcrctl - GitHub Container Registry administration library
//!
//! Talks to the two planes a GHCR package lives on: the forge packages API
//! (owners, version records, ids) and the OCI registry (tags, manifests,
//! blobs). The library merges both into one view of a package and offers
//! the operations the `ghcrctl` binary exposes.
//!
//! # Quick Start
//!
//! ```no_run
//! use libghcrctl::{Ghcr, PackageRef, TokenSource};
//! use std::str::FromStr;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let token = TokenSource::new().resolve().await?;
//!     let ghcr = Ghcr::builder().token(token.secret()).build()?;
//!
//!     let stats = ghcr.stats(&PackageRef::from_str("octo-org/app")?).await?;
//!     println!("{} tagged of {}", stats.tagged_versions, stats.total_versions);
//!     Ok(())
//! }
//! ```
//!
//! # Main Types
//!
//! - [`Ghcr`] - Main entry point wiring both planes
//! - [`PackageRef`] - `owner/name` package references
//! - [`Selector`] - Tag, digest, digest prefix or version id
//! - [`Stats`] - Package statistics
//! - [`OwnerConfig`] - Persisted owner settings
//! - [`GhcrError`] - Error type with stable kind strings
//!
//! The low-level modules stay public for callers that need a single plane,
//! but are hidden from the docs.

#![warn(clippy::all)]

/// Returns the libghcrctl crate version.
///
/// # Examples
///
/// ```
/// let version = libghcrctl::version();
/// assert!(!version.is_empty());
/// ```
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

// High-level public API (main entry point)
mod ghcr;
pub use ghcr::{
    Ghcr, GhcrBuilder, add_package_tag, list_package_versions, package_stats, resolve_in_package,
};

pub use config::{NetworkConfig, OwnerConfig};
pub use control::{OwnerKind, VersionRecord};
pub use discover::{DiscoverFilter, Discovery, VersionView};
pub use error::{GhcrError, Result, ResultExt};
pub use operation::Operation;
pub use package::PackageRef;
pub use resolve::Selector;
pub use stats::Stats;
pub use tagger::TagOutcome;
pub use token::{Token, TokenOrigin, TokenSource};

#[doc(hidden)]
pub mod auth;
#[doc(hidden)]
pub mod client;
#[doc(hidden)]
pub mod config;
#[doc(hidden)]
pub mod control;
#[doc(hidden)]
pub mod digest;
#[doc(hidden)]
pub mod discover;
#[doc(hidden)]
pub mod error;
#[doc(hidden)]
pub mod oci;
#[doc(hidden)]
pub mod operation;
#[doc(hidden)]
pub mod package;
#[doc(hidden)]
pub mod registry;
#[doc(hidden)]
pub mod resolve;
#[doc(hidden)]
pub mod stats;
#[doc(hidden)]
pub mod tagger;
#[doc(hidden)]
pub mod token;

#[cfg(test)]
mod testing;
