//! High-level API for ghcrctl.
//!
//! [`Ghcr`] wires one shared HTTP client into both planes and runs whole
//! operations: list, discover, resolve, stats, add tag. Each operation is
//! also available as a generic function over the capability traits, which
//! is what the tests drive with in-memory fakes.
//!
//! # Examples
//!
//! ```no_run
//! use libghcrctl::{Ghcr, PackageRef, Selector};
//! use std::str::FromStr;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ghcr = Ghcr::builder().token("ghp_example").build()?;
//!     let package = PackageRef::from_str("octo-org/app")?;
//!
//!     let stats = ghcr.stats(&package).await?;
//!     println!("{} versions", stats.total_versions);
//!
//!     let selector = Selector::ByTag("v1.0.0".to_string());
//!     let outcome = ghcr.add_tag(&package, &selector, "stable").await?;
//!     println!("stable -> {}", outcome.digest);
//!     Ok(())
//! }
//! ```

use crate::client::ClientConfig;
use crate::config::OwnerConfig;
use crate::control::{ControlClient, DEFAULT_API_URL, OwnerKind, VersionLister, VersionRecord};
use crate::discover::{DEFAULT_CONCURRENCY, DiscoverFilter, Discovery, discover_package};
use crate::error::{GhcrError, Result, ResultExt};
use crate::operation::Operation;
use crate::package::PackageRef;
use crate::registry::{DEFAULT_REGISTRY_URL, ManifestStore, RegistryClient};
use crate::resolve::{Selector, resolve};
use crate::stats::Stats;
use crate::tagger::{TagAdder, TagMutator, TagOutcome, validate_tag};
use std::time::Duration;


/// Entry point bundling the control and registry clients of one operation.
#[derive(Debug, Clone)]
pub struct Ghcr {
    control: ControlClient,
    registry: RegistryClient,
    operation: Operation,
    concurrency: usize,
}

impl Ghcr {
    /// Starts a builder with default endpoints and timeouts.
    pub fn builder() -> GhcrBuilder {
        GhcrBuilder::new()
    }

    pub fn control(&self) -> &ControlClient {
        &self.control
    }

    pub fn registry(&self) -> &RegistryClient {
        &self.registry
    }

    /// The operation every request of this instance runs under.
    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    /// Lists the control-plane records of `package`.
    pub async fn list_versions(&self, package: &PackageRef) -> Result<Vec<VersionRecord>> {
        list_package_versions(&self.control, package).await
    }

    /// Discovers `package` down to the depth `filter` asks for.
    pub async fn discover(&self, package: &PackageRef, filter: &DiscoverFilter) -> Result<Discovery> {
        let versions = self.list_versions(package).await?;
        discover_package(&self.registry, &package.image(), versions, filter, self.concurrency).await
    }

    /// Resolves `selector` within `package` to a canonical digest.
    pub async fn resolve(&self, package: &PackageRef, selector: &Selector) -> Result<String> {
        resolve_in_package(
            &self.control,
            &self.registry,
            package,
            selector,
            self.concurrency,
        )
        .await
    }

    /// Computes statistics for `package`.
    pub async fn stats(&self, package: &PackageRef) -> Result<Stats> {
        package_stats(&self.control, package).await
    }

    /// Points `new_tag` at the version `selector` names.
    pub async fn add_tag(
        &self,
        package: &PackageRef,
        selector: &Selector,
        new_tag: &str,
    ) -> Result<TagOutcome> {
        add_package_tag(
            &self.control,
            &self.registry,
            package,
            selector,
            new_tag,
            self.concurrency,
        )
        .await
    }
}

/// Lists versions, classifying the owner first.
pub async fn list_package_versions<L>(lister: &L, package: &PackageRef) -> Result<Vec<VersionRecord>>
where
    L: VersionLister + ?Sized,
{
    let kind = lister.owner_kind(package.owner()).await?;
    lister
        .list_versions(package.owner(), kind, package.name())
        .await
}

/// Statistics over the listed versions of `package`.
pub async fn package_stats<L>(lister: &L, package: &PackageRef) -> Result<Stats>
where
    L: VersionLister + ?Sized,
{
    let versions = list_package_versions(lister, package).await?;
    Ok(Stats::compute(&versions))
}

/// Resolves `selector` against the listing, falling back to the registry
/// for tags the listing does not know.
///
/// Digest selectors also see index children the listing omits, so the
/// manifest graph is discovered for them.
pub async fn resolve_in_package<L, S>(
    lister: &L,
    store: &S,
    package: &PackageRef,
    selector: &Selector,
    concurrency: usize,
) -> Result<String>
where
    L: VersionLister + ?Sized,
    S: ManifestStore + ?Sized,
{
    let image = package.image();
    let versions = list_package_versions(lister, package).await?;
    let filter = match selector {
        Selector::ByDigest(_) => DiscoverFilter::Manifests,
        Selector::ByTag(_) | Selector::ByVersionId(_) => DiscoverFilter::Records,
    };
    let discovery = discover_package(store, &image, versions, &filter, concurrency).await?;
    resolve(selector, &discovery.views, &image, store)
        .await
        .context(|| format!("failed to resolve source {}", selector))
}

/// Resolves `selector`, then re-pushes that manifest under `new_tag`.
pub async fn add_package_tag<L, S>(
    lister: &L,
    store: &S,
    package: &PackageRef,
    selector: &Selector,
    new_tag: &str,
    concurrency: usize,
) -> Result<TagOutcome>
where
    L: VersionLister + ?Sized,
    S: ManifestStore + ?Sized,
{
    validate_tag(new_tag)?;
    let digest = resolve_in_package(lister, store, package, selector, concurrency).await?;
    TagMutator::new(store)
        .add_tag(&package.image(), &digest, new_tag)
        .await
}

/// Builder for [`Ghcr`].
#[derive(Debug, Default)]
pub struct GhcrBuilder {
    api_url: Option<String>,
    registry_url: Option<String>,
    token: Option<String>,
    timeout_seconds: Option<u64>,
    operation_budget: Option<Duration>,
    concurrency: Option<usize>,
    operation: Option<Operation>,
    owner_hint: Option<(String, OwnerKind)>,
}

impl GhcrBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes endpoints, timeouts, concurrency and the owner hint from a
    /// loaded config. Later setters still override.
    pub fn with_config(mut self, config: &OwnerConfig) -> Self {
        self.api_url = Some(config.network.api_url.clone());
        self.registry_url = Some(config.network.registry_url.clone());
        self.timeout_seconds = Some(config.network.timeout);
        self.operation_budget = Some(Duration::from_secs(config.network.operation_timeout));
        self.concurrency = Some(config.network.concurrency);
        if let (Some(name), Some(kind)) = (&config.owner_name, config.owner_type) {
            self.owner_hint = Some((name.clone(), kind));
        }
        self
    }

    pub fn api_url(mut self, url: &str) -> Self {
        self.api_url = Some(url.to_string());
        self
    }

    pub fn registry_url(mut self, url: &str) -> Self {
        self.registry_url = Some(url.to_string());
        self
    }

    /// Sets the bearer token used on both planes.
    pub fn token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    /// Per-request timeout in seconds.
    pub fn timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    /// Runs every request under `operation` instead of a fresh one.
    pub fn operation(mut self, operation: Operation) -> Self {
        self.operation = Some(operation);
        self
    }

    /// Records the kind of `owner` so no probe is sent for it.
    pub fn owner_kind(mut self, owner: &str, kind: OwnerKind) -> Self {
        self.owner_hint = Some((owner.to_string(), kind));
        self
    }

    pub fn build(self) -> Result<Ghcr> {
        let token = self
            .token
            .ok_or_else(|| GhcrError::validation("A token is required"))?;

        let mut client_config = ClientConfig::new();
        if let Some(seconds) = self.timeout_seconds {
            client_config = client_config.with_timeout(seconds);
        }
        let http = client_config.build()?;

        let operation = match (self.operation, self.operation_budget) {
            (Some(operation), _) => operation,
            (None, Some(budget)) => Operation::new(budget),
            (None, None) => Operation::default(),
        };

        let control = ControlClient::new(
            http.clone(),
            self.api_url.as_deref().unwrap_or(DEFAULT_API_URL),
            token.clone(),
            operation.clone(),
        )?;
        let registry = RegistryClient::new(
            http,
            self.registry_url.as_deref().unwrap_or(DEFAULT_REGISTRY_URL),
            &token,
            operation.clone(),
        )?;

        if let Some((owner, kind)) = &self.owner_hint {
            control.remember_owner(owner, *kind);
        }

        Ok(Ghcr {
            control,
            registry,
            operation,
            concurrency: self.concurrency.unwrap_or(DEFAULT_CONCURRENCY).max(1),
        })
    }
}
