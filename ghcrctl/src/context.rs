//! Application context that holds resolved configuration
//!
//! The context is built following the precedence order:
//! 1. Default values
//! 2. Config file values
//! 3. Environment variables
//! 4. CLI flags
//!
//! Once built, the context is passed as read-only throughout the application.

use libghcrctl::config::default_path;
use libghcrctl::{Ghcr, Operation, OwnerConfig, Result, TokenSource};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Overrides the control-plane endpoint
pub const ENV_API_URL: &str = "GHCRCTL_API_URL";

/// Overrides the registry endpoint
pub const ENV_REGISTRY_URL: &str = "GHCRCTL_REGISTRY_URL";

/// Log verbosity selected with `-v`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VerbosityLevel {
    Warn,
    Info,
    Debug,
    Trace,
}

impl VerbosityLevel {
    pub fn from_count(count: u8) -> Self {
        match count {
            0 => VerbosityLevel::Warn,
            1 => VerbosityLevel::Info,
            2 => VerbosityLevel::Debug,
            _ => VerbosityLevel::Trace,
        }
    }

    /// Filter directive for our crates; dependencies stay at `warn`
    pub fn filter_directive(&self) -> String {
        let level = match self {
            VerbosityLevel::Warn => "warn",
            VerbosityLevel::Info => "info",
            VerbosityLevel::Debug => "debug",
            VerbosityLevel::Trace => "trace",
        };
        format!("warn,ghcrctl={},libghcrctl={}", level, level)
    }
}

/// Install the stderr log subscriber; `RUST_LOG` wins over `-v`
pub fn init_tracing(verbosity: VerbosityLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.filter_directive()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Endpoint and timeout flags given on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub api_url: Option<String>,
    pub registry_url: Option<String>,
    pub timeout: Option<u64>,
}

/// Application context with resolved configuration and runtime state
#[derive(Debug, Clone)]
pub struct AppContext {
    /// Resolved configuration
    pub config: OwnerConfig,
    /// Where `config` was loaded from and is saved to
    pub config_path: PathBuf,
}

impl AppContext {
    /// Build context with precedence: defaults > config file > env vars > CLI flags
    pub fn build(overrides: &Overrides) -> Result<Self> {
        Self::build_from(default_path()?, |name| std::env::var(name).ok(), overrides)
    }

    /// Like [`AppContext::build`] with an explicit config path and environment
    pub fn build_from<F>(config_path: PathBuf, env: F, overrides: &Overrides) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // 1 + 2. Defaults merged with the file, if any
        let mut config = OwnerConfig::load(&config_path)?;

        // 3. Environment
        let from_env = |name: &str| env(name).filter(|v| !v.trim().is_empty());
        if let Some(url) = from_env(ENV_API_URL) {
            config.network.api_url = url;
        }
        if let Some(url) = from_env(ENV_REGISTRY_URL) {
            config.network.registry_url = url;
        }

        // 4. Flags
        if let Some(url) = &overrides.api_url {
            config.network.api_url = url.clone();
        }
        if let Some(url) = &overrides.registry_url {
            config.network.registry_url = url.clone();
        }
        if let Some(timeout) = overrides.timeout {
            config.network.timeout = timeout;
        }

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Starts the operation budget, bound to `cancel`
    pub fn operation(&self, cancel: CancellationToken) -> Operation {
        Operation::with_cancel(
            cancel,
            Duration::from_secs(self.config.network.operation_timeout),
        )
    }

    /// Looks up a token and wires both planes
    pub async fn connect(&self, operation: Operation) -> Result<Ghcr> {
        let token = TokenSource::new().resolve().await?;
        tracing::debug!(origin = ?token.origin(), "resolved token");
        Ghcr::builder()
            .with_config(&self.config)
            .token(token.secret())
            .operation(operation)
            .build()
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
