//! GitHub token acquisition.
//!
//! The token is looked up once per process: environment variables first,
//! then the `gh` CLI helper. It is never written to disk.

use crate::error::{GhcrError, Result};
use tokio::process::Command;


/// Environment variables consulted, in order.
pub const DEFAULT_ENV_VARS: &[&str] = &["GHCRCTL_TOKEN", "GITHUB_TOKEN", "GH_TOKEN"];

/// Helper command that prints a token on stdout.
pub const DEFAULT_HELPER: &[&str] = &["gh", "auth", "token"];

/// Where a token was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenOrigin {
    /// The named environment variable
    Env(String),
    /// The helper command
    Helper,
}

/// A resolved token with its origin.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    secret: String,
    origin: TokenOrigin,
}

impl Token {
    /// The token value.
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Where the token came from.
    pub fn origin(&self) -> &TokenOrigin {
        &self.origin
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("secret", &"<redacted>")
            .field("origin", &self.origin)
            .finish()
    }
}

/// Looks up a bearer token from the environment or a CLI helper.
///
/// # Examples
///
/// ```
/// use libghcrctl::token::TokenSource;
///
/// let source = TokenSource::new().with_env_vars(["MY_TOKEN"]).without_helper();
/// let token = source
///     .resolve_with(|name| (name == "MY_TOKEN").then(|| "t0ken".to_string()));
/// # let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
/// let token = rt.block_on(token).unwrap();
/// assert_eq!(token.secret(), "t0ken");
/// ```
#[derive(Debug, Clone)]
pub struct TokenSource {
    env_vars: Vec<String>,
    helper: Option<Vec<String>>,
}

impl Default for TokenSource {
    fn default() -> Self {
        Self {
            env_vars: DEFAULT_ENV_VARS.iter().map(|s| s.to_string()).collect(),
            helper: Some(DEFAULT_HELPER.iter().map(|s| s.to_string()).collect()),
        }
    }
}

impl TokenSource {
    /// Creates a source with the default variables and helper.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the environment variables consulted.
    pub fn with_env_vars<I, S>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.env_vars = vars.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the helper command (program followed by arguments).
    pub fn with_helper<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let command: Vec<String> = command.into_iter().map(Into::into).collect();
        self.helper = if command.is_empty() {
            None
        } else {
            Some(command)
        };
        self
    }

    /// Disables the helper fallback.
    pub fn without_helper(mut self) -> Self {
        self.helper = None;
        self
    }

    /// Resolves a token from the process environment.
    pub async fn resolve(&self) -> Result<Token> {
        self.resolve_with(|name| std::env::var(name).ok()).await
    }

    /// Resolves a token using `lookup` in place of the process environment.
    pub async fn resolve_with<F>(&self, lookup: F) -> Result<Token>
    where
        F: Fn(&str) -> Option<String>,
    {
        for name in &self.env_vars {
            if let Some(value) = lookup(name) {
                let value = value.trim();
                if !value.is_empty() {
                    tracing::debug!(source = %name, "using token from environment");
                    return Ok(Token {
                        secret: value.to_string(),
                        origin: TokenOrigin::Env(name.clone()),
                    });
                }
            }
        }

        if let Some(command) = &self.helper
            && let Some(secret) = run_helper(command).await
        {
            tracing::debug!(helper = %command.join(" "), "using token from helper");
            return Ok(Token {
                secret,
                origin: TokenOrigin::Helper,
            });
        }

        Err(GhcrError::NoCredentials {
            message: self.missing_message(),
        })
    }

    fn missing_message(&self) -> String {
        let vars = self.env_vars.join(", ");
        match &self.helper {
            Some(command) => format!(
                "set one of {} or log in so that `{}` prints a token",
                vars,
                command.join(" ")
            ),
            None => format!("set one of {}", vars),
        }
    }
}

/// Runs the helper, returning trimmed stdout on success.
async fn run_helper(command: &[String]) -> Option<String> {
    let (program, args) = command.split_first()?;
    let output = match Command::new(program).args(args).output().await {
        Ok(output) => output,
        Err(e) => {
            tracing::debug!(helper = %program, error = %e, "token helper unavailable");
            return None;
        }
    };

    if !output.status.success() {
        tracing::debug!(helper = %program, status = %output.status, "token helper failed");
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if stdout.is_empty() { None } else { Some(stdout) }
}
