use libghcrctl::GhcrError;
use owo_colors::OwoColorize;
use serde::Serialize;
use std::io::IsTerminal;

/// Check if we should use colors on stdout
pub fn should_color() -> bool {
    std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

fn should_color_stderr() -> bool {
    std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

/// Print a success message with optional coloring
pub fn success(message: &str) {
    println!("{} {}", checkmark(), message);
}

/// Print a warning message to stderr with optional coloring
pub fn warning(message: &str) {
    if should_color_stderr() {
        eprintln!("{} {}", "⚠".yellow().bold(), message);
    } else {
        eprintln!("⚠ {}", message);
    }
}

/// Print an error to stderr as `error: <message>`
pub fn error(err: &GhcrError) {
    let line = error_line(err);
    if should_color_stderr() {
        eprintln!("{}{}", "error:".red().bold(), &line["error:".len()..]);
    } else {
        eprintln!("{}", line);
    }
}

/// The uncolored line printed for `err`
pub fn error_line(err: &GhcrError) -> String {
    format!("error: {}", err)
}

/// Colorize a checkmark for success if colors are enabled
pub fn checkmark() -> String {
    if should_color() {
        format!("{}", "✓".green())
    } else {
        "✓".to_string()
    }
}

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable pretty format
    Pretty,
    /// JSON format
    Json,
}

impl OutputFormat {
    /// Maps a `--json` flag to a format
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            OutputFormat::Json
        } else {
            OutputFormat::Pretty
        }
    }
}

/// Trait for types that can be formatted for CLI output
pub trait Formattable: Serialize {
    /// Format the type for pretty (human-readable) output
    fn format_pretty(&self) -> String;
}

/// Format a single item for output
pub fn format_output<T: Formattable>(item: &T, format: OutputFormat) -> Result<String, GhcrError> {
    match format {
        OutputFormat::Pretty => Ok(item.format_pretty()),
        OutputFormat::Json => serde_json::to_string_pretty(item)
            .map_err(|e| GhcrError::validation_with_source("Failed to serialize to JSON", e)),
    }
}

/// Render an RFC 3339 timestamp as `YYYY-MM-DD HH:MM:SS UTC`
///
/// Unparseable input is returned unchanged; empty input becomes `-`.
pub fn timestamp(raw: &str) -> String {
    if raw.is_empty() {
        return "-".to_string();
    }
    match chrono::DateTime::parse_from_rfc3339(raw) {
        Ok(parsed) => parsed
            .with_timezone(&chrono::Utc)
            .format("%Y-%m-%d %H:%M:%S UTC")
            .to_string(),
        Err(_) => raw.to_string(),
    }
}

/// Shorten a `sha256:` digest to 12 hex characters for display
pub fn short_digest(digest: &str) -> &str {
    let hex = digest.strip_prefix("sha256:").unwrap_or(digest);
    &hex[..hex.len().min(12)]
}
