use crate::context::AppContext;
use crate::format::{self, Formattable};
use libghcrctl::{OwnerConfig, OwnerKind, Result};
use serde::Serialize;

/// The owner config together with where it lives
#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConfigView<'a> {
    pub path: String,
    #[serde(flatten)]
    pub config: &'a OwnerConfig,
}

impl Formattable for ConfigView<'_> {
    fn format_pretty(&self) -> String {
        let owner_name = self.config.owner_name.as_deref().unwrap_or("(not set)");
        let owner_type = self
            .config
            .owner_type
            .map(|k| k.to_string())
            .unwrap_or_else(|| "(not set)".to_string());
        let network = &self.config.network;

        format!(
            "owner-name: {}\nowner-type: {}\n\n[network]\napi-url: {}\nregistry-url: {}\ntimeout: {}s\noperation-timeout: {}s\nconcurrency: {}\n\nconfig file: {}",
            owner_name,
            owner_type,
            network.api_url,
            network.registry_url,
            network.timeout,
            network.operation_timeout,
            network.concurrency,
            self.path
        )
    }
}

/// Handle `config show`
pub fn handle_show(ctx: &AppContext) -> Result<()> {
    let view = ConfigView {
        path: ctx.config_path.display().to_string(),
        config: &ctx.config,
    };
    println!("{}", view.format_pretty());
    Ok(())
}

/// Handle `config org <name>` and `config user <name>`
///
/// Only the owner keys change; the rest of the file is written back as
/// loaded, without environment or flag overrides.
pub fn handle_set_owner(ctx: &AppContext, name: &str, kind: OwnerKind) -> Result<()> {
    let mut stored = OwnerConfig::load(&ctx.config_path)?;
    stored.set_owner(name, kind)?;
    stored.save(&ctx.config_path)?;
    format::success(&format!("Default owner set to {} '{}'", kind, name.trim()));
    Ok(())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
