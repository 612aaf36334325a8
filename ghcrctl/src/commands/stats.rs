use crate::context::AppContext;
use crate::format::{self, Formattable, OutputFormat};
use libghcrctl::{Operation, PackageRef, Result, Stats};
use serde::Serialize;
use std::str::FromStr;

/// Statistics of one package, as printed
#[derive(Debug, Serialize)]
pub struct StatsReport {
    #[serde(skip)]
    pub package: String,
    #[serde(flatten)]
    pub stats: Stats,
}

impl Formattable for StatsReport {
    fn format_pretty(&self) -> String {
        let s = &self.stats;
        [
            format!("Package:          {}", self.package),
            format!("Total versions:   {}", s.total_versions),
            format!("Tagged versions:  {}", s.tagged_versions),
            format!("Untagged:         {}", s.untagged_versions),
            format!("Total tags:       {}", s.total_tags),
            format!("Oldest:           {}", format::timestamp(&s.oldest)),
            format!("Newest:           {}", format::timestamp(&s.newest)),
        ]
        .join("\n")
    }
}

/// Handle `stats <owner/package>`
pub async fn handle_stats(
    ctx: &AppContext,
    operation: Operation,
    package: &str,
    output: OutputFormat,
) -> Result<()> {
    let package = PackageRef::from_str(package)?;
    let ghcr = ctx.connect(operation).await?;
    let stats = ghcr.stats(&package).await?;

    let report = StatsReport {
        package: package.to_string(),
        stats,
    };
    println!("{}", format::format_output(&report, output)?);
    Ok(())
}

#[cfg(test)]
#[path = "stats_tests.rs"]
mod tests;
