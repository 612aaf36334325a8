use crate::context::AppContext;
use crate::format;
use libghcrctl::tagger::validate_tag;
use libghcrctl::{Operation, PackageRef, Result, Selector, TagOutcome};
use std::str::FromStr;

/// Flags of `tag add` naming the source version
#[derive(Debug, Clone, Default)]
pub struct SourceFlags {
    pub tag: Option<String>,
    pub digest: Option<String>,
    pub version: Option<i64>,
}

/// Validated arguments of `tag add`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddRequest {
    pub package: PackageRef,
    pub selector: Selector,
    pub new_tag: String,
}

impl AddRequest {
    /// Checks every argument without touching the network or the token
    pub fn parse(package: &str, new_tag: &str, source: &SourceFlags) -> Result<Self> {
        let package = PackageRef::from_str(package)?;
        let selector = Selector::from_flags(
            source.tag.as_deref(),
            source.digest.as_deref(),
            source.version,
        )?;
        validate_tag(new_tag)?;
        Ok(Self {
            package,
            selector,
            new_tag: new_tag.to_string(),
        })
    }
}

/// Success line for an added tag
pub fn describe_outcome(request: &AddRequest, outcome: &TagOutcome) -> String {
    if outcome.unchanged() {
        format!(
            "{}:{} already points to {}",
            request.package,
            request.new_tag,
            format::short_digest(&outcome.digest)
        )
    } else {
        format!(
            "Tagged {}@{} as {}",
            request.package,
            format::short_digest(&outcome.digest),
            request.new_tag
        )
    }
}

/// Handle `tag add <owner/package> <new-tag>`
pub async fn handle_tag_add(
    ctx: &AppContext,
    operation: Operation,
    package: &str,
    new_tag: &str,
    source: &SourceFlags,
) -> Result<()> {
    let request = AddRequest::parse(package, new_tag, source)?;
    let ghcr = ctx.connect(operation).await?;

    let outcome = ghcr
        .add_tag(&request.package, &request.selector, &request.new_tag)
        .await?;

    if outcome.moved()
        && let Some(previous) = &outcome.previous
    {
        format::warning(&format!(
            "moved {} from {}",
            request.new_tag,
            format::short_digest(previous)
        ));
    }
    format::success(&describe_outcome(&request, &outcome));
    Ok(())
}

#[cfg(test)]
#[path = "tag_tests.rs"]
mod tests;
