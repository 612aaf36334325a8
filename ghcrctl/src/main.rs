use clap::{CommandFactory, Parser, Subcommand};
use libghcrctl::{GhcrError, OwnerKind, Result};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

mod commands;
mod context;
mod format;

/// ghcrctl - GitHub Container Registry administration
///
/// Inspects and tags container packages hosted on ghcr.io.
#[derive(Parser, Debug)]
#[command(name = "ghcrctl")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Packages API endpoint
    #[arg(long, global = true, value_name = "URL")]
    api_url: Option<String>,

    /// Registry endpoint
    #[arg(long, global = true, value_name = "URL")]
    registry_url: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, global = true, value_name = "SECONDS")]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show version statistics of a package
    Stats {
        /// Package as owner/package
        package: String,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Manage tags
    Tag {
        #[command(subcommand)]
        command: TagCommands,
    },
    /// Manage the default owner
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Display version information
    Version,
    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completion for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug)]
enum TagCommands {
    /// Point a new tag at an existing version
    Add {
        /// Package as owner/package
        package: String,
        /// Tag to add
        new_tag: String,
        /// Source version by tag
        #[arg(long, value_name = "TAG")]
        tag: Option<String>,
        /// Source version by digest or digest prefix (at least 4 hex characters)
        #[arg(long, value_name = "DIGEST")]
        digest: Option<String>,
        /// Source version by version id
        #[arg(long = "version", value_name = "ID")]
        version_id: Option<i64>,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Print the current configuration
    Show,
    /// Set the default owner to an organization
    Org {
        /// Organization login
        name: String,
    },
    /// Set the default owner to a user
    User {
        /// User login
        name: String,
    },
}

impl Cli {
    fn overrides(&self) -> context::Overrides {
        context::Overrides {
            api_url: self.api_url.clone(),
            registry_url: self.registry_url.clone(),
            timeout: self.timeout,
        }
    }
}

/// Runs one parsed invocation; Ctrl-C cancels `cancel`.
async fn run(cli: Cli, cancel: CancellationToken) -> Result<()> {
    match cli.command {
        Commands::Version => {
            commands::version::print_version();
            return Ok(());
        }
        Commands::Completion { shell } => {
            let mut cmd = Cli::command();
            let bin_name = cmd.get_name().to_string();
            clap_complete::generate(shell, &mut cmd, bin_name, &mut std::io::stdout());
            return Ok(());
        }
        _ => {}
    }

    let ctx = context::AppContext::build(&cli.overrides())?;
    let operation = ctx.operation(cancel);

    match cli.command {
        Commands::Stats { package, json } => {
            let output = format::OutputFormat::from_json_flag(json);
            commands::stats::handle_stats(&ctx, operation, &package, output).await
        }
        Commands::Tag { command } => match command {
            TagCommands::Add {
                package,
                new_tag,
                tag,
                digest,
                version_id,
            } => {
                let source = commands::tag::SourceFlags {
                    tag,
                    digest,
                    version: version_id,
                };
                commands::tag::handle_tag_add(&ctx, operation, &package, &new_tag, &source).await
            }
        },
        Commands::Config { command } => match command {
            ConfigCommands::Show => commands::config::handle_show(&ctx),
            ConfigCommands::Org { name } => {
                commands::config::handle_set_owner(&ctx, &name, OwnerKind::Organization)
            }
            ConfigCommands::User { name } => {
                commands::config::handle_set_owner(&ctx, &name, OwnerKind::User)
            }
        },
        Commands::Version | Commands::Completion { .. } => Ok(()),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    context::init_tracing(context::VerbosityLevel::from_count(cli.verbose));

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            format::error(&GhcrError::transient_with_source(
                "Failed to start async runtime",
                e,
            ));
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    let result = runtime.block_on(async {
        let interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, cancelling");
                interrupt.cancel();
            }
        });
        run(cli, cancel).await
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(kind = e.kind(), "command failed");
            format::error(&e);
            ExitCode::from(e.exit_code())
        }
    }
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
