use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use release_tracker::config::TrackerConfig;
use release_tracker::coordinator::{CoordinatorOptions, ReleaseCoordinator, RunError};
use release_tracker::fetch::HttpFetcher;
use release_tracker::logging::{LogFormat, init_tracing, level_from_verbosity};
use release_tracker::release::{JsonFileReleaseSource, RepositoryId};
use release_tracker::store;

/// Exit code when the version store could not be reached at all
const EXIT_STORE_UNREACHABLE: u8 = 2;

#[derive(Parser)]
#[command(name = "release-tracker")]
#[command(version, about = "Track upstream releases and download new assets exactly once")]
struct Cli {
    /// Configuration file (JSON)
    #[arg(short, long, global = true, env = "RELEASE_TRACKER_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check repositories and download new releases
    Run {
        /// Release export mapping owner/repo to release records
        #[arg(long)]
        releases: PathBuf,

        /// Write the JSON summary here instead of stdout
        #[arg(long)]
        summary: Option<PathBuf>,

        /// Repository to check; repeatable. Defaults to the configured list.
        #[arg(long = "repo", value_name = "OWNER/REPO")]
        repositories: Vec<RepositoryId>,
    },
    /// Print tracked versions
    List,
    /// Forget a repository so its next release is downloaded again
    Forget {
        #[arg(value_name = "OWNER/REPO")]
        repository: RepositoryId,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = init_tracing(
        cli.log_format,
        level_from_verbosity(cli.verbose),
        cli.log_file.as_deref(),
    );

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(execute(cli)) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<TrackerConfig> {
    let mut config = match path {
        Some(path) => TrackerConfig::load(path)?,
        None => TrackerConfig::default(),
    };
    config.apply_env();
    Ok(config)
}

async fn execute(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Run {
            releases,
            summary,
            repositories,
        } => {
            let repositories = if repositories.is_empty() {
                config.repository_ids()
            } else {
                for id in &repositories {
                    config.add_repository(id);
                }
                // Pick up environment pins for repositories named on the command line
                config.apply_env();
                repositories
            };
            config.validate()?;
            run(&config, &releases, summary.as_deref(), &repositories).await
        }
        Command::List => {
            config.validate()?;
            let store = store::open(&config.storage, config.request_timeout())?;
            let entries = store
                .list_all()
                .await
                .context("cannot read version store")?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Forget { repository } => {
            config.validate()?;
            let store = store::open(&config.storage, config.request_timeout())?;
            let removed = store
                .remove(&repository.owner, &repository.name)
                .await
                .with_context(|| format!("cannot update version store for {}", repository))?;
            if removed {
                info!("Forgot {}", repository);
            } else {
                info!("{} was not tracked", repository);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run(
    config: &TrackerConfig,
    releases: &Path,
    summary_path: Option<&Path>,
    repositories: &[RepositoryId],
) -> anyhow::Result<ExitCode> {
    let source = JsonFileReleaseSource::from_path(releases)
        .with_context(|| format!("cannot load releases from {}", releases.display()))?;
    let store = store::open(&config.storage, config.request_timeout())?;
    let fetcher = HttpFetcher::new(config.request_timeout(), config.retry_policy())?;

    let coordinator = ReleaseCoordinator::new(
        CoordinatorOptions::from(config),
        Arc::new(source),
        store,
        Arc::new(fetcher),
    )?;

    let summary = match coordinator.run(repositories).await {
        Ok(summary) => summary,
        Err(e @ RunError::StoreUnreachable { .. }) => {
            error!("{}", e);
            return Ok(ExitCode::from(EXIT_STORE_UNREACHABLE));
        }
        Err(e) => return Err(e.into()),
    };

    let rendered = serde_json::to_string_pretty(&summary)?;
    match summary_path {
        Some(path) => {
            std::fs::write(path, format!("{}\n", rendered))
                .with_context(|| format!("cannot write summary to {}", path.display()))?;
            info!("Summary written to {}", path.display());
        }
        None => println!("{}", rendered),
    }

    Ok(ExitCode::SUCCESS)
}
