mod adapters;
mod application;
mod cli;
mod config;
mod ports;
mod risk_scoring;
mod shared;

use adapters::outbound::console::StderrProgressReporter;
use adapters::outbound::filesystem::{FileSystemReader, SpoolInbox};
use adapters::outbound::network::{
    CratesIoEndpoint, CratesIoQualityEndpoint, GithubAdvisoryEndpoint, HibpEndpoint,
    HttpSignalSource, NpmRegistryEndpoint, NpmsIoEndpoint, ReqwestTransport, SignalFetcher,
    MAX_NPMS_BATCH,
};
use adapters::outbound::sandbox::HttpJobSandbox;
use adapters::outbound::storage::InMemoryStore;
use adapters::outbound::SystemClock;
use anyhow::Context;
use application::dto::{ListingScores, ScoreListingRequest};
use application::use_cases::{ScanOrchestrator, ScoreListingUseCase, SignalBackfill};
use cli::{Args, Command};
use config::{resolve_config, ClientConfig, ClientsConfig, ConfigFile};
use owo_colors::OwoColorize;
use ports::outbound::{Clock, ScanRepository, SignalTransport};
use risk_scoring::domain::{Grade, Language, PackageManager, ScanTarget};
use shared::error::ExitCode;
use shared::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() {
    let args = Args::parse_args();

    match run(args) {
        Ok(code) => process::exit(code.as_i32()),
        Err(e) => {
            eprintln!("\n❌ An error occurred:\n");
            eprintln!("{}", e);

            // Display error chain
            for cause in e.chain().skip(1) {
                eprintln!("\nCaused by: {}", cause);
            }

            eprintln!();
            process::exit(ExitCode::ApplicationError.as_i32());
        }
    }
}

fn run(args: Args) -> Result<ExitCode> {
    let cwd = std::env::current_dir().context("Failed to read the current directory")?;

    match args.command {
        Command::CheckConfig { config } => check_config(config.as_deref(), &cwd),
        Command::Score {
            listing,
            package_manager,
            config,
            offline,
        } => {
            let config = resolve_config(config.as_deref(), &cwd)?;
            init_tracing(config.log_filter.as_deref(), "warn");
            runtime()?.block_on(score(&config, listing, package_manager, offline))
        }
        Command::Breaches {
            package,
            version,
            package_manager,
            config,
        } => {
            let config = resolve_config(config.as_deref(), &cwd)?;
            init_tracing(config.log_filter.as_deref(), "warn");
            runtime()?.block_on(breaches(
                &config,
                &package,
                version.as_deref(),
                package_manager,
            ))
        }
        Command::Worker {
            config,
            once,
            packages,
            dep_files,
        } => {
            let config = resolve_config(config.as_deref(), &cwd)?;
            init_tracing(config.log_filter.as_deref(), "info");
            let mut targets = packages
                .iter()
                .map(|spec| cli::package_target(spec))
                .collect::<std::result::Result<Vec<_>, String>>()
                .map_err(anyhow::Error::msg)?;
            if let Some(target) = cli::dep_files_target(&dep_files).map_err(anyhow::Error::msg)? {
                targets.push(target);
            }
            runtime()?.block_on(worker(&config, targets, once))
        }
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")
}

/// Logs go to stderr; `RUST_LOG` wins over the config filter.
fn init_tracing(config_filter: Option<&str>, fallback: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config_filter.unwrap_or(fallback)))
        .unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn check_config(explicit: Option<&Path>, cwd: &Path) -> Result<ExitCode> {
    let config = resolve_config(explicit, cwd)?;
    print!("{}", config.effective_yaml()?);
    eprintln!("✅ Configuration is valid");
    Ok(ExitCode::Success)
}

fn transport(client: &ClientConfig) -> Result<Arc<dyn SignalTransport>> {
    Ok(Arc::new(ReqwestTransport::new(
        client.user_agent.as_deref(),
        client.timeout(),
    )?))
}

fn signal_source(clients: &ClientsConfig) -> Result<HttpSignalSource> {
    let mut npms_settings = clients.npms_io.fetch_settings();
    npms_settings.batch_size = npms_settings.batch_size.min(MAX_NPMS_BATCH);

    let github = transport(&clients.github)?;
    let github_url = clients.github.base_url();
    let source = HttpSignalSource::new(
        SignalFetcher::new(
            transport(&clients.npm_registry)?,
            NpmRegistryEndpoint::new(clients.npm_registry.base_url()),
            clients.npm_registry.fetch_settings(),
        ),
        SignalFetcher::new(
            transport(&clients.npms_io)?,
            NpmsIoEndpoint::new(clients.npms_io.base_url()),
            npms_settings,
        ),
        SignalFetcher::new(
            transport(&clients.hibp)?,
            HibpEndpoint::new(clients.hibp.base_url(), clients.hibp.auth_token.clone()),
            clients.hibp.fetch_settings(),
        ),
        SignalFetcher::new(
            transport(&clients.crates_io)?,
            CratesIoEndpoint::new(clients.crates_io.base_url()),
            clients.crates_io.fetch_settings(),
        ),
        SignalFetcher::new(
            transport(&clients.crates_io)?,
            CratesIoQualityEndpoint::new(clients.crates_io.base_url()),
            clients.crates_io.fetch_settings(),
        ),
    );
    Ok([Language::Node, Language::Rust, Language::Python]
        .into_iter()
        .fold(source, |source, language| {
            source.with_advisory_feed(SignalFetcher::new(
                github.clone(),
                GithubAdvisoryEndpoint::new(
                    github_url.as_str(),
                    clients.github.auth_token.clone(),
                    language,
                    clients.github.batch_size,
                ),
                clients.github.fetch_settings(),
            ))
        }))
}

async fn score(
    config: &ConfigFile,
    listing: PathBuf,
    package_manager: PackageManager,
    offline: bool,
) -> Result<ExitCode> {
    let store = Arc::new(InMemoryStore::default());
    let source = if offline {
        None
    } else {
        Some(Arc::new(signal_source(&config.clients)?))
    };

    let use_case = ScoreListingUseCase::new(
        FileSystemReader::new(),
        StderrProgressReporter::new(),
        store,
        source,
    );
    let scores = use_case
        .execute(ScoreListingRequest {
            listing_path: listing,
            package_manager,
            offline,
        })
        .await?;

    println!("{}", serde_json::to_string_pretty(&scores.reports)?);
    print_grade_summary(&scores);

    Ok(if scores.summary.is_complete() {
        ExitCode::Success
    } else {
        ExitCode::ScoringIncomplete
    })
}

fn print_grade_summary(scores: &ListingScores) {
    let mut grades: BTreeMap<Grade, usize> = BTreeMap::new();
    for report in &scores.reports {
        *grades.entry(report.summary.grade()).or_default() += 1;
    }

    eprintln!();
    eprintln!("📊 Grade summary for graph {}:", scores.graph_id);
    for (grade, count) in grades {
        let label = match grade {
            Grade::A => grade.as_str().green().to_string(),
            Grade::B => grade.as_str().bright_green().to_string(),
            Grade::C => grade.as_str().yellow().to_string(),
            Grade::D => grade.as_str().bright_red().to_string(),
            Grade::E => grade.as_str().red().bold().to_string(),
        };
        eprintln!("   {}: {}", label, count);
    }
    if scores.summary.skipped_nodes > 0 {
        eprintln!(
            "   {} {} package(s) could not be scored",
            "⚠️".yellow(),
            scores.summary.skipped_nodes
        );
    }
}

async fn breaches(
    config: &ConfigFile,
    package: &str,
    version: Option<&str>,
    package_manager: PackageManager,
) -> Result<ExitCode> {
    let backfill = SignalBackfill::new(
        Arc::new(InMemoryStore::default()),
        Arc::new(signal_source(&config.clients)?),
    );
    let found = backfill
        .maintainer_breaches(package, version, package_manager.language())
        .await?;

    println!("{}", serde_json::to_string_pretty(&found)?);
    let breached = found.iter().filter(|record| !record.breach_names.is_empty()).count();
    if breached == 0 {
        eprintln!("✅ No maintainer account of {} appears in a known breach", package);
    } else {
        eprintln!(
            "{} {} maintainer account(s) of {} appear in known breaches",
            "⚠️".yellow(),
            breached,
            package
        );
    }
    Ok(ExitCode::Success)
}

async fn worker(config: &ConfigFile, targets: Vec<ScanTarget>, once: bool) -> Result<ExitCode> {
    let submit_url = config.sandbox.submit_url.clone().with_context(|| {
        "sandbox.submit_url is not configured\n\n💡 Hint: Add a sandbox section to depwatch.config.yml"
    })?;

    let store = Arc::new(InMemoryStore::default());
    let clock = Arc::new(SystemClock);
    let sandbox = Arc::new(HttpJobSandbox::new(
        submit_url,
        config.sandbox.auth_token.clone(),
    )?);
    let source = Arc::new(signal_source(&config.clients)?);
    let inbox = SpoolInbox::new(&config.inbox.spool_dir)?;
    let dispatch = config.sandbox.dispatch_settings()?;

    let mut scan_ids = Vec::new();
    for target in targets {
        let scan = store.create_scan(target, clock.now())?;
        info!(scan = %scan.id, "queued scan");
        scan_ids.push(scan.id);
    }

    let orchestrators: Vec<_> = (0..config.worker.workers)
        .map(|index| {
            ScanOrchestrator::new(
                Arc::clone(&store),
                Arc::clone(&sandbox),
                Arc::clone(&source),
                Arc::clone(&clock),
                dispatch.clone(),
                config.worker.orchestrator_settings(index),
            )
        })
        .collect();

    futures::future::join_all(
        orchestrators
            .iter()
            .map(|orchestrator| orchestrator.run(&inbox, once)),
    )
    .await;

    for id in scan_ids {
        if let Some(scan) = store.scan(id)? {
            info!(scan = %scan.id, status = %scan.status, jobs = scan.job_names.len(), "scan status");
        }
    }
    Ok(ExitCode::Success)
}
