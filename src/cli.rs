use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::application::parsers::split_name_version;
use crate::risk_scoring::domain::{DependencyFileUrl, PackageManager, ScanTarget};

/// Supply-chain risk scoring for package dependency graphs
#[derive(Parser, Debug)]
#[command(name = "depwatch")]
#[command(version)]
#[command(about = "Supply-chain risk scoring for package dependency graphs", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the scan orchestrator and result inbox loop
    Worker {
        /// Path to the config file (defaults to ./depwatch.config.yml when present)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Run a single poll cycle and exit
        #[arg(long)]
        once: bool,

        /// Queue a package scan before polling: NAME, NAME@VERSION or NAME@latest
        /// Can be specified multiple times
        #[arg(short, long = "package", value_name = "SPEC")]
        packages: Vec<String>,

        /// Queue one scan over these manifest files: FILENAME=URL
        /// Can be specified multiple times
        #[arg(short, long = "dep-file", value_name = "FILENAME=URL")]
        dep_files: Vec<String>,
    },

    /// Score a saved dependency listing and print the reports as JSON
    Score {
        /// Output of `npm list --json`, `yarn list --json` or `cargo metadata`
        #[arg(short, long)]
        listing: PathBuf,

        /// Package manager that produced the listing: npm, yarn or cargo
        #[arg(short = 'm', long, default_value = "npm")]
        package_manager: PackageManager,

        /// Path to the config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Skip fetching registry metadata and quality scores
        #[arg(long)]
        offline: bool,
    },

    /// Look up public breaches for a package's maintainer accounts
    Breaches {
        /// Package name
        package: String,

        /// Published version (defaults to the latest release)
        version: Option<String>,

        /// Package manager whose registry to query: npm, yarn or cargo
        #[arg(short = 'm', long, default_value = "npm")]
        package_manager: PackageManager,

        /// Path to the config file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Load and validate the config, then print the effective values
    CheckConfig {
        /// Path to the config file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Parses a `--package` value into a scan target.
pub fn package_target(spec: &str) -> Result<ScanTarget, String> {
    let (name, version) = match split_name_version(spec) {
        Some((name, version)) => (name, Some(version.to_string())),
        None => (spec, None),
    };
    let target = ScanTarget::Package {
        name: name.to_string(),
        version,
    };
    target.validate().map_err(|e| e.to_string())?;
    Ok(target)
}

/// Parses every `--dep-file` value into one scan target.
pub fn dep_files_target(specs: &[String]) -> Result<Option<ScanTarget>, String> {
    if specs.is_empty() {
        return Ok(None);
    }
    let urls = specs
        .iter()
        .map(|spec| {
            let (filename, url) = spec
                .split_once('=')
                .ok_or_else(|| format!("Invalid dependency file: {}. Expected FILENAME=URL", spec))?;
            Ok(DependencyFileUrl {
                filename: filename.trim().to_string(),
                url: url.trim().to_string(),
            })
        })
        .collect::<Result<Vec<_>, String>>()?;
    let target = ScanTarget::DependencyFiles { urls };
    target.validate().map_err(|e| e.to_string())?;
    Ok(Some(target))
}
