use super::ids::PackageVersionId;
use crate::shared::error::ScanError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum length for package names (security limit)
const MAX_PACKAGE_NAME_LENGTH: usize = 255;

/// Maximum length for package versions (security limit)
const MAX_VERSION_LENGTH: usize = 128;

/// Ecosystem a package version belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Node,
    Rust,
    Python,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Language::Node => "node",
            Language::Rust => "rust",
            Language::Python => "python",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "node" | "nodejs" | "javascript" => Ok(Language::Node),
            "rust" => Ok(Language::Rust),
            "python" => Ok(Language::Python),
            _ => Err(format!(
                "Invalid language: {}. Please specify 'node', 'rust' or 'python'",
                s
            )),
        }
    }
}

/// Package manager whose output a task produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    Npm,
    Yarn,
    Cargo,
}

impl PackageManager {
    pub fn as_str(self) -> &'static str {
        match self {
            PackageManager::Npm => "npm",
            PackageManager::Yarn => "yarn",
            PackageManager::Cargo => "cargo",
        }
    }

    pub fn language(self) -> Language {
        match self {
            PackageManager::Npm | PackageManager::Yarn => Language::Node,
            PackageManager::Cargo => Language::Rust,
        }
    }

    /// Infers the package manager from the first word of a task command line.
    pub fn from_command(command: &str) -> Option<Self> {
        let program = command.split_whitespace().next()?;
        let program = program.rsplit('/').next().unwrap_or(program);
        program.parse().ok()
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PackageManager {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "npm" => Ok(PackageManager::Npm),
            "yarn" => Ok(PackageManager::Yarn),
            "cargo" => Ok(PackageManager::Cargo),
            _ => Err(format!(
                "Invalid package manager: {}. Please specify 'npm', 'yarn' or 'cargo'",
                s
            )),
        }
    }
}

/// Natural key of a package version: unique per (name, version, language).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageVersionKey {
    pub name: String,
    pub version: String,
    pub language: Language,
}

impl PackageVersionKey {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        language: Language,
    ) -> Result<Self, ScanError> {
        let name = name.into();
        let version = version.into();

        if name.is_empty() || version.is_empty() {
            return Err(ScanError::Validation {
                message: "Package name and version cannot be empty".to_string(),
            });
        }

        if name.len() > MAX_PACKAGE_NAME_LENGTH || version.len() > MAX_VERSION_LENGTH {
            return Err(ScanError::Validation {
                message: format!(
                    "Package identity is too long ({} / {} bytes)",
                    name.len(),
                    version.len()
                ),
            });
        }

        if name.chars().chain(version.chars()).any(|c| c.is_control() || c.is_whitespace()) {
            return Err(ScanError::Validation {
                message: format!(
                    "Package identity {:?}@{:?} contains whitespace or control characters",
                    name, version
                ),
            });
        }

        Ok(Self {
            name,
            version,
            language,
        })
    }
}

impl fmt::Display for PackageVersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} ({})", self.name, self.version, self.language)
    }
}

/// Optional provenance recorded after first sight.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Distribution URL (tarball, crate download)
    pub url: Option<String>,
    pub repo_url: Option<String>,
    pub repo_commit: Option<String>,
}

impl Provenance {
    pub fn with_url(url: Option<String>) -> Self {
        Self {
            url,
            ..Self::default()
        }
    }

    /// Fills fields that are still unset; set fields are never overwritten.
    pub fn fill_missing(&mut self, other: &Provenance) {
        if self.url.is_none() {
            self.url.clone_from(&other.url);
        }
        if self.repo_url.is_none() {
            self.repo_url.clone_from(&other.repo_url);
        }
        if self.repo_commit.is_none() {
            self.repo_commit.clone_from(&other.repo_commit);
        }
    }
}

/// A persisted package version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageVersion {
    pub id: PackageVersionId,
    pub key: PackageVersionKey,
    pub provenance: Provenance,
    pub inserted_at: DateTime<Utc>,
}

impl PackageVersion {
    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn version(&self) -> &str {
        &self.key.version
    }

    pub fn language(&self) -> Language {
        self.key.language
    }
}
