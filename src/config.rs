use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fetch::RetryPolicy;
use crate::release::RepositoryId;

// =============================================================================
// Defaults
// =============================================================================

pub const APP_NAME: &str = "release-tracker";

/// Spacing between release-list calls in seconds
pub const DEFAULT_RATE_LIMIT_DELAY_SECS: f64 = 1.0;

/// Releases considered per repository, newest first
pub const DEFAULT_MAX_RELEASES_PER_REPO: usize = 10;

/// Per-call network timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_MAX_CONCURRENT_REPOSITORIES: usize = 4;

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Base backoff delay in seconds
pub const DEFAULT_RETRY_DELAY_SECS: f64 = 1.0;

pub const DEFAULT_KEEP_VERSIONS: usize = 5;

pub const DEFAULT_MAX_PARALLEL_DOWNLOADS: usize = 2;

pub const DEFAULT_REMOTE_KEY: &str = "release-tracker/versions.json";

/// Upper bound for delay settings in seconds (one day)
pub const MAX_DELAY_SECS: f64 = 86_400.0;

const TARGET_ENV_PREFIX: &str = "RELEASE_TRACKER_TARGET_";
const STORE_TOKEN_ENV: &str = "RELEASE_TRACKER_STORE_TOKEN";
const ARTIFACTORY_API_KEY_ENV: &str = "ARTIFACTORY_API_KEY";
const ARTIFACTORY_USERNAME_ENV: &str = "ARTIFACTORY_USERNAME";
const ARTIFACTORY_PASSWORD_ENV: &str = "ARTIFACTORY_PASSWORD";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration document
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct TrackerConfig {
    pub settings: Settings,
    pub download: DownloadConfig,
    pub storage: StorageConfig,
    pub repositories: Vec<RepositoryConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub include_prereleases: bool,
    /// Seconds between release-list calls
    pub rate_limit_delay: f64,
    pub max_releases_per_repo: usize,
    /// Seconds
    pub request_timeout: u64,
    pub max_concurrent_repositories: usize,
    /// Wall-clock budget for a whole run, in seconds
    pub run_budget: Option<f64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            include_prereleases: false,
            rate_limit_delay: DEFAULT_RATE_LIMIT_DELAY_SECS,
            max_releases_per_repo: DEFAULT_MAX_RELEASES_PER_REPO,
            request_timeout: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_concurrent_repositories: DEFAULT_MAX_CONCURRENT_REPOSITORIES,
            run_budget: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DownloadConfig {
    /// When false, new releases are only recorded, never downloaded
    pub enabled: bool,
    pub directory: PathBuf,
    pub asset_patterns: Vec<String>,
    pub verify_checksums: bool,
    pub retry_attempts: u32,
    pub retry_delay: f64,
    pub keep_versions: usize,
    pub cleanup_old_versions: bool,
    pub max_parallel_downloads: usize,
    /// Keyed by `owner/repo`, in file order
    pub repository_overrides: IndexMap<String, RepositoryOverride>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: PathBuf::from("./downloads"),
            asset_patterns: vec!["*".to_string()],
            verify_checksums: true,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY_SECS,
            keep_versions: DEFAULT_KEEP_VERSIONS,
            cleanup_old_versions: false,
            max_parallel_downloads: DEFAULT_MAX_PARALLEL_DOWNLOADS,
            repository_overrides: IndexMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct RepositoryOverride {
    pub target_version: Option<String>,
    pub asset_patterns: Option<Vec<String>>,
    pub include_prereleases: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    Local {
        #[serde(default)]
        path: Option<PathBuf>,
    },
    S3 {
        endpoint: String,
        bucket: String,
        #[serde(default = "default_remote_key")]
        key: String,
        #[serde(default)]
        bearer_token: Option<String>,
        #[serde(default = "default_true")]
        conditional_writes: bool,
    },
    Artifactory {
        base_url: String,
        repository: String,
        #[serde(default = "default_remote_key")]
        path: String,
        #[serde(default)]
        token: Option<String>,
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        password: Option<String>,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Local { path: None }
    }
}

fn default_remote_key() -> String {
    DEFAULT_REMOTE_KEY.to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepositoryConfig {
    pub owner: String,
    pub repo: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl TrackerConfig {
    /// Read a configuration file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply environment overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let keys: Vec<(String, String)> = self
            .repositories
            .iter()
            .map(|r| (r.owner.clone(), r.repo.clone()))
            .chain(
                self.download
                    .repository_overrides
                    .keys()
                    .filter_map(|k| k.parse::<RepositoryId>().ok())
                    .map(|id| (id.owner, id.name)),
            )
            .collect();
        for (owner, repo) in keys {
            if let Some(version) = non_empty(&target_env_var(&owner, &repo)) {
                self.download
                    .repository_overrides
                    .entry(format!("{}/{}", owner, repo))
                    .or_default()
                    .target_version = Some(version.trim().to_string());
            }
        }

        match &mut self.storage {
            StorageConfig::Local { .. } => {}
            StorageConfig::S3 { bearer_token, .. } => {
                if bearer_token.as_deref().is_none_or(str::is_empty)
                    && let Some(token) = non_empty(STORE_TOKEN_ENV)
                {
                    *bearer_token = Some(token);
                }
            }
            StorageConfig::Artifactory {
                token,
                username,
                password,
                ..
            } => {
                for (slot, var) in [
                    (token, ARTIFACTORY_API_KEY_ENV),
                    (username, ARTIFACTORY_USERNAME_ENV),
                    (password, ARTIFACTORY_PASSWORD_ENV),
                ] {
                    if slot.as_deref().is_none_or(str::is_empty)
                        && let Some(value) = non_empty(var)
                    {
                        *slot = Some(value);
                    }
                }
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.download.retry_attempts < 1 {
            return invalid("download.retry_attempts must be at least 1".to_string());
        }
        for (name, value) in [
            ("settings.rate_limit_delay", self.settings.rate_limit_delay),
            ("download.retry_delay", self.download.retry_delay),
        ] {
            if seconds(value).is_none() || value > MAX_DELAY_SECS {
                return invalid(format!(
                    "{} must be between 0 and {} seconds, got {}",
                    name, MAX_DELAY_SECS, value
                ));
            }
        }
        if let Some(budget) = self.settings.run_budget
            && (budget <= 0.0 || seconds(budget).is_none())
        {
            return invalid(format!(
                "settings.run_budget must be a positive number, got {}",
                budget
            ));
        }
        if self.settings.request_timeout == 0 {
            return invalid("settings.request_timeout must be at least 1 second".to_string());
        }
        if self.settings.max_concurrent_repositories == 0 {
            return invalid("settings.max_concurrent_repositories must be at least 1".to_string());
        }
        if self.download.max_parallel_downloads == 0 {
            return invalid("download.max_parallel_downloads must be at least 1".to_string());
        }

        check_patterns("download.asset_patterns", &self.download.asset_patterns)?;
        for (key, override_) in &self.download.repository_overrides {
            key.parse::<RepositoryId>().map_err(|e| {
                ConfigError::Invalid(format!("repository override '{}': {}", key, e))
            })?;
            if let Some(patterns) = &override_.asset_patterns {
                check_patterns(&format!("repository_overrides.{}", key), patterns)?;
            }
        }

        for repository in &self.repositories {
            if repository.owner.trim().is_empty() || repository.repo.trim().is_empty() {
                return invalid(format!(
                    "repository entry '{}/{}' needs both owner and repo",
                    repository.owner, repository.repo
                ));
            }
        }

        match &self.storage {
            StorageConfig::Local { .. } => {}
            StorageConfig::S3 {
                endpoint, bucket, ..
            } => {
                if endpoint.trim().is_empty() || bucket.trim().is_empty() {
                    return invalid("s3 storage needs an endpoint and a bucket".to_string());
                }
            }
            StorageConfig::Artifactory {
                base_url,
                repository,
                ..
            } => {
                if base_url.trim().is_empty() || repository.trim().is_empty() {
                    return invalid(
                        "artifactory storage needs a base_url and a repository".to_string(),
                    );
                }
            }
        }

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let base_delay =
            seconds(self.download.retry_delay).unwrap_or_else(|| RetryPolicy::default().base_delay);
        RetryPolicy::new(self.download.retry_attempts, base_delay)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.request_timeout)
    }

    /// Configured repositories, skipping entries that do not form a valid id
    pub fn repository_ids(&self) -> Vec<RepositoryId> {
        self.repositories
            .iter()
            .map(|r| RepositoryId::new(r.owner.trim(), r.repo.trim()))
            .filter(|id| !id.owner.is_empty() && !id.name.is_empty())
            .collect()
    }

    /// Add a repository unless it is already listed
    pub fn add_repository(&mut self, id: &RepositoryId) {
        let known = self
            .repositories
            .iter()
            .any(|r| r.owner == id.owner && r.repo == id.name);
        if !known {
            self.repositories.push(RepositoryConfig {
                owner: id.owner.clone(),
                repo: id.name.clone(),
                description: None,
            });
        }
    }
}

fn check_patterns(field: &str, patterns: &[String]) -> Result<(), ConfigError> {
    for pattern in patterns {
        let body = pattern.strip_prefix('!').unwrap_or(pattern);
        glob::Pattern::new(body).map_err(|e| {
            ConfigError::Invalid(format!("{}: bad glob pattern '{}': {}", field, pattern, e))
        })?;
    }
    Ok(())
}

/// Convert a seconds setting; `None` when negative, NaN or too large for a `Duration`
pub fn seconds(value: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(value).ok()
}

/// `RELEASE_TRACKER_TARGET_<OWNER>_<REPO>`, uppercased with
/// non-alphanumerics replaced by `_`
pub fn target_env_var(owner: &str, repo: &str) -> String {
    let sanitize = |s: &str| -> String {
        s.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect()
    };
    format!("{}{}_{}", TARGET_ENV_PREFIX, sanitize(owner), sanitize(repo))
}

/// Returns the path to the data directory for release-tracker.
/// Uses $XDG_DATA_HOME/release-tracker if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/release-tracker,
/// or ./release-tracker if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the default path of the local version database.
pub fn default_store_path() -> PathBuf {
    data_dir().join("versions.json")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join(APP_NAME)
}
