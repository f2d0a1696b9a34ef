//! Release download coordinator
//!
//! Per repository: resolve target, compare against the store, filter
//! assets, fetch, then persist. Repository failures are contained and
//! reported in the summary; only an unreachable store aborts the run.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::{RepositoryOverride, TrackerConfig, seconds};
use crate::coordinator::filter::AssetFilter;
use crate::coordinator::outcome::{
    DownloadedAsset, NoMatchReason, RepositoryOutcome, RepositoryReport, RunError, RunSummary,
};
use crate::coordinator::retention::prune_versions;
use crate::coordinator::select::{Selection, select_release};
use crate::coordinator::throttle::Throttle;
use crate::fetch::retry::run_with_retry;
use crate::fetch::{AssetFetcher, FetchRequest, RetryPolicy, Sleeper, TokioSleeper};
use crate::release::{AssetRecord, ReleaseRecord, ReleaseSource, RepositoryId, SourceError};
use crate::store::{StoreError, UpdateMetadata, VersionStore};
use crate::version::{Newness, Version, check_newer, compare};

/// Settings that shape a run, immutable once the coordinator is built
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorOptions {
    pub include_prereleases: bool,
    pub rate_limit_delay: Duration,
    /// Zero keeps every fetched release
    pub max_releases_per_repo: usize,
    pub max_concurrent_repositories: usize,
    pub run_budget: Option<Duration>,
    pub download_enabled: bool,
    pub download_directory: PathBuf,
    pub asset_patterns: Vec<String>,
    pub verify_checksums: bool,
    pub retry: RetryPolicy,
    pub keep_versions: usize,
    pub cleanup_old_versions: bool,
    pub max_parallel_downloads: usize,
    pub overrides: IndexMap<String, RepositoryOverride>,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self::from(&TrackerConfig::default())
    }
}

impl From<&TrackerConfig> for CoordinatorOptions {
    fn from(config: &TrackerConfig) -> Self {
        let settings = &config.settings;
        let download = &config.download;
        Self {
            include_prereleases: settings.include_prereleases,
            rate_limit_delay: seconds(settings.rate_limit_delay).unwrap_or(Duration::ZERO),
            max_releases_per_repo: settings.max_releases_per_repo,
            max_concurrent_repositories: settings.max_concurrent_repositories,
            run_budget: settings.run_budget.and_then(seconds),
            download_enabled: download.enabled,
            download_directory: download.directory.clone(),
            asset_patterns: download.asset_patterns.clone(),
            verify_checksums: download.verify_checksums,
            retry: config.retry_policy(),
            keep_versions: download.keep_versions,
            cleanup_old_versions: download.cleanup_old_versions,
            max_parallel_downloads: download.max_parallel_downloads,
            overrides: download.repository_overrides.clone(),
        }
    }
}

/// Effective per-repository rules after applying overrides
#[derive(Debug, Clone)]
struct RepositoryPlan {
    pin: Option<String>,
    filter: AssetFilter,
    include_prereleases: bool,
}

#[derive(Debug, Error)]
enum RepositoryError {
    #[error("release listing failed after {attempts} attempt(s): {source}")]
    Source { attempts: u32, source: SourceError },

    #[error("version store error: {0}")]
    Store(#[from] StoreError),

    #[error("refusing unsafe {kind} '{value}'")]
    UnsafePath { kind: &'static str, value: String },
}

pub struct ReleaseCoordinator {
    options: CoordinatorOptions,
    source: Arc<dyn ReleaseSource>,
    store: Arc<dyn VersionStore>,
    fetcher: Arc<dyn AssetFetcher>,
    sleeper: Arc<dyn Sleeper>,
    throttle: Throttle,
    default_plan: RepositoryPlan,
    plans: HashMap<String, RepositoryPlan>,
}

impl ReleaseCoordinator {
    pub fn new(
        options: CoordinatorOptions,
        source: Arc<dyn ReleaseSource>,
        store: Arc<dyn VersionStore>,
        fetcher: Arc<dyn AssetFetcher>,
    ) -> Result<Self, RunError> {
        let compile = |patterns: &[String]| {
            AssetFilter::new(patterns).map_err(|e| RunError::InvalidOptions(e.to_string()))
        };

        let default_plan = RepositoryPlan {
            pin: None,
            filter: compile(options.asset_patterns.as_slice())?,
            include_prereleases: options.include_prereleases,
        };

        let mut plans = HashMap::new();
        for (key, override_) in &options.overrides {
            let id: RepositoryId = key
                .parse()
                .map_err(|e| RunError::InvalidOptions(format!("{}", e)))?;
            let filter = match &override_.asset_patterns {
                Some(patterns) => compile(patterns.as_slice())?,
                None => default_plan.filter.clone(),
            };
            plans.insert(
                id.key(),
                RepositoryPlan {
                    pin: override_
                        .target_version
                        .as_deref()
                        .map(str::trim)
                        .filter(|v| !v.is_empty())
                        .map(str::to_string),
                    filter,
                    include_prereleases: override_
                        .include_prereleases
                        .unwrap_or(options.include_prereleases),
                },
            );
        }

        let sleeper: Arc<dyn Sleeper> = Arc::new(TokioSleeper);
        Ok(Self {
            throttle: Throttle::new(options.rate_limit_delay, Arc::clone(&sleeper)),
            options,
            source,
            store,
            fetcher,
            sleeper,
            default_plan,
            plans,
        })
    }

    /// Replace the sleeper used for throttling and backoff
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.throttle = Throttle::new(self.options.rate_limit_delay, Arc::clone(&sleeper));
        self.sleeper = sleeper;
        self
    }

    /// Evaluate every repository and report outcomes in input order
    pub async fn run(&self, repositories: &[RepositoryId]) -> Result<RunSummary, RunError> {
        let started_at = Utc::now();
        let backend = self.store.backend_name();

        let probe = run_with_retry(
            &self.options.retry,
            self.sleeper.as_ref(),
            "version store probe",
            |_| self.store.list_all(),
        )
        .await;
        let tracked = probe
            .result
            .map_err(|source| RunError::StoreUnreachable { backend, source })?;
        info!(
            "Checking {} repositories ({} tracked in {} store)",
            repositories.len(),
            tracked.len(),
            backend
        );

        // A budget too large to represent as an instant means no deadline
        let deadline = self
            .options
            .run_budget
            .and_then(|budget| Instant::now().checked_add(budget));
        let reports: Vec<RepositoryReport> = stream::iter(repositories)
            .map(|repository| self.process_repository(repository, deadline))
            .buffered(self.options.max_concurrent_repositories.max(1))
            .collect()
            .await;

        let summary = RunSummary::new(backend, started_at, Utc::now(), reports);
        info!(
            "Run finished: {} downloaded, {} detected, {} skipped, {} failed",
            summary.totals.downloaded,
            summary.totals.detected,
            summary.totals.skipped,
            summary.totals.failed
        );
        Ok(summary)
    }

    async fn process_repository(
        &self,
        repository: &RepositoryId,
        deadline: Option<Instant>,
    ) -> RepositoryReport {
        let outcome = if deadline.is_some_and(|d| Instant::now() >= d) {
            warn!("Run budget exhausted before {} started", repository);
            RepositoryOutcome::SkippedBudgetExhausted
        } else {
            self.evaluate(repository).await.unwrap_or_else(|e| {
                error!("{} failed: {}", repository, e);
                RepositoryOutcome::failed(e.to_string())
            })
        };

        RepositoryReport {
            repository: repository.clone(),
            outcome,
        }
    }

    fn plan_for(&self, repository: &RepositoryId) -> &RepositoryPlan {
        self.plans
            .get(&repository.key())
            .unwrap_or(&self.default_plan)
    }

    async fn list_releases(
        &self,
        repository: &RepositoryId,
        include_prereleases: bool,
    ) -> Result<Vec<ReleaseRecord>, RepositoryError> {
        let label = format!("release listing for {}", repository);
        let outcome = run_with_retry(
            &self.options.retry,
            self.sleeper.as_ref(),
            &label,
            |_| async move {
                self.throttle.wait().await;
                self.source
                    .list_releases(&repository.owner, &repository.name, include_prereleases)
                    .await
            },
        )
        .await;

        let mut releases = outcome.result.map_err(|source| RepositoryError::Source {
            attempts: outcome.attempts,
            source,
        })?;
        if self.options.max_releases_per_repo > 0 {
            releases.truncate(self.options.max_releases_per_repo);
        }
        Ok(releases)
    }

    async fn evaluate(
        &self,
        repository: &RepositoryId,
    ) -> Result<RepositoryOutcome, RepositoryError> {
        let plan = self.plan_for(repository);

        // A pin may name a prerelease, so list everything when pinned
        let releases = self
            .list_releases(repository, plan.pin.is_some() || plan.include_prereleases)
            .await?;
        debug!("{}: {} releases fetched", repository, releases.len());

        let selection = select_release(&releases, plan.pin.as_deref(), plan.include_prereleases);
        let (release, pinned) = match selection {
            Selection::Pinned(release) => (release, true),
            Selection::Latest(release) => (release, false),
            Selection::PinNotFound => {
                let target = plan.pin.clone().unwrap_or_default();
                warn!(
                    "{}: target version {} not found among {} releases",
                    repository,
                    target,
                    releases.len()
                );
                return Ok(RepositoryOutcome::SkippedNoMatch {
                    reason: NoMatchReason::PinNotFound { target },
                });
            }
            Selection::NoEligibleRelease => {
                info!("{}: no release matches the prerelease policy", repository);
                return Ok(RepositoryOutcome::SkippedNoMatch {
                    reason: NoMatchReason::NoEligibleRelease,
                });
            }
        };

        let candidate = Version::parse(&release.tag_name);
        let current = self.current_version(repository).await?;
        if !self.should_proceed(repository, &candidate, current.as_ref(), pinned) {
            return Ok(RepositoryOutcome::SkippedNotNewer {
                candidate: release.tag_name.clone(),
                current: current.map(|v| v.raw().to_string()),
            });
        }

        if !self.options.download_enabled {
            self.persist(repository, &release.tag_name, Vec::new(), pinned)
                .await?;
            info!("{}: new release {} detected", repository, release.tag_name);
            return Ok(RepositoryOutcome::Detected {
                version: release.tag_name.clone(),
            });
        }

        let assets = plan.filter.apply(&release.assets);
        if assets.is_empty() {
            info!(
                "{}: release {} has no assets matching the configured patterns",
                repository, release.tag_name
            );
            return Ok(RepositoryOutcome::SkippedNoMatch {
                reason: NoMatchReason::NoAssetsMatched {
                    version: release.tag_name.clone(),
                },
            });
        }

        let version_dir = self.version_dir(repository, &release.tag_name)?;
        for asset in &assets {
            check_path_component("asset name", &asset.name)?;
        }

        let (downloaded, failures) = self.fetch_assets(repository, &version_dir, &assets).await;
        if !failures.is_empty() {
            let reason = format!(
                "{} of {} assets failed: {}",
                failures.len(),
                assets.len(),
                failures.join("; ")
            );
            warn!(
                "{}: {}; keeping {} downloaded file(s), store not updated",
                repository,
                reason,
                downloaded.len()
            );
            return Ok(RepositoryOutcome::Failed {
                reason,
                kept_assets: downloaded,
            });
        }

        let names = downloaded.iter().map(|a| a.name.clone()).collect();
        if let Err(e) = self.persist(repository, &release.tag_name, names, pinned).await {
            return Ok(RepositoryOutcome::Failed {
                reason: format!("downloaded but could not record version: {}", e),
                kept_assets: downloaded,
            });
        }
        info!(
            "{}: downloaded {} asset(s) for {}",
            repository,
            downloaded.len(),
            release.tag_name
        );

        if self.options.cleanup_old_versions {
            self.cleanup(repository, &release.tag_name).await;
        }

        Ok(RepositoryOutcome::Downloaded {
            version: release.tag_name.clone(),
            assets: downloaded,
        })
    }

    /// Decide whether the selected release needs work.
    ///
    /// A pinned release proceeds unless it is already current. Otherwise the
    /// candidate must be strictly newer; incomparable versions are skipped
    /// with a warning.
    fn should_proceed(
        &self,
        repository: &RepositoryId,
        candidate: &Version,
        current: Option<&Version>,
        pinned: bool,
    ) -> bool {
        if pinned {
            let already_current = current
                .is_some_and(|c| compare(candidate, c) == Some(Ordering::Equal));
            if already_current {
                debug!("{}: pinned version {} is already current", repository, candidate);
            }
            return !already_current;
        }

        match check_newer(candidate, current) {
            Newness::Newer => true,
            Newness::NotNewer => {
                debug!(
                    "{}: {} is not newer than {}",
                    repository,
                    candidate,
                    current.map(|c| c.raw()).unwrap_or("-")
                );
                false
            }
            Newness::Incomparable => {
                warn!(
                    "{}: cannot order {} ({}) against current {} ({}); treating as not newer",
                    repository,
                    candidate,
                    candidate.kind().name(),
                    current.map(|c| c.raw()).unwrap_or("-"),
                    current.map(|c| c.kind().name()).unwrap_or("-")
                );
                false
            }
        }
    }

    fn repository_dir(&self, repository: &RepositoryId) -> Result<PathBuf, RepositoryError> {
        check_path_component("repository owner", &repository.owner)?;
        check_path_component("repository name", &repository.name)?;
        Ok(self
            .options
            .download_directory
            .join(&repository.owner)
            .join(&repository.name))
    }

    fn version_dir(
        &self,
        repository: &RepositoryId,
        tag: &str,
    ) -> Result<PathBuf, RepositoryError> {
        check_path_component("release tag", tag)?;
        Ok(self.repository_dir(repository)?.join(tag))
    }

    /// Fetch assets with bounded parallelism; returns successes and failure descriptions
    async fn fetch_assets(
        &self,
        repository: &RepositoryId,
        version_dir: &Path,
        assets: &[&AssetRecord],
    ) -> (Vec<DownloadedAsset>, Vec<String>) {
        let results: Vec<_> = stream::iter(assets)
            .map(|asset| async move {
                let request = FetchRequest {
                    url: asset.download_url.clone(),
                    destination: version_dir.join(&asset.name),
                    expected_size: (asset.size > 0).then_some(asset.size),
                    expected_sha256: if self.options.verify_checksums {
                        asset.expected_sha256()
                    } else {
                        None
                    },
                };
                (asset, self.fetcher.fetch(&request).await)
            })
            .buffered(self.options.max_parallel_downloads.max(1))
            .collect()
            .await;

        let mut downloaded = Vec::new();
        let mut failures = Vec::new();
        for (asset, result) in results {
            match result {
                Ok(fetched) => downloaded.push(DownloadedAsset {
                    name: asset.name.clone(),
                    path: fetched.path,
                    size: fetched.size,
                    sha256: fetched.sha256,
                    checksum_verified: fetched.checksum_verified,
                    attempts: fetched.attempts,
                }),
                Err(e) => {
                    warn!("{}: asset {} failed: {}", repository, asset.name, e);
                    failures.push(format!("{}: {}", asset.name, e));
                }
            }
        }
        (downloaded, failures)
    }

    /// Read the recorded version, retrying while the store is contended
    async fn current_version(
        &self,
        repository: &RepositoryId,
    ) -> Result<Option<Version>, StoreError> {
        let label = format!("store read for {}", repository);
        run_with_retry(&self.options.retry, self.sleeper.as_ref(), &label, |_| {
            self.store.get_current_version(&repository.owner, &repository.name)
        })
        .await
        .result
    }

    async fn persist(
        &self,
        repository: &RepositoryId,
        version: &str,
        assets: Vec<String>,
        pinned: bool,
    ) -> Result<(), StoreError> {
        let label = format!("store update for {}", repository);
        let metadata = UpdateMetadata { assets, pinned };
        let metadata = &metadata;
        run_with_retry(&self.options.retry, self.sleeper.as_ref(), &label, |_| {
            self.store.update_version(
                &repository.owner,
                &repository.name,
                version,
                metadata.clone(),
            )
        })
        .await
        .result
    }

    async fn cleanup(&self, repository: &RepositoryId, current: &str) {
        let repository_dir = match self.repository_dir(repository) {
            Ok(dir) => dir,
            Err(e) => {
                warn!("{}: skipping cleanup: {}", repository, e);
                return;
            }
        };
        let keep = self.options.keep_versions;
        let current = current.to_string();
        let result = tokio::task::spawn_blocking(move || {
            prune_versions(&repository_dir, keep, &current)
        })
        .await;
        match result {
            Ok(Ok(removed)) if !removed.is_empty() => {
                info!("{}: removed {} old version(s)", repository, removed.len())
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!("{}: cleanup failed: {}", repository, e),
            Err(e) => warn!("{}: cleanup task failed: {}", repository, e),
        }
    }
}

/// Reject values that would escape the download directory
fn check_path_component(kind: &'static str, value: &str) -> Result<(), RepositoryError> {
    let unsafe_value = value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(['/', '\\'])
        || value.contains('\0');
    if unsafe_value {
        return Err(RepositoryError::UnsafePath {
            kind,
            value: value.to_string(),
        });
    }
    Ok(())
}
