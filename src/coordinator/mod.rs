//! Release download coordination
//!
//! # Modules
//!
//! - [`runner`]: `ReleaseCoordinator` and its options
//! - [`select`]: pinned or latest target selection
//! - [`filter`]: ordered glob include/exclude asset filter
//! - [`retention`]: pruning of old version directories
//! - [`throttle`]: spacing of release-list calls
//! - [`outcome`]: per-repository outcomes and the run summary

pub mod filter;
pub mod outcome;
pub mod retention;
pub mod runner;
pub mod select;
pub mod throttle;

pub use filter::AssetFilter;
pub use outcome::{
    DownloadedAsset, NoMatchReason, RepositoryOutcome, RepositoryReport, RunError, RunSummary,
    SummaryTotals,
};
pub use runner::{CoordinatorOptions, ReleaseCoordinator};
pub use select::{Selection, select_release};
