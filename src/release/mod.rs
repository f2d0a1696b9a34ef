//! Normalized release data consumed by the coordinator
//!
//! Release listing itself is done by an external API client. The coordinator
//! only sees [`ReleaseRecord`]s through the [`ReleaseSource`] trait.
//!
//! # Modules
//!
//! - [`types`]: repository identifiers, release and asset records
//! - [`source`]: the `ReleaseSource` trait
//! - [`json_file`]: release source backed by a JSON export
//! - [`error`]: error types for release listing

pub mod error;
pub mod json_file;
pub mod source;
pub mod types;

pub use error::SourceError;
pub use json_file::JsonFileReleaseSource;
pub use source::ReleaseSource;
pub use types::{AssetRecord, ParseRepositoryIdError, ReleaseRecord, RepositoryId};
