//! Version classification and ordering
//!
//! Release tags come in many shapes. This module turns a tag into a
//! [`Version`] (SemVer, CalVer, Numeric or Opaque) and defines the ordering
//! used to decide whether a release is newer than what was recorded.
//!
//! # Modules
//!
//! - [`parse`]: priority-ordered classification of raw tags
//! - [`compare`]: ordering between classified versions and the "is newer" check

pub mod compare;
pub mod parse;

pub use compare::{Newness, check_newer, compare, is_newer};
pub use parse::{CalVer, Version, VersionKind, normalize_tag};
