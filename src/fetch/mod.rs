//! Asset download engine
//!
//! # Modules
//!
//! - [`fetcher`]: `AssetFetcher` trait with request/result types
//! - [`http`]: streaming HTTP implementation with verification
//! - [`retry`]: retry policy, backoff and the sleep seam
//! - [`error`]: fetch error taxonomy

pub mod error;
pub mod fetcher;
pub mod http;
pub mod retry;

pub use error::FetchError;
pub use fetcher::{AssetFetcher, FetchRequest, FetchResult};
pub use http::HttpFetcher;
pub use retry::{NoSleep, RetryPolicy, Sleeper, TokioSleeper};
