pub mod config;
pub mod coordinator;
pub mod fetch;
pub mod logging;
pub mod release;
pub mod store;
pub mod version;
