pub mod client;
pub mod config;
pub mod metrics_defs;
pub mod types;
pub mod webhooks;

#[cfg(test)]
mod testutils;

pub use client::{FetchError, RecordFetcher, UpstreamClient};
pub use types::{AppEntry, Record, RecordError, UserType};
