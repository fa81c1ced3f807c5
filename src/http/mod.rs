//! HTTP plumbing: client construction, error classification and the
//! concurrent fetcher.

mod classify;
mod fetcher;

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;

pub use classify::classify_error;
pub use fetcher::Fetcher;

pub const USER_AGENT: &str = concat!("pkgquery/", env!("PKGQUERY_VERSION"));

/// Default number of concurrent download workers.
pub const MAX_WORKERS: usize = 10;

/// Default per-request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Builds the shared HTTP client.
pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}
