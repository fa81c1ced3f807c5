//! Client for the remote package database RPC interface (v5).

mod types;

use anyhow::Context;
use async_trait::async_trait;
use log::debug;
use reqwest::Url;

use crate::error::{FetchError, Result};
use crate::http::Fetcher;

pub use types::{Envelope, RemoteInfo, RemotePackage, RemoteQuery, SearchField};

/// Maximum number of names in one `info` request.
pub const MAX_INFO_ARGS: usize = 300;

/// Source of remote package metadata.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Runs every query concurrently and returns all reported packages.
    async fn query(&self, requests: Vec<RemoteQuery>) -> Result<Vec<RemotePackage>>;
}

pub struct RemoteClient {
    fetcher: Fetcher,
    rpc: Url,
    offline: bool,
}

impl RemoteClient {
    /// `domain` is the site root; requests go to `<domain>/rpc`.
    pub fn new(fetcher: Fetcher, domain: &str, offline: bool) -> anyhow::Result<Self> {
        let rpc = Url::parse(&format!("{}/rpc", domain.trim_end_matches('/')))
            .with_context(|| format!("Invalid remote database URL: {}", domain))?;
        Ok(Self {
            fetcher,
            rpc,
            offline,
        })
    }

    /// Expands the queries into request URLs, batching `info` names.
    pub fn urls(&self, requests: &[RemoteQuery]) -> Vec<String> {
        let mut urls = Vec::new();
        for request in requests {
            match request {
                RemoteQuery::Info(names) => {
                    for batch in names.chunks(MAX_INFO_ARGS) {
                        let mut url = self.rpc.clone();
                        {
                            let mut pairs = url.query_pairs_mut();
                            pairs.append_pair("v", "5").append_pair("type", "info");
                            for name in batch {
                                pairs.append_pair("arg[]", name);
                            }
                        }
                        urls.push(url.to_string());
                    }
                }
                RemoteQuery::Search { by, arg } => {
                    let mut url = self.rpc.clone();
                    url.query_pairs_mut()
                        .append_pair("v", "5")
                        .append_pair("type", "search")
                        .append_pair("by", by.as_str())
                        .append_pair("arg", arg);
                    urls.push(url.to_string());
                }
            }
        }
        urls
    }
}

#[async_trait]
impl RemoteSource for RemoteClient {
    #[tracing::instrument(skip(self, requests))]
    async fn query(&self, requests: Vec<RemoteQuery>) -> Result<Vec<RemotePackage>> {
        if self.offline {
            debug!("Offline, skipping {} remote queries", requests.len());
            return Ok(Vec::new());
        }
        let urls = self.urls(&requests);
        let mut payloads = self.fetcher.fetch(urls.clone(), false).await?;

        let mut packages = Vec::new();
        for url in urls {
            let Some(data) = payloads.remove(&url) else {
                continue;
            };
            let envelope: Envelope = serde_json::from_slice(&data)
                .map_err(|e| FetchError::api(&url, format!("Invalid response: {}", e)))?;
            if envelope.kind == "error" {
                let message = envelope.error.unwrap_or_else(|| "Unknown error".to_string());
                return Err(FetchError::api(url, message).into());
            }
            debug!("{} results from {}", envelope.resultcount, url);
            packages.extend(envelope.results);
        }
        Ok(packages)
    }
}
