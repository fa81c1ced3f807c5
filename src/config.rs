use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use log::debug;

use crate::{
    cache::{ResultCache, ZipArchiveLoader},
    database::SnapshotProvider,
    http::{Fetcher, MAX_WORKERS, REQUEST_TIMEOUT, build_client},
    remote::RemoteClient,
    runtime::Runtime,
    search::Backend,
};

pub const DEFAULT_REMOTE_URL: &str = "https://aur.archlinux.org";
pub const DEFAULT_ARCHIVE_URL: &str = "https://archive.archlinux.org";

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub database: Option<PathBuf>,
    pub remote_url: Option<String>,
    pub archive_url: Option<String>,
    pub cache_dir: Option<PathBuf>,
    pub offline: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database: Option<PathBuf>,
    pub remote_url: String,
    pub archive_url: String,
    pub cache_dir: PathBuf,
    pub offline: bool,
    pub max_workers: usize,
    pub timeout: Duration,
}

impl Config {
    /// Resolves the configuration. Pool size and request timeout can be tuned
    /// with `PKGQUERY_MAX_WORKERS` and `PKGQUERY_TIMEOUT` (seconds).
    pub fn load(runtime: &dyn Runtime, overrides: Overrides) -> Result<Self> {
        let cache_dir = match overrides.cache_dir {
            Some(dir) => dir,
            None => runtime
                .cache_dir()
                .map(|dir| dir.join("pkgquery"))
                .context("Could not determine the cache directory, use --cache-dir")?,
        };

        let max_workers = env_value::<usize>(runtime, "PKGQUERY_MAX_WORKERS")?.unwrap_or(MAX_WORKERS);
        if max_workers == 0 {
            bail!("PKGQUERY_MAX_WORKERS must be at least 1");
        }
        let timeout = env_value::<u64>(runtime, "PKGQUERY_TIMEOUT")?
            .map(Duration::from_secs)
            .unwrap_or(REQUEST_TIMEOUT);

        let config = Self {
            database: overrides.database,
            remote_url: overrides
                .remote_url
                .unwrap_or_else(|| DEFAULT_REMOTE_URL.to_string()),
            archive_url: overrides
                .archive_url
                .unwrap_or_else(|| DEFAULT_ARCHIVE_URL.to_string()),
            cache_dir,
            offline: overrides.offline,
            max_workers,
            timeout,
        };
        debug!("Configuration: {:?}", config);
        Ok(config)
    }

    /// Wires the search engine from this configuration.
    pub fn backend(&self, runtime: Arc<dyn Runtime>) -> Result<Backend> {
        let database = self
            .database
            .clone()
            .context("No package database given, use --database or PKGQUERY_DATABASE")?;
        if !runtime.exists(&database) {
            bail!("Package database not found: {}", database.display());
        }

        let client = build_client(self.timeout)?;
        let fetcher = Fetcher::new(client, self.max_workers);
        let remote = RemoteClient::new(fetcher.clone(), &self.remote_url, self.offline)?;
        let loader = ZipArchiveLoader::new(Arc::clone(&runtime), self.cache_dir.clone());
        let cache = ResultCache::new(
            Arc::new(loader),
            Arc::clone(&runtime),
            fetcher,
            self.cache_dir.clone(),
            &self.archive_url,
        );
        let provider = SnapshotProvider::new(runtime, database);

        let backend = Backend::new(Arc::new(provider), Arc::new(remote), Arc::new(cache));
        backend.set_offline(self.offline);
        Ok(backend)
    }
}

fn env_value<T>(runtime: &dyn Runtime, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match runtime.env_var(key) {
        Ok(value) => {
            let parsed = value
                .trim()
                .parse()
                .with_context(|| format!("Invalid value for {}: {}", key, value))?;
            Ok(Some(parsed))
        }
        Err(_) => Ok(None),
    }
}
