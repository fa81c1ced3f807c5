//! Cache of derived per-package blobs: file listings, log excerpts and
//! historical package files.
//!
//! Archives are opened lazily and kept until [`ResultCache::clear`]; an
//! archive that fails while being read is dropped so the next lookup reopens
//! it.

mod archive;
mod listing;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, warn};

use crate::database::Package;
use crate::http::Fetcher;
use crate::runtime::Runtime;

pub use archive::{ArchiveKind, ArchiveLoader, BlobStore, ZipArchiveLoader, ZipStore};
pub use listing::{PackageFile, parse_index, sort_newest_first};
#[cfg(test)]
pub use archive::{MockArchiveLoader, MockBlobStore};

/// One archive slot; `None` until the archive is opened.
type Slot = Arc<Mutex<Option<Box<dyn BlobStore>>>>;

pub struct ResultCache {
    loader: Arc<dyn ArchiveLoader>,
    runtime: Arc<dyn Runtime>,
    fetcher: Fetcher,
    dir: PathBuf,
    archive_url: String,
    offline: AtomicBool,
    stores: Mutex<HashMap<ArchiveKind, Slot>>,
}

impl ResultCache {
    pub fn new(
        loader: Arc<dyn ArchiveLoader>,
        runtime: Arc<dyn Runtime>,
        fetcher: Fetcher,
        dir: PathBuf,
        archive_url: &str,
    ) -> Self {
        Self {
            loader,
            runtime,
            fetcher,
            dir,
            archive_url: archive_url.trim_end_matches('/').to_string(),
            offline: AtomicBool::new(false),
            stores: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    /// Closes every open archive.
    pub fn clear(&self) {
        self.stores.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// True if at least one readable file list archive exists.
    pub fn has_files(&self) -> bool {
        let pattern = self.dir.join("*.files.zip");
        match self.runtime.glob(&pattern.to_string_lossy()) {
            Ok(paths) => !paths.is_empty(),
            Err(e) => {
                debug!("Failed to look for file archives: {:#}", e);
                false
            }
        }
    }

    fn slot(&self, kind: &ArchiveKind) -> Slot {
        let mut stores = self.stores.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(stores.entry(kind.clone()).or_default())
    }

    fn read(&self, kind: &ArchiveKind, key: &str) -> Option<Vec<u8>> {
        let slot = self.slot(kind);
        let mut slot = slot.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_none() {
            match self.loader.open(kind) {
                Ok(store) => *slot = Some(store),
                Err(e) => {
                    debug!("Archive {} unavailable: {}", kind.file_name(), e);
                    return None;
                }
            }
        }
        let store = slot.as_mut()?;
        match store.read(key) {
            Ok(data) => data,
            Err(e) => {
                warn!("Failed to read {} from {}: {}", key, kind.file_name(), e);
                *slot = None;
                None
            }
        }
    }

    /// Newline separated file list of `package`.
    ///
    /// Installed packages carry their own list; others are looked up in the
    /// repository's file archive.
    pub fn files(&self, package: &Package) -> Option<String> {
        if package.is_installed() {
            return Some(package.files.join("\n"));
        }
        let data = self.read(&ArchiveKind::Files(package.repository.clone()), &package.full_name())?;
        Some(String::from_utf8_lossy(&data).into_owned())
    }

    /// Log lines mentioning any of `names`, ordered by timestamp.
    pub fn log(&self, names: &[String]) -> Option<String> {
        let mut lines = Vec::new();
        let mut found = false;
        for name in names {
            if let Some(data) = self.read(&ArchiveKind::Log, name) {
                found = true;
                lines.extend(String::from_utf8_lossy(&data).lines().map(str::to_string));
            }
        }
        if !found {
            return None;
        }
        lines.sort_by(|a, b| timestamp(a).cmp(timestamp(b)));
        Some(lines.join("\n"))
    }

    /// Known package files for each of `names`, newest version first.
    ///
    /// Local package cache entries come first, followed by files listed in the
    /// remote package archive. The remote listing is best effort.
    #[tracing::instrument(skip(self, names))]
    pub async fn history(&self, arch: &str, names: &[String]) -> Vec<Vec<String>> {
        let architectures = if arch == "any" {
            vec![std::env::consts::ARCH.to_string(), "any".to_string()]
        } else {
            vec![arch.to_string(), "any".to_string()]
        };

        let mut sources: Vec<Vec<String>> = names
            .iter()
            .map(|name| {
                let mut source = Vec::new();
                for arch in &architectures {
                    let key = format!("{}/{}", name, arch);
                    if let Some(data) = self.read(&ArchiveKind::PackageCache, &key) {
                        source.extend(String::from_utf8_lossy(&data).lines().map(str::to_string));
                    }
                }
                source
            })
            .collect();

        if !self.is_offline() && !self.archive_url.is_empty() {
            let urls: Vec<String> = names.iter().map(|name| self.listing_url(name)).collect();
            match self.fetcher.fetch(urls.clone(), true).await {
                Ok(downloads) => {
                    for (index, url) in urls.iter().enumerate() {
                        let Some(data) = downloads.get(url) else {
                            continue;
                        };
                        let files = parse_index(&String::from_utf8_lossy(data));
                        for arch in &architectures {
                            let key = format!("{}/{}", names[index], arch);
                            for file in files.get(&key).into_iter().flatten() {
                                sources[index].push(format!("{}{}", url, file));
                            }
                        }
                    }
                }
                Err(e) => debug!("Archive listing failed: {}", e),
            }
        }

        for source in &mut sources {
            sort_newest_first(source);
        }
        sources
    }

    fn listing_url(&self, name: &str) -> String {
        let initial = name.chars().next().map(String::from).unwrap_or_default();
        format!("{}/packages/{}/{}/", self.archive_url, initial, name)
    }
}

fn timestamp(line: &str) -> &str {
    line.split(']').next().unwrap_or(line)
}
