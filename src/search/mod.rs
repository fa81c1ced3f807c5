//! Search orchestration across the local, sync and remote databases.
//!
//! A search runs one blocking scan task per database location plus, when
//! remote results are requested, one async task for the remote database.
//! Results are returned directly or, when a callback is registered, delivered
//! to it later. Only one asynchronous search is outstanding at a time.

mod classify;
mod task;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use futures_util::future::join_all;
use log::{debug, info};

use crate::cache::ResultCache;
use crate::cancel::{CancelSlot, CancellationToken};
use crate::database::{DatabaseProvider, Package, PackageDatabase};
use crate::error::Result;
use crate::pattern::{Attribute, Matcher};
use crate::remote::{RemoteQuery, RemoteSource};
use crate::state::{Source, State};

pub use classify::{
    REMOTE_REPOSITORY, RemoteIndex, RepositoryStats, Summary, filter_groups, filter_packages,
    filter_remote, merge_remote, remote_record,
};
use task::{LocalScan, collect_group_members, collect_packages, find_remote, load_index};

/// Receives the outcome of an asynchronous operation.
pub type Callback = Arc<dyn Fn(Result<Vec<Summary>>) + Send + Sync>;

/// How the results of [`Backend::find`] are handed back.
#[derive(Debug)]
pub enum Delivery {
    Ready(Vec<Summary>),
    /// Results will be passed to the registered callback.
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub text: String,
    pub filter: State,
    /// Attributes to match against; empty means name only.
    pub keys: Vec<Attribute>,
}

impl SearchRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            filter: State::NONE,
            keys: Vec::new(),
        }
    }

    pub fn with_filter(mut self, filter: State) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_keys(mut self, keys: Vec<Attribute>) -> Self {
        self.keys = keys;
        self
    }

    fn keys(&self) -> Vec<Attribute> {
        if self.keys.is_empty() {
            vec![Attribute::Name]
        } else {
            self.keys.clone()
        }
    }

    fn wants_remote(&self) -> bool {
        self.filter.contains(State::REMOTE | State::NON_INSTALLED) && !self.filter.contains(State::GROUP)
    }
}

struct Inner {
    provider: Arc<dyn DatabaseProvider>,
    remote: Arc<dyn RemoteSource>,
    cache: Arc<ResultCache>,
    index: RwLock<Arc<RemoteIndex>>,
    offline: AtomicBool,
}

impl Inner {
    fn index(&self) -> Arc<RemoteIndex> {
        Arc::clone(&self.index.read().unwrap_or_else(|e| e.into_inner()))
    }

    fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    fn open(&self) -> Result<Box<dyn PackageDatabase>> {
        Ok(self.provider.open()?)
    }

    async fn blocking<T, F>(self: &Arc<Self>, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Inner, &dyn PackageDatabase) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            let db = inner.open()?;
            work(&inner, db.as_ref())
        })
        .await?
    }

    async fn search(self: Arc<Self>, request: SearchRequest, token: CancellationToken) -> Result<Vec<Summary>> {
        let keys = request.keys();
        let locations = self.blocking(|_, db| Ok(repositories(db))).await?;

        let scans = locations.into_iter().map(|location| {
            let inner = Arc::clone(&self);
            let text = request.text.clone();
            let keys = keys.clone();
            let token = token.clone();
            let filter = request.filter;
            tokio::task::spawn_blocking(move || {
                let db = inner.open()?;
                let index = inner.index();
                let scan = LocalScan {
                    db: db.as_ref(),
                    index: &index,
                    cache: &inner.cache,
                    token: &token,
                };
                scan.run(&text, filter, &keys, &location)
            })
        });

        let remote = async {
            if !request.wants_remote() || self.is_offline() {
                return Ok(Vec::new());
            }
            find_remote(self.remote.as_ref(), &self.index(), &request.text, &keys).await
        };

        let (remote, scans) = futures_util::future::join(remote, join_all(scans)).await;
        let mut output = remote?;
        for scan in scans {
            output.extend(scan??);
        }
        Ok(output)
    }

    async fn initialize(&self) -> Result<()> {
        if self.is_offline() {
            return Ok(());
        }
        let provider = Arc::clone(&self.provider);
        let names = tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
            let db = provider.open()?;
            let token = CancellationToken::new();
            let items = collect_packages(db.as_ref(), Source::LOCAL | Source::FOREIGN, None, &token, |_| true)?;
            Ok(items.into_iter().map(|(_, package)| package.name).collect())
        })
        .await??;
        let index = load_index(self.remote.as_ref(), names).await?;
        info!("Loaded remote metadata for {} packages", index.len());
        *self.index.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(index);
        Ok(())
    }

    /// Remote record of `name`, looked up with an `info` request.
    async fn fetch_remote(&self, name: &str) -> Result<Option<Package>> {
        if self.is_offline() {
            return Ok(None);
        }
        let packages = self
            .remote
            .query(vec![RemoteQuery::Info(vec![name.to_string()])])
            .await?;
        Ok(packages
            .into_iter()
            .find(|package| package.name == name)
            .map(remote_record))
    }
}

fn repositories(db: &dyn PackageDatabase) -> Vec<String> {
    let mut names = db.sync_names();
    names.push(db.local_name());
    names
}

/// Looks `name` up as installed package, sync package, provider or replacer.
fn resolve_in(db: &dyn PackageDatabase, name: &str) -> Option<Package> {
    if let Some(local) = db.package(&db.local_name(), name) {
        return Some(local);
    }
    db.sync_names()
        .iter()
        .find_map(|location| db.package(location, name))
        .or_else(|| db.find_provider(name))
        .or_else(|| db.find_replacer(name))
}

/// Entry point of the search engine.
pub struct Backend {
    inner: Arc<Inner>,
    callback: Mutex<Option<Callback>>,
    slot: Arc<CancelSlot>,
}

impl Backend {
    pub fn new(
        provider: Arc<dyn DatabaseProvider>,
        remote: Arc<dyn RemoteSource>,
        cache: Arc<ResultCache>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider,
                remote,
                cache,
                index: RwLock::new(Arc::new(RemoteIndex::new())),
                offline: AtomicBool::new(false),
            }),
            callback: Mutex::new(None),
            slot: Arc::new(CancelSlot::new()),
        }
    }

    pub fn cache(&self) -> &ResultCache {
        &self.inner.cache
    }

    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
        self.inner.cache.set_offline(offline);
    }

    /// Registers or clears the result callback.
    ///
    /// Replacing the callback with a different one cancels the outstanding
    /// asynchronous search.
    pub fn set_callback(&self, callback: Option<Callback>) {
        let mut current = self.callback.lock().unwrap_or_else(|e| e.into_inner());
        let same = match (current.as_ref(), callback.as_ref()) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if !same {
            self.slot.cancel();
        }
        *current = callback;
    }

    fn callback(&self) -> Option<Callback> {
        self.callback.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Cancels the outstanding asynchronous search. Its callback never fires.
    pub fn cancel(&self) -> bool {
        self.slot.cancel()
    }

    /// Loads remote metadata for installed foreign packages.
    ///
    /// With a callback registered the load runs in the background and its
    /// completion is reported with an empty result list.
    #[tracing::instrument(skip(self))]
    pub async fn initialize(&self) -> Result<Delivery> {
        let Some(callback) = self.callback() else {
            self.inner.initialize().await?;
            return Ok(Delivery::Ready(Vec::new()));
        };
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let result = inner.initialize().await.map(|_| Vec::new());
            callback(result);
        });
        Ok(Delivery::Pending)
    }

    /// Runs a search and returns its results directly.
    #[tracing::instrument(skip(self), fields(text = %request.text))]
    pub async fn search(&self, request: SearchRequest) -> Result<Vec<Summary>> {
        Matcher::new(&request.text, &request.keys())?;
        Arc::clone(&self.inner)
            .search(request, CancellationToken::new())
            .await
    }

    /// Runs a search, delivering through the callback when one is registered.
    ///
    /// Malformed query text is reported immediately in either mode.
    #[tracing::instrument(skip(self), fields(text = %request.text))]
    pub async fn find(&self, request: SearchRequest) -> Result<Delivery> {
        let Some(callback) = self.callback() else {
            return Ok(Delivery::Ready(self.search(request).await?));
        };
        Matcher::new(&request.text, &request.keys())?;

        let token = self.slot.arm();
        let inner = Arc::clone(&self.inner);
        let slot = Arc::clone(&self.slot);
        let task_token = token.clone();
        let task = tokio::spawn(async move {
            let result = inner.search(request, task_token.clone()).await;
            if task_token.is_cancelled() {
                debug!("Dropping results of cancelled search");
                return;
            }
            slot.finish(&task_token);
            callback(result);
        });
        self.slot.attach(&token, task.abort_handle());
        Ok(Delivery::Pending)
    }

    /// Sync database names followed by the local database name.
    pub async fn list_repositories(&self) -> Result<Vec<String>> {
        self.inner.blocking(|_, db| Ok(repositories(db))).await
    }

    /// Classified packages of one location, or of every database.
    ///
    /// A filter containing `foreign` lists foreign installed packages only.
    pub async fn list_packages(&self, filter: State, location: Option<String>) -> Result<Vec<Summary>> {
        self.inner
            .blocking(move |inner, db| {
                let mut filter = filter;
                let source = if filter.contains(State::FOREIGN) {
                    filter.remove(State::FOREIGN);
                    Source::LOCAL | Source::FOREIGN
                } else if location.is_some() {
                    Source::SYNC
                } else {
                    Source::SYNC | Source::LOCAL | Source::FOREIGN
                };
                let token = CancellationToken::new();
                let items = collect_packages(db, source, location.as_deref(), &token, |_| true)?;
                Ok(filter_packages(db, &inner.index(), items, filter))
            })
            .await
    }

    pub async fn list_groups(&self, location: Option<String>) -> Result<Vec<Summary>> {
        self.inner
            .blocking(move |_, db| {
                let mut groups = Vec::new();
                for name in db.sync_names() {
                    if location.as_deref().is_none_or(|wanted| wanted == name) {
                        groups.extend(db.groups(&name)?);
                    }
                }
                Ok(filter_groups(db, groups, State::NONE))
            })
            .await
    }

    pub async fn list_group(&self, location: Option<String>, group: Option<String>) -> Result<Vec<Summary>> {
        self.inner
            .blocking(move |inner, db| {
                let items = collect_group_members(db, location.as_deref(), group.as_deref());
                Ok(filter_packages(db, &inner.index(), items, State::NONE))
            })
            .await
    }

    /// Resolves a package name through the local and sync databases, then
    /// their providers and replacers, and finally the remote database.
    #[tracing::instrument(skip(self))]
    pub async fn resolve(&self, name: &str) -> Result<Option<Package>> {
        let owned = name.to_string();
        let found = self
            .inner
            .blocking(move |inner, db| Ok(resolve_in(db, &owned).map(|p| merge_remote(&inner.index(), p))))
            .await?;
        match found {
            Some(package) => Ok(Some(package)),
            None => self.inner.fetch_remote(name).await,
        }
    }

    /// Full record behind a summary, read from the database its state points
    /// at: the local database for installed packages, the remote database
    /// for remote candidates and the summary's repository otherwise.
    pub async fn package(&self, summary: &Summary) -> Result<Option<Package>> {
        let state = summary.state;
        if state.contains(State::REMOTE) && !state.contains(State::INSTALLED) {
            return self.inner.fetch_remote(&summary.name).await;
        }
        let name = summary.name.clone();
        let repository = summary.repository.clone();
        self.inner
            .blocking(move |inner, db| {
                let location = if state.contains(State::INSTALLED) {
                    db.local_name()
                } else {
                    repository
                };
                Ok(db
                    .package(&location, &name)
                    .map(|p| merge_remote(&inner.index(), p)))
            })
            .await
    }

    /// Drops open archives and remote metadata; the next
    /// [`Backend::initialize`] reloads the metadata.
    pub fn release(&self) {
        self.inner.cache.clear();
        *self.inner.index.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(RemoteIndex::new());
        info!("Released cached archives and remote metadata");
    }

    /// Summaries for the given names; names unknown to every database are
    /// looked up remotely.
    #[tracing::instrument(skip(self))]
    pub async fn list_targets(&self, names: Vec<String>) -> Result<Vec<Summary>> {
        let mut unique: Vec<String> = Vec::new();
        for name in names {
            if !unique.contains(&name) {
                unique.push(name);
            }
        }
        let (mut output, unknown) = self
            .inner
            .blocking(move |inner, db| {
                let mut items = Vec::new();
                let mut unknown = Vec::new();
                for name in unique {
                    match resolve_in(db, &name) {
                        Some(package) => items.push((package.repository.clone(), package)),
                        None => unknown.push(name),
                    }
                }
                Ok((filter_packages(db, &inner.index(), items, State::NONE), unknown))
            })
            .await?;

        if !unknown.is_empty() && !self.inner.is_offline() {
            let packages = self.inner.remote.query(vec![RemoteQuery::Info(unknown)]).await?;
            output.extend(filter_remote(&self.inner.index(), packages));
        }
        Ok(output)
    }

    /// Installed package count and size per repository.
    pub async fn statistics(&self) -> Result<Vec<RepositoryStats>> {
        let repositories = self.list_repositories().await?;
        let installed = self.list_packages(State::INSTALLED, None).await?;
        Ok(classify::statistics(&repositories, &installed))
    }
}
