//! Scan tasks run for one search: one per database location plus the remote
//! lookup.

use std::borrow::Cow;
use std::collections::HashSet;

use log::debug;

use super::classify::{RemoteIndex, Summary, filter_groups, filter_packages, filter_remote};
use crate::cache::ResultCache;
use crate::cancel::CancellationToken;
use crate::database::{Package, PackageDatabase};
use crate::error::Result;
use crate::pattern::{Attribute, Matcher, Searchable};
use crate::remote::{RemoteInfo, RemoteQuery, RemoteSource, SearchField};
use crate::state::{Source, State};

/// A database package as seen by the matcher.
///
/// The maintainer comes from remote metadata when the package is indexed and
/// file lists are read through the result cache.
pub struct Record<'a> {
    pub package: &'a Package,
    pub index: &'a RemoteIndex,
    pub cache: &'a ResultCache,
}

impl Searchable for Record<'_> {
    fn attribute(&self, key: Attribute) -> Option<Cow<'_, str>> {
        match key {
            Attribute::Maintainer => match self.index.get(&self.package.name) {
                Some(info) => Some(Cow::Borrowed(info.maintainer.as_str())),
                None => self.package.attribute(key),
            },
            Attribute::Files => self.cache.files(self.package).map(Cow::Owned),
            _ => self.package.attribute(key),
        }
    }
}

/// Walks the selected databases and returns `(location, package)` pairs.
///
/// With [`Source::FOREIGN`] the local database only yields packages no sync
/// database carries. An empty source walks sync and local databases.
pub fn collect_packages(
    db: &dyn PackageDatabase,
    source: Source,
    location: Option<&str>,
    token: &CancellationToken,
    mut keep: impl FnMut(&Package) -> bool,
) -> Result<Vec<(String, Package)>> {
    let source = if source.is_empty() {
        Source::SYNC | Source::LOCAL
    } else {
        source
    };
    let local = db.local_name();
    let mut locations = Vec::new();
    if source.intersects(Source::SYNC) {
        locations.extend(db.sync_names());
    }
    if source.intersects(Source::LOCAL) {
        locations.push(local.clone());
    }

    let mut items = Vec::new();
    for name in locations {
        if location.is_some_and(|wanted| wanted != name) {
            continue;
        }
        for package in db.packages(&name)? {
            if token.is_cancelled() {
                return Ok(Vec::new());
            }
            if name == local && source.intersects(Source::FOREIGN) && package.repository != local {
                continue;
            }
            if keep(&package) {
                items.push((name.clone(), package));
            }
        }
    }
    Ok(items)
}

/// Members of the named groups across the selected sync databases.
pub fn collect_group_members(
    db: &dyn PackageDatabase,
    location: Option<&str>,
    group: Option<&str>,
) -> Vec<(String, Package)> {
    let Some(group) = group else {
        return Vec::new();
    };
    db.sync_names()
        .into_iter()
        .filter(|name| location.is_none_or(|wanted| wanted == name))
        .flat_map(|name| {
            db.group_members(&name, group)
                .into_iter()
                .map(move |package| (name.clone(), package))
        })
        .collect()
}

/// Everything needed to scan one database location.
pub struct LocalScan<'a> {
    pub db: &'a dyn PackageDatabase,
    pub index: &'a RemoteIndex,
    pub cache: &'a ResultCache,
    pub token: &'a CancellationToken,
}

impl LocalScan<'_> {
    pub fn run(&self, text: &str, filter: State, keys: &[Attribute], location: &str) -> Result<Vec<Summary>> {
        let mut filter = filter;
        if filter.contains(State::GROUP) {
            filter.remove(State::GROUP);
            return self.groups(text, filter, keys, location);
        }
        filter.remove(State::REMOTE);

        // files are only read for installed packages unless asked otherwise
        let mut splits: Vec<(Source, Vec<Attribute>)> = Vec::new();
        for key in keys {
            let source = if *key == Attribute::Files && !filter.intersects(State::NON_INSTALLED) {
                Source::LOCAL
            } else {
                Source::SYNC | Source::LOCAL | Source::FOREIGN
            };
            match splits.iter_mut().find(|(s, _)| *s == source) {
                Some((_, keys)) => keys.push(*key),
                None => splits.push((source, vec![*key])),
            }
        }

        let mut output = Vec::new();
        for (source, keys) in splits {
            let matcher = Matcher::new(text, &keys)?;
            let items = collect_packages(self.db, source, Some(location), self.token, |package| {
                matcher.matches(&Record {
                    package,
                    index: self.index,
                    cache: self.cache,
                })
            })?;
            debug!("{} matches in {} for {:?}", items.len(), location, keys);
            output.extend(filter_packages(self.db, self.index, items, filter));
        }
        Ok(output)
    }

    fn groups(&self, text: &str, filter: State, keys: &[Attribute], location: &str) -> Result<Vec<Summary>> {
        if !self.db.sync_names().iter().any(|name| name == location) {
            return Ok(Vec::new());
        }
        let keys: Vec<Attribute> = keys.iter().copied().filter(|k| *k == Attribute::Name).collect();
        let matcher = Matcher::new(text, &keys)?;
        let groups = self
            .db
            .groups(location)?
            .into_iter()
            .filter(|group| !self.token.is_cancelled() && matcher.matches(group))
            .collect();
        Ok(filter_groups(self.db, groups, filter))
    }
}

/// Builds the remote requests for the prioritized terms of a query.
///
/// Exact terms are looked up by name in one batched `info` request; other
/// terms are searched individually. Maintainer searches are added for every
/// term when the maintainer key is requested.
pub fn remote_queries(matcher: &Matcher, keys: &[Attribute]) -> Result<Vec<RemoteQuery>> {
    let targets = matcher.prioritize(true)?;
    let maintainer = keys.contains(&Attribute::Maintainer);
    let by = if keys.contains(&Attribute::Name) && !keys.contains(&Attribute::Description) {
        SearchField::Name
    } else {
        SearchField::NameDesc
    };

    let mut by_maintainer = Vec::new();
    let mut exact = Vec::new();
    let mut fuzzy = Vec::new();
    for target in targets {
        if maintainer {
            by_maintainer.push(RemoteQuery::Search {
                by: SearchField::Maintainer,
                arg: target.text.clone(),
            });
        }
        if !maintainer || keys.len() > 1 {
            if target.exact {
                exact.push(target.text);
            } else {
                fuzzy.push(RemoteQuery::Search {
                    by,
                    arg: target.text,
                });
            }
        }
    }

    let mut queries = by_maintainer;
    if !exact.is_empty() {
        queries.push(RemoteQuery::Info(exact));
    }
    queries.extend(fuzzy);
    Ok(queries)
}

/// Searches the remote database and re-validates the results locally.
pub async fn find_remote(
    remote: &dyn RemoteSource,
    index: &RemoteIndex,
    text: &str,
    keys: &[Attribute],
) -> Result<Vec<Summary>> {
    let remote_keys: Vec<Attribute> = keys
        .iter()
        .copied()
        .filter(|k| matches!(k, Attribute::Name | Attribute::Description | Attribute::Maintainer))
        .collect();
    if remote_keys.is_empty() {
        return Ok(Vec::new());
    }
    let matcher = Matcher::new(text, &remote_keys)?;
    let queries = remote_queries(&matcher, keys)?;
    if queries.is_empty() {
        return Ok(Vec::new());
    }

    let mut seen = HashSet::new();
    let packages: Vec<_> = remote
        .query(queries)
        .await?
        .into_iter()
        .filter(|package| seen.insert(package.id) && matcher.matches(package))
        .collect();
    debug!("{} remote matches", packages.len());
    Ok(filter_remote(index, packages))
}

/// Fetches remote metadata for the given installed package names.
pub async fn load_index(remote: &dyn RemoteSource, names: Vec<String>) -> Result<RemoteIndex> {
    if names.is_empty() {
        return Ok(RemoteIndex::new());
    }
    let packages = remote.query(vec![RemoteQuery::Info(names)]).await?;
    Ok(packages
        .iter()
        .map(|package| (package.name.clone(), RemoteInfo::from(package)))
        .collect())
}
