//! Turns database records into classified summaries.

use std::collections::HashMap;

use serde::Serialize;

use crate::database::{Group, Package, PackageDatabase};
use crate::remote::{RemoteInfo, RemotePackage};
use crate::state::State;

/// Repository name given to packages described by the remote database.
pub const REMOTE_REPOSITORY: &str = "remote";

/// Remote metadata of installed foreign packages, keyed by package name.
pub type RemoteIndex = HashMap<String, RemoteInfo>;

/// Identity and classification of one search result.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub name: String,
    pub version: String,
    pub repository: String,
    /// Package base, known for remote packages only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(serialize_with = "serialize_state")]
    pub state: State,
    pub size: Option<u64>,
    pub install_date: Option<i64>,
    pub votes: Option<u64>,
    pub popularity: Option<f64>,
}

fn serialize_state<S: serde::Serializer>(state: &State, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&state.to_string())
}

impl Summary {
    fn from_package(repository: &str, package: &Package) -> Self {
        Self {
            name: package.name.clone(),
            version: package.version.clone(),
            repository: repository.to_string(),
            state: package.status,
            size: Some(package.isize),
            ..Default::default()
        }
    }
}

/// Per repository totals of installed packages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryStats {
    pub repository: String,
    pub count: usize,
    pub size: u64,
}

/// Classifies `(location, package)` pairs.
///
/// Installed packages may yield a second, synthetic summary describing an
/// available upgrade or downgrade. That summary is kept only if the filter
/// accepts it and its candidate is either remote or comes from the repository
/// the package is installed from.
pub fn filter_packages(
    db: &dyn PackageDatabase,
    index: &RemoteIndex,
    items: Vec<(String, Package)>,
    filter: State,
) -> Vec<Summary> {
    let filter = filter.or_default_filter();
    let local = db.local_name();
    let mut output = Vec::new();

    for (location, package) in items {
        let mut summary = Summary::from_package(&location, &package);
        if summary.state.contains(State::INSTALLED) {
            let current = db.package(&local, &package.name);

            if summary.repository == local || summary.repository == REMOTE_REPOSITORY {
                if let Some(info) = index.get(&summary.name) {
                    summary.repository = REMOTE_REPOSITORY.to_string();
                    summary.base = Some(info.base.clone());
                    summary.version = info.version.clone();
                    summary.state |= State::REMOTE;
                    summary.votes = Some(info.votes);
                    summary.popularity = Some(info.popularity);
                } else if summary.repository == local {
                    summary.repository = package.repository.clone();
                }
            }

            if filter.intersects(State::UPDATE) {
                let state = db.check_update(&summary.name, &summary.version);
                if filter.intersects(state) {
                    let mut update = summary.clone();
                    update.state = state | (summary.state & State::REMOTE);
                    let remote = update.state.contains(State::REMOTE);
                    if remote {
                        update.size = None;
                    }
                    let home = current.as_ref().map(|c| c.repository.as_str());
                    if remote || home == Some(update.repository.as_str()) {
                        output.push(update);
                    }
                }
            }

            if let Some(current) = current {
                summary.version = current.version;
                summary.install_date = current.install_date;
            }
        }
        if filter.intersects(summary.state) {
            output.push(summary);
        }
    }
    output
}

/// Classifies groups: installed unless any member is missing.
pub fn filter_groups(db: &dyn PackageDatabase, groups: Vec<Group>, filter: State) -> Vec<Summary> {
    let filter = filter.or_default_filter();
    let mut output = Vec::new();
    for group in groups {
        let mut summary = Summary {
            name: group.name.clone(),
            repository: group.repository.clone(),
            state: State::GROUP | State::INSTALLED,
            size: Some(0),
            ..Default::default()
        };
        let mut size = 0;
        for member in db.group_members(&group.repository, &group.name) {
            if summary.state.contains(State::INSTALLED) && member.status.contains(State::NON_INSTALLED) {
                summary.state = State::GROUP | State::NON_INSTALLED;
            }
            size += member.isize;
        }
        summary.size = Some(size);
        if filter.intersects(summary.state) {
            output.push(summary);
        }
    }
    output
}

/// Summaries for remote packages not already known from the installed set.
pub fn filter_remote(index: &RemoteIndex, packages: Vec<RemotePackage>) -> Vec<Summary> {
    packages
        .into_iter()
        .filter(|package| !index.contains_key(&package.name))
        .map(|package| Summary {
            name: package.name,
            version: package.version,
            repository: REMOTE_REPOSITORY.to_string(),
            base: Some(package.base),
            state: State::NON_INSTALLED | State::REMOTE,
            size: None,
            install_date: None,
            votes: Some(package.votes),
            popularity: Some(package.popularity),
        })
        .collect()
}

/// Package record for a package known only to the remote database.
pub fn remote_record(package: RemotePackage) -> Package {
    Package {
        name: package.name,
        version: package.version,
        description: package.description.unwrap_or_default(),
        packager: package.maintainer.unwrap_or_default(),
        provides: package.provides,
        replaces: package.replaces,
        depends: package.depends,
        optdepends: package.optdepends,
        repository: REMOTE_REPOSITORY.to_string(),
        status: State::NON_INSTALLED | State::REMOTE,
        ..Default::default()
    }
}

/// Overlays remote metadata on an installed foreign package.
pub fn merge_remote(index: &RemoteIndex, mut package: Package) -> Package {
    if !package.status.contains(State::FOREIGN) {
        return package;
    }
    if let Some(info) = index.get(&package.name) {
        package.packager = info.maintainer.clone();
        package.repository = REMOTE_REPOSITORY.to_string();
        package.status |= State::REMOTE;
    }
    package
}

/// Counts installed summaries per repository, followed by remote and overall
/// totals. Repositories without installed packages are left out.
pub fn statistics(repositories: &[String], installed: &[Summary]) -> Vec<RepositoryStats> {
    let mut totals: HashMap<&str, (usize, u64)> = HashMap::new();
    for summary in installed {
        for key in ["total", summary.repository.as_str()] {
            let entry = totals.entry(key).or_default();
            entry.0 += 1;
            entry.1 += summary.size.unwrap_or(0);
        }
    }
    repositories
        .iter()
        .map(String::as_str)
        .chain([REMOTE_REPOSITORY, "total"])
        .filter_map(|key| {
            totals.get(key).map(|(count, size)| RepositoryStats {
                repository: key.to_string(),
                count: *count,
                size: *size,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{DatabaseProvider, SnapshotProvider};
    use crate::test_utils::{package, sample_snapshot};

    fn open_sample() -> Box<dyn PackageDatabase> {
        SnapshotProvider::from_snapshot(sample_snapshot()).open().unwrap()
    }

    fn sync_items(db: &dyn PackageDatabase, location: &str) -> Vec<(String, Package)> {
        db.packages(location)
            .unwrap()
            .into_iter()
            .map(|p| (location.to_string(), p))
            .collect()
    }

    fn names(summaries: &[Summary]) -> Vec<&str> {
        summaries.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn test_installed_filter_keeps_installed_only() {
        let db = open_sample();
        let items = sync_items(db.as_ref(), "core");
        let result = filter_packages(db.as_ref(), &RemoteIndex::new(), items, State::INSTALLED);
        assert_eq!(names(&result), vec!["bash", "readline"]);
        assert_eq!(result[0].install_date, db.package("local", "bash").unwrap().install_date);
    }

    #[test]
    fn test_default_filter_keeps_everything() {
        let db = open_sample();
        let items = sync_items(db.as_ref(), "core");
        let result = filter_packages(db.as_ref(), &RemoteIndex::new(), items, State::NONE);
        assert_eq!(names(&result), vec!["bash", "readline", "make"]);
        assert!(result[2].state.contains(State::NON_INSTALLED));
    }

    #[test]
    fn test_upgrade_from_home_repository() {
        let mut snapshot = sample_snapshot();
        snapshot.local[0].version = "1.0-1".into();
        snapshot.sync[0].packages[0].version = "2.0-1".into();
        let db = SnapshotProvider::from_snapshot(snapshot).open().unwrap();

        let items = sync_items(db.as_ref(), "core");
        let result = filter_packages(db.as_ref(), &RemoteIndex::new(), items, State::UPDATE);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].name, "bash");
        assert_eq!(result[0].state, State::UPGRADE);
        assert_eq!(result[0].version, "2.0-1");
        assert_eq!(result[0].repository, "core");
    }

    #[test]
    fn test_upgrade_from_other_repository_is_dropped() {
        let mut snapshot = sample_snapshot();
        snapshot.local[0].version = "1.0-1".into();
        let mut newer = package("bash", "2.0-1");
        newer.isize = 10;
        snapshot.sync[1].packages.push(newer);
        let db = SnapshotProvider::from_snapshot(snapshot).open().unwrap();

        let items = sync_items(db.as_ref(), "extra");
        let result = filter_packages(db.as_ref(), &RemoteIndex::new(), items, State::UPDATE);
        assert!(result.is_empty());
    }

    #[test]
    fn test_remote_metadata_supersedes_foreign_package() {
        let db = open_sample();
        let mut index = RemoteIndex::new();
        index.insert(
            "yay".into(),
            RemoteInfo {
                base: "yay".into(),
                version: "12.1-1".into(),
                maintainer: "jguer".into(),
                votes: 100,
                popularity: 9.5,
            },
        );
        let items = vec![("local".to_string(), db.package("local", "yay").unwrap())];
        let result = filter_packages(db.as_ref(), &index, items, State::INSTALLED | State::UPDATE);

        assert_eq!(result.len(), 2);
        let update = &result[0];
        assert_eq!(update.state, State::UPGRADE | State::REMOTE);
        assert_eq!(update.version, "12.1-1");
        assert_eq!(update.size, None);
        assert_eq!(update.repository, REMOTE_REPOSITORY);

        let base = &result[1];
        assert!(base.state.contains(State::INSTALLED | State::FOREIGN | State::REMOTE));
        assert_eq!(base.version, "12.0-1");
        assert_eq!(base.repository, REMOTE_REPOSITORY);
        assert_eq!(base.votes, Some(100));
        assert_eq!(base.base.as_deref(), Some("yay"));
    }

    #[test]
    fn test_foreign_without_remote_metadata() {
        let db = open_sample();
        let items = vec![("local".to_string(), db.package("local", "yay").unwrap())];
        let result = filter_packages(db.as_ref(), &RemoteIndex::new(), items, State::NONE);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].repository, "local");
        assert_eq!(result[0].votes, None);
    }

    #[test]
    fn test_group_with_missing_member_is_not_installed() {
        let db = open_sample();
        let groups = db.groups("core").unwrap();
        let result = filter_groups(db.as_ref(), groups, State::NONE);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].state, State::GROUP | State::NON_INSTALLED);

        let groups = db.groups("core").unwrap();
        assert!(filter_groups(db.as_ref(), groups, State::INSTALLED).is_empty());
    }

    #[test]
    fn test_filter_remote_skips_indexed_names() {
        let mut index = RemoteIndex::new();
        index.insert(
            "yay".into(),
            RemoteInfo {
                base: "yay".into(),
                version: "12.0-1".into(),
                maintainer: String::new(),
                votes: 0,
                popularity: 0.0,
            },
        );
        let packages = vec![
            RemotePackage {
                id: 1,
                name: "yay".into(),
                ..Default::default()
            },
            RemotePackage {
                id: 2,
                name: "paru".into(),
                base: "paru".into(),
                version: "2.0-1".into(),
                votes: 7,
                ..Default::default()
            },
        ];
        let result = filter_remote(&index, packages);
        assert_eq!(names(&result), vec!["paru"]);
        assert_eq!(result[0].state, State::NON_INSTALLED | State::REMOTE);
        assert_eq!(result[0].votes, Some(7));
        assert_eq!(result[0].size, None);
    }

    #[test]
    fn test_statistics() {
        let summary = |name: &str, repository: &str, size: u64| Summary {
            name: name.into(),
            repository: repository.into(),
            size: Some(size),
            ..Default::default()
        };
        let installed = vec![
            summary("bash", "core", 10),
            summary("readline", "core", 5),
            summary("yay", REMOTE_REPOSITORY, 3),
        ];
        let repositories = vec!["core".to_string(), "extra".to_string(), "local".to_string()];
        let stats = statistics(&repositories, &installed);
        let rows: Vec<(&str, usize, u64)> = stats
            .iter()
            .map(|s| (s.repository.as_str(), s.count, s.size))
            .collect();
        assert_eq!(rows, vec![("core", 2, 15), (REMOTE_REPOSITORY, 1, 3), ("total", 3, 18)]);
    }

    #[test]
    fn test_remote_record() {
        let record = remote_record(RemotePackage {
            id: 5,
            name: "paru".into(),
            base: "paru".into(),
            version: "2.0-1".into(),
            maintainer: Some("morganamilo".into()),
            depends: vec!["git".into()],
            ..Default::default()
        });
        assert_eq!(record.repository, REMOTE_REPOSITORY);
        assert_eq!(record.status, State::NON_INSTALLED | State::REMOTE);
        assert_eq!(record.packager, "morganamilo");
        assert_eq!(record.depends, vec!["git"]);
        assert!(!record.is_installed());
    }

    #[test]
    fn test_merge_remote_only_touches_indexed_foreign_packages() {
        let db = open_sample();
        let mut index = RemoteIndex::new();
        for name in ["yay", "bash"] {
            index.insert(
                name.into(),
                RemoteInfo {
                    base: name.into(),
                    version: "1-1".into(),
                    maintainer: "someone".into(),
                    votes: 1,
                    popularity: 0.5,
                },
            );
        }

        let yay = merge_remote(&index, db.package("local", "yay").unwrap());
        assert_eq!(yay.repository, REMOTE_REPOSITORY);
        assert_eq!(yay.packager, "someone");
        assert_eq!(yay.version, "12.0-1");
        assert!(yay.status.contains(State::INSTALLED | State::FOREIGN | State::REMOTE));

        let bash = merge_remote(&index, db.package("local", "bash").unwrap());
        assert_eq!(bash.repository, "core");
        assert!(!bash.status.contains(State::REMOTE));
    }

    #[test]
    fn test_summary_serializes_state_names() {
        let summary = Summary {
            name: "zsh".into(),
            state: State::NON_INSTALLED,
            ..Default::default()
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["state"], "not-installed");
        assert!(json.get("base").is_none());
    }
}
