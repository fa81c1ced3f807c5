//! JSON snapshot of a local database and its sync repositories.
//!
//! ```json
//! {
//!   "local": [{"name": "bash", "version": "5.2-1", "install_date": 1700000000}],
//!   "sync": [{"name": "core", "packages": [{"name": "bash", "version": "5.2-2"}]}]
//! }
//! ```

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use log::debug;
use serde::{Deserialize, Serialize};

use super::{
    DatabaseProvider, Group, InstallReason, Package, PackageDatabase, VersionComparator,
    dependency_name,
};
use crate::error::DatabaseError;
use crate::runtime::Runtime;
use crate::state::State;

fn default_local_name() -> String {
    "local".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default = "default_local_name")]
    pub local_name: String,
    #[serde(default)]
    pub local: Vec<Package>,
    #[serde(default)]
    pub sync: Vec<Repository>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            local_name: default_local_name(),
            local: Vec::new(),
            sync: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    #[serde(default)]
    pub packages: Vec<Package>,
}

fn satisfies(names: &HashSet<&str>, package: &Package) -> bool {
    names.contains(package.name.as_str())
        || package
            .provides
            .iter()
            .any(|p| names.contains(dependency_name(p)))
}

/// Snapshot contents with repositories and status bits resolved.
#[derive(Debug)]
struct Catalog {
    local_name: String,
    local: Vec<Package>,
    local_index: HashMap<String, usize>,
    sync: Vec<Repository>,
}

impl Catalog {
    fn new(snapshot: Snapshot) -> Self {
        let Snapshot {
            local_name,
            mut local,
            mut sync,
        } = snapshot;

        let mut home: HashMap<String, String> = HashMap::new();
        for repository in &sync {
            for package in &repository.packages {
                home.entry(package.name.clone())
                    .or_insert_with(|| repository.name.clone());
            }
        }

        let mut required: HashSet<&str> = HashSet::new();
        let mut optional: HashSet<&str> = HashSet::new();
        for package in &local {
            required.extend(package.depends.iter().map(|d| dependency_name(d)));
            optional.extend(package.optdepends.iter().map(|d| dependency_name(d)));
        }

        let statuses: Vec<State> = local
            .iter()
            .map(|package| {
                let mut status = State::INSTALLED;
                match package.reason {
                    InstallReason::Explicit => status |= State::EXPLICIT,
                    InstallReason::Dependency => {
                        status |= State::DEPENDENCY;
                        if !satisfies(&required, package) {
                            if satisfies(&optional, package) {
                                status |= State::OPTIONAL;
                            } else {
                                status |= State::ORPHAN;
                            }
                        }
                    }
                }
                if !home.contains_key(&package.name) {
                    status |= State::FOREIGN;
                }
                status
            })
            .collect();

        let mut local_index = HashMap::new();
        for (index, (package, status)) in local.iter_mut().zip(statuses).enumerate() {
            package.status = status;
            package.repository = home
                .get(&package.name)
                .cloned()
                .unwrap_or_else(|| local_name.clone());
            if package.install_date.is_none() {
                package.install_date = Some(0);
            }
            local_index.insert(package.name.clone(), index);
        }

        for repository in &mut sync {
            for package in &mut repository.packages {
                package.repository = repository.name.clone();
                package.install_date = None;
                package.status = match local_index.get(&package.name) {
                    Some(index) => local[*index].status & !State::FOREIGN,
                    None => State::NON_INSTALLED,
                };
            }
        }

        Self {
            local_name,
            local,
            local_index,
            sync,
        }
    }

    fn location(&self, location: &str) -> Result<&[Package], DatabaseError> {
        if location == self.local_name {
            return Ok(&self.local);
        }
        self.sync
            .iter()
            .find(|repository| repository.name == location)
            .map(|repository| repository.packages.as_slice())
            .ok_or_else(|| DatabaseError::new(Some(location.to_string()), "unknown database"))
    }

    fn sync_packages(&self) -> impl Iterator<Item = &Package> {
        self.sync.iter().flat_map(|repository| &repository.packages)
    }
}

/// Database handle over a shared catalog.
pub struct SnapshotDatabase {
    catalog: Arc<Catalog>,
}

impl PackageDatabase for SnapshotDatabase {
    fn local_name(&self) -> String {
        self.catalog.local_name.clone()
    }

    fn sync_names(&self) -> Vec<String> {
        self.catalog.sync.iter().map(|r| r.name.clone()).collect()
    }

    fn packages(&self, location: &str) -> Result<Vec<Package>, DatabaseError> {
        Ok(self.catalog.location(location)?.to_vec())
    }

    fn package(&self, location: &str, name: &str) -> Option<Package> {
        if location == self.catalog.local_name {
            return self
                .catalog
                .local_index
                .get(name)
                .map(|index| self.catalog.local[*index].clone());
        }
        self.catalog
            .location(location)
            .ok()?
            .iter()
            .find(|package| package.name == name)
            .cloned()
    }

    fn groups(&self, location: &str) -> Result<Vec<Group>, DatabaseError> {
        let mut names: Vec<&str> = Vec::new();
        for package in self.catalog.location(location)? {
            for group in &package.groups {
                if !names.contains(&group.as_str()) {
                    names.push(group.as_str());
                }
            }
        }
        Ok(names
            .into_iter()
            .map(|name| Group {
                name: name.to_string(),
                repository: location.to_string(),
            })
            .collect())
    }

    fn group_members(&self, location: &str, group: &str) -> Vec<Package> {
        self.catalog
            .location(location)
            .map(|packages| {
                packages
                    .iter()
                    .filter(|package| package.groups.iter().any(|g| g == group))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn find_provider(&self, name: &str) -> Option<Package> {
        self.catalog
            .sync_packages()
            .find(|package| {
                package.name == name || package.provides.iter().any(|p| dependency_name(p) == name)
            })
            .cloned()
    }

    fn find_replacer(&self, name: &str) -> Option<Package> {
        self.catalog
            .sync_packages()
            .find(|package| package.replaces.iter().any(|r| dependency_name(r) == name))
            .cloned()
    }

    fn check_update(&self, name: &str, version: &str) -> State {
        let Some(index) = self.catalog.local_index.get(name) else {
            return State::NONE;
        };
        let installed = &self.catalog.local[*index];
        match VersionComparator::compare(version, &installed.version) {
            Ordering::Greater => State::UPGRADE,
            Ordering::Less => State::DOWNGRADE,
            Ordering::Equal => State::NONE,
        }
    }
}

/// Loads a snapshot file on first use and hands out handles to it.
pub struct SnapshotProvider {
    source: Option<(Arc<dyn Runtime>, PathBuf)>,
    catalog: Mutex<Option<Arc<Catalog>>>,
}

impl SnapshotProvider {
    pub fn new(runtime: Arc<dyn Runtime>, path: PathBuf) -> Self {
        Self {
            source: Some((runtime, path)),
            catalog: Mutex::new(None),
        }
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            source: None,
            catalog: Mutex::new(Some(Arc::new(Catalog::new(snapshot)))),
        }
    }

    fn load(&self) -> Result<Arc<Catalog>, DatabaseError> {
        let Some((runtime, path)) = &self.source else {
            return Err(DatabaseError::new(None, "no snapshot configured"));
        };
        let location = Some(path.display().to_string());
        let text = runtime.read_to_string(path).map_err(|e| {
            debug!("Failed to read snapshot {:?}: {:#}", path, e);
            DatabaseError::new(location.clone(), "could not read snapshot")
        })?;
        let snapshot: Snapshot = serde_json::from_str(&text)
            .map_err(|e| DatabaseError::new(location, format!("invalid snapshot ({})", e)))?;
        debug!(
            "Loaded snapshot with {} local packages and {} sync databases",
            snapshot.local.len(),
            snapshot.sync.len()
        );
        Ok(Arc::new(Catalog::new(snapshot)))
    }
}

impl DatabaseProvider for SnapshotProvider {
    fn open(&self) -> Result<Box<dyn PackageDatabase>, DatabaseError> {
        let mut slot = self.catalog.lock().unwrap_or_else(|e| e.into_inner());
        let catalog = match slot.as_ref() {
            Some(catalog) => Arc::clone(catalog),
            None => {
                let catalog = self.load()?;
                *slot = Some(Arc::clone(&catalog));
                catalog
            }
        };
        Ok(Box::new(SnapshotDatabase { catalog }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;
    use crate::test_utils::{package, sample_snapshot};

    fn open(snapshot: Snapshot) -> Box<dyn PackageDatabase> {
        SnapshotProvider::from_snapshot(snapshot).open().unwrap()
    }

    #[test]
    fn test_local_classification() {
        let db = open(sample_snapshot());
        let local = db.package("local", "bash").unwrap();
        assert_eq!(local.repository, "core");
        assert!(local.status.contains(State::INSTALLED | State::EXPLICIT));
        assert!(!local.status.contains(State::FOREIGN));

        let foreign = db.package("local", "yay").unwrap();
        assert_eq!(foreign.repository, "local");
        assert!(foreign.status.contains(State::FOREIGN));
    }

    #[test]
    fn test_orphan_and_optional() {
        let mut snapshot = sample_snapshot();
        let mut lonely = package("lonely", "1.0-1");
        lonely.reason = InstallReason::Dependency;
        lonely.install_date = Some(1);
        let mut extra = package("python-extra", "1.0-1");
        extra.reason = InstallReason::Dependency;
        extra.install_date = Some(1);
        snapshot.local[0].optdepends = vec!["python-extra: scripting".into()];
        snapshot.local.push(lonely);
        snapshot.local.push(extra);

        let db = open(snapshot);
        assert!(db.package("local", "lonely").unwrap().status.contains(State::ORPHAN));
        let extra = db.package("local", "python-extra").unwrap();
        assert!(extra.status.contains(State::OPTIONAL));
        assert!(!extra.status.contains(State::ORPHAN));
        let readline = db.package("local", "readline").unwrap();
        assert!(readline.status.contains(State::DEPENDENCY));
        assert!(!readline.status.intersects(State::ORPHAN | State::OPTIONAL));
    }

    #[test]
    fn test_sync_classification() {
        let db = open(sample_snapshot());
        let sync = db.package("core", "bash").unwrap();
        assert!(sync.status.contains(State::INSTALLED));
        assert!(sync.install_date.is_none());
        let other = db.package("extra", "zsh").unwrap();
        assert_eq!(other.status, State::NON_INSTALLED);
        assert_eq!(other.repository, "extra");
    }

    #[test]
    fn test_check_update() {
        let db = open(sample_snapshot());
        assert_eq!(db.check_update("bash", "5.3-1"), State::UPGRADE);
        assert_eq!(db.check_update("bash", "5.1-1"), State::DOWNGRADE);
        assert_eq!(db.check_update("bash", "5.2-1"), State::NONE);
        assert_eq!(db.check_update("zsh", "5.9-1"), State::NONE);
    }

    #[test]
    fn test_groups_and_members() {
        let db = open(sample_snapshot());
        let groups = db.groups("core").unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "base-devel");
        let members = db.group_members("core", "base-devel");
        assert_eq!(members.len(), 2);
        assert!(db.groups("nowhere").is_err());
    }

    #[test]
    fn test_provider_and_replacer() {
        let db = open(sample_snapshot());
        assert_eq!(db.find_provider("sh").unwrap().name, "bash");
        assert_eq!(db.find_replacer("oldshell").unwrap().name, "zsh");
        assert!(db.find_provider("nothing").is_none());
    }

    #[test]
    fn test_names() {
        let db = open(sample_snapshot());
        assert_eq!(db.local_name(), "local");
        assert_eq!(db.sync_names(), vec!["core", "extra"]);
        assert!(db.packages("core").is_ok());
        assert!(db.packages("missing").is_err());
    }

    #[test]
    fn test_provider_loads_once_through_runtime() {
        let json = serde_json::to_string(&sample_snapshot()).unwrap();
        let mut runtime = MockRuntime::new();
        runtime
            .expect_read_to_string()
            .times(1)
            .returning(move |_| Ok(json.clone()));

        let provider = SnapshotProvider::new(Arc::new(runtime), PathBuf::from("/db.json"));
        assert!(provider.open().is_ok());
        assert!(provider.open().is_ok());
    }

    #[test]
    fn test_provider_read_failure() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_read_to_string()
            .returning(|_| Err(anyhow::anyhow!("missing")));

        let provider = SnapshotProvider::new(Arc::new(runtime), PathBuf::from("/db.json"));
        let err = provider.open().err().unwrap();
        assert_eq!(err.location.as_deref(), Some("/db.json"));
        assert_eq!(err.reason, "could not read snapshot");
    }

    #[test]
    fn test_provider_invalid_json() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_read_to_string()
            .returning(|_| Ok("{not json".to_string()));

        let provider = SnapshotProvider::new(Arc::new(runtime), PathBuf::from("/db.json"));
        let err = provider.open().err().unwrap();
        assert!(err.reason.starts_with("invalid snapshot"));
    }
}
