//! Package database contract.
//!
//! The search engine only consumes package records through
//! [`PackageDatabase`]; [`snapshot`] provides the JSON-backed implementation
//! used by the command line tool and the tests.

pub mod snapshot;
mod version;

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::error::DatabaseError;
use crate::pattern::{Attribute, Searchable};
use crate::state::State;

pub use snapshot::{Snapshot, SnapshotProvider};
pub use version::VersionComparator;

/// Why an installed package is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallReason {
    #[default]
    Explicit,
    Dependency,
}

/// One package record from a local or sync database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Package {
    pub name: String,
    pub version: String,
    pub description: String,
    pub arch: String,
    pub packager: String,
    pub provides: Vec<String>,
    pub replaces: Vec<String>,
    pub depends: Vec<String>,
    pub optdepends: Vec<String>,
    pub groups: Vec<String>,
    pub files: Vec<String>,
    /// Installed size in bytes.
    pub isize: u64,
    /// Unix timestamp, set for installed packages only.
    pub install_date: Option<i64>,
    pub reason: InstallReason,

    /// Repository the package belongs to; `local` for foreign packages.
    #[serde(skip)]
    pub repository: String,
    #[serde(skip)]
    pub status: State,
}

impl Package {
    /// `name-version`, the key used by file list archives.
    pub fn full_name(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    pub fn is_installed(&self) -> bool {
        self.install_date.is_some()
    }
}

/// Strips a version constraint or description from a dependency string.
pub(crate) fn dependency_name(entry: &str) -> &str {
    let entry = entry.split(':').next().unwrap_or(entry);
    entry
        .split(['<', '>', '='])
        .next()
        .unwrap_or(entry)
        .trim()
}

impl Searchable for Package {
    fn attribute(&self, key: Attribute) -> Option<Cow<'_, str>> {
        let value = match key {
            Attribute::Name => Cow::Borrowed(self.name.as_str()),
            Attribute::Description => Cow::Borrowed(self.description.as_str()),
            Attribute::Provides => Cow::Owned(self.provides.join("\n")),
            Attribute::Replaces => Cow::Owned(self.replaces.join("\n")),
            Attribute::Depends => Cow::Owned(self.depends.join("\n")),
            Attribute::OptDepends => Cow::Owned(self.optdepends.join("\n")),
            Attribute::Maintainer => Cow::Borrowed(self.packager.as_str()),
            Attribute::Files => Cow::Owned(self.files.join("\n")),
        };
        Some(value)
    }
}

/// A named set of sync packages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub name: String,
    pub repository: String,
}

impl Searchable for Group {
    fn attribute(&self, key: Attribute) -> Option<Cow<'_, str>> {
        match key {
            Attribute::Name => Some(Cow::Borrowed(self.name.as_str())),
            _ => None,
        }
    }
}

/// Read-only view of the installed and sync package databases.
#[cfg_attr(test, mockall::automock)]
pub trait PackageDatabase: Send {
    /// Name of the local (installed) database.
    fn local_name(&self) -> String;
    /// Names of the sync databases in configuration order.
    fn sync_names(&self) -> Vec<String>;
    fn packages(&self, location: &str) -> Result<Vec<Package>, DatabaseError>;
    fn package(&self, location: &str, name: &str) -> Option<Package>;
    fn groups(&self, location: &str) -> Result<Vec<Group>, DatabaseError>;
    fn group_members(&self, location: &str, group: &str) -> Vec<Package>;
    /// First sync package providing `name`.
    fn find_provider(&self, name: &str) -> Option<Package>;
    /// First sync package replacing `name`.
    fn find_replacer(&self, name: &str) -> Option<Package>;
    /// Compares `version` against the installed package called `name`:
    /// `UPGRADE` if newer, `DOWNGRADE` if older, empty otherwise.
    fn check_update(&self, name: &str, version: &str) -> State;
}

/// Opens database handles; each scan task owns its own handle.
#[cfg_attr(test, mockall::automock)]
pub trait DatabaseProvider: Send + Sync {
    fn open(&self) -> Result<Box<dyn PackageDatabase>, DatabaseError>;
}
