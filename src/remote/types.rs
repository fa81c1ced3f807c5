use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::pattern::{Attribute, Searchable};

/// Response envelope shared by every RPC call.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub resultcount: usize,
    #[serde(default)]
    pub results: Vec<RemotePackage>,
    #[serde(default)]
    pub error: Option<String>,
}

/// A package as reported by the remote database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemotePackage {
    #[serde(rename = "ID")]
    pub id: u64,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "PackageBase", default)]
    pub base: String,
    #[serde(rename = "Version", default)]
    pub version: String,
    #[serde(rename = "Description", default)]
    pub description: Option<String>,
    #[serde(rename = "Maintainer", default)]
    pub maintainer: Option<String>,
    #[serde(rename = "NumVotes", default)]
    pub votes: u64,
    #[serde(rename = "Popularity", default)]
    pub popularity: f64,
    #[serde(rename = "Depends", default)]
    pub depends: Vec<String>,
    #[serde(rename = "OptDepends", default)]
    pub optdepends: Vec<String>,
    #[serde(rename = "Provides", default)]
    pub provides: Vec<String>,
    #[serde(rename = "Replaces", default)]
    pub replaces: Vec<String>,
}

impl Searchable for RemotePackage {
    fn attribute(&self, key: Attribute) -> Option<Cow<'_, str>> {
        match key {
            Attribute::Name => Some(Cow::Borrowed(self.name.as_str())),
            Attribute::Description => Some(Cow::Borrowed(self.description.as_deref().unwrap_or(""))),
            Attribute::Maintainer => Some(Cow::Borrowed(self.maintainer.as_deref().unwrap_or(""))),
            _ => None,
        }
    }
}

/// Remote metadata kept for installed foreign packages.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteInfo {
    pub base: String,
    pub version: String,
    pub maintainer: String,
    pub votes: u64,
    pub popularity: f64,
}

impl From<&RemotePackage> for RemoteInfo {
    fn from(package: &RemotePackage) -> Self {
        Self {
            base: package.base.clone(),
            version: package.version.clone(),
            maintainer: package.maintainer.clone().unwrap_or_default(),
            votes: package.votes,
            popularity: package.popularity,
        }
    }
}

/// Field a fuzzy search runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchField {
    Name,
    NameDesc,
    Maintainer,
}

impl SearchField {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchField::Name => "name",
            SearchField::NameDesc => "name-desc",
            SearchField::Maintainer => "maintainer",
        }
    }
}

impl fmt::Display for SearchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logical remote request; `Info` may expand into several URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteQuery {
    Info(Vec<String>),
    Search { by: SearchField, arg: String },
}
