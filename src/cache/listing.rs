//! Package file names and archive directory listings.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::database::VersionComparator;

static PKGFILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(.+)-([^-\s]+-[^-\s]+)-(i686|x86_64|aarch64|armv7h|any)\.pkg\.tar(?:\.(?:gz|bz2|xz|zst|Z))?$",
    )
    .expect("package file regex must compile")
});

static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<a\b[^>]*>(.*?)</a>").expect("link regex must compile")
});

/// Parsed `name-version-release-arch.pkg.tar.*` file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFile<'a> {
    pub name: &'a str,
    pub version: &'a str,
    pub arch: &'a str,
}

impl<'a> PackageFile<'a> {
    /// Parses the final path component of `path`.
    pub fn parse(path: &'a str) -> Option<Self> {
        let file_name = path.rsplit('/').next().unwrap_or(path);
        let captures = PKGFILE_RE.captures(file_name)?;
        Some(Self {
            name: captures.get(1)?.as_str(),
            version: captures.get(2)?.as_str(),
            arch: captures.get(3)?.as_str(),
        })
    }

    /// `name/arch`, the key used by package cache archives.
    pub fn key(&self) -> String {
        format!("{}/{}", self.name, self.arch)
    }
}

/// Collects package file links from an HTML directory index, keyed by
/// `name/arch`.
pub fn parse_index(html: &str) -> HashMap<String, Vec<String>> {
    let mut files: HashMap<String, Vec<String>> = HashMap::new();
    for captures in LINK_RE.captures_iter(html) {
        let text = captures[1].trim();
        if let Some(file) = PackageFile::parse(text) {
            files.entry(file.key()).or_default().push(text.to_string());
        }
    }
    files
}

/// Orders package file paths newest version first; unparsable paths last.
pub fn sort_newest_first(paths: &mut [String]) {
    paths.sort_by(|a, b| {
        match (PackageFile::parse(a), PackageFile::parse(b)) {
            (Some(a), Some(b)) => VersionComparator::compare(b.version, a.version),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.cmp(b),
        }
    });
}
