//! Query language: parsing, ordering, compilation and matching.
//!
//! A query is a list of alternatives separated by `|`; each alternative is a
//! whitespace separated list of terms that must all match. Terms take the
//! modifiers `~` (not), `=` (exact) and `%` (regular expression) and may be
//! grouped with parentheses.

mod compile;
mod parse;
mod query;

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use anyhow::bail;

use crate::error::PatternError;
use compile::{Compiled, Values};
use query::{Body, Element, Query};

/// Record attribute a query can be evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    Name,
    Description,
    Provides,
    Replaces,
    Depends,
    OptDepends,
    Maintainer,
    Files,
}

impl Attribute {
    pub const ALL: [Attribute; 8] = [
        Attribute::Name,
        Attribute::Description,
        Attribute::Provides,
        Attribute::Replaces,
        Attribute::Depends,
        Attribute::OptDepends,
        Attribute::Maintainer,
        Attribute::Files,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Attribute::Name => "name",
            Attribute::Description => "description",
            Attribute::Provides => "provides",
            Attribute::Replaces => "replaces",
            Attribute::Depends => "depends",
            Attribute::OptDepends => "optdepends",
            Attribute::Maintainer => "maintainer",
            Attribute::Files => "files",
        }
    }

    /// Parses a comma separated list of attribute names.
    pub fn parse_list(text: &str) -> anyhow::Result<Vec<Attribute>> {
        let mut keys = Vec::new();
        for name in text.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            let key: Attribute = name.parse()?;
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        Ok(keys)
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Attribute {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.to_lowercase();
        match Attribute::ALL.iter().find(|key| key.as_str() == name) {
            Some(key) => Ok(*key),
            None => bail!("Unknown search key: {}", s),
        }
    }
}

/// A record the matcher can read attributes from.
///
/// Multi-valued attributes are returned joined with `\n`. For
/// [`Attribute::Files`] each line is one path.
pub trait Searchable {
    fn attribute(&self, key: Attribute) -> Option<Cow<'_, str>>;
}

/// Representative term of one alternative, used to drive remote lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub exact: bool,
    pub text: String,
}

/// A compiled query bound to an ordered list of attributes.
#[derive(Debug)]
pub struct Matcher {
    text: String,
    keys: Vec<Attribute>,
    query: Query,
    compiled: Vec<Vec<Compiled>>,
}

impl Matcher {
    pub fn new(text: &str, keys: &[Attribute]) -> Result<Self, PatternError> {
        let tree = parse::parse(text)?;
        let query = query::lower(&tree);
        let compiled = compile::compile(&query, keys.contains(&Attribute::Files))?;
        Ok(Self {
            text: text.to_string(),
            keys: keys.to_vec(),
            query,
            compiled,
        })
    }

    pub fn matches<R: Searchable + ?Sized>(&self, record: &R) -> bool {
        if self.keys.is_empty() {
            return false;
        }
        let values = Values::new(record, &self.keys);
        compile::query_matches(&self.compiled, &values)
    }

    /// Returns the highest-priority term of every alternative, descending
    /// into groups.
    ///
    /// In strict mode an alternative led by a negated or regexp term is an
    /// error, since a remote endpoint cannot search for it.
    pub fn prioritize(&self, strict: bool) -> Result<Vec<Target>, PatternError> {
        let mut targets = Vec::new();
        self.collect_targets(&self.query, strict, &mut targets)?;
        Ok(targets)
    }

    fn collect_targets(
        &self,
        query: &[Element],
        strict: bool,
        targets: &mut Vec<Target>,
    ) -> Result<(), PatternError> {
        for term in query.iter().filter_map(|element| element.first()) {
            if strict && term.is_negated() {
                return Err(PatternError::new(&self.text, "unqualified negative term"));
            }
            if strict && term.is_regexp() {
                return Err(PatternError::new(&self.text, "unqualified regexp term"));
            }
            match &term.body {
                Body::Text(text) => {
                    let target = Target {
                        exact: term.is_exact(),
                        text: text.clone(),
                    };
                    if !targets.contains(&target) {
                        targets.push(target);
                    }
                }
                Body::Group(inner) => self.collect_targets(inner, strict, targets)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Record(HashMap<Attribute, String>);

    impl Record {
        fn with(mut self, key: Attribute, value: &str) -> Self {
            self.0.insert(key, value.to_string());
            self
        }
    }

    impl Searchable for Record {
        fn attribute(&self, key: Attribute) -> Option<Cow<'_, str>> {
            self.0.get(&key).map(|value| Cow::Borrowed(value.as_str()))
        }
    }

    fn package(name: &str, description: &str) -> Record {
        Record::default()
            .with(Attribute::Name, name)
            .with(Attribute::Description, description)
    }

    const NAME_DESC: &[Attribute] = &[Attribute::Name, Attribute::Description];

    #[test]
    fn test_substring_is_case_insensitive() {
        let matcher = Matcher::new("FIRE", &[Attribute::Name]).unwrap();
        assert!(matcher.matches(&package("firefox", "")));
        assert!(!matcher.matches(&package("chromium", "")));
    }

    #[test]
    fn test_exact_matches_any_line() {
        let matcher = Matcher::new("=libfoo", &[Attribute::Provides]).unwrap();
        let record = Record::default().with(Attribute::Provides, "libbar\nlibfoo");
        assert!(matcher.matches(&record));
        let record = Record::default().with(Attribute::Provides, "libfoo2");
        assert!(!matcher.matches(&record));
    }

    #[test]
    fn test_regexp_term() {
        let matcher = Matcher::new("%^lib.*-git$", &[Attribute::Name]).unwrap();
        assert!(matcher.matches(&package("libfoo-git", "")));
        assert!(!matcher.matches(&package("libfoo", "")));
    }

    #[test]
    fn test_terms_may_be_found_in_different_attributes() {
        let matcher = Matcher::new("vim editor", NAME_DESC).unwrap();
        assert!(matcher.matches(&package("vim", "Vi Improved, a text editor")));
        assert!(!matcher.matches(&package("vim", "Vi Improved")));
    }

    #[test]
    fn test_alternatives() {
        let matcher = Matcher::new("emacs | vim", &[Attribute::Name]).unwrap();
        assert!(matcher.matches(&package("vim", "")));
        assert!(matcher.matches(&package("emacs", "")));
        assert!(!matcher.matches(&package("nano", "")));
    }

    #[test]
    fn test_not_is_complement_of_single_term() {
        let records = [package("foo", ""), package("bar", ""), package("foobar", "")];
        for pattern in ["foo", "=foo", "%^f", "(foo | bar)"] {
            let positive = Matcher::new(pattern, &[Attribute::Name]).unwrap();
            let negative = Matcher::new(&format!("~{}", pattern), &[Attribute::Name]).unwrap();
            for record in &records {
                assert_ne!(positive.matches(record), negative.matches(record), "{}", pattern);
            }
        }
    }

    #[test]
    fn test_grouping_is_associative() {
        let records = [
            package("alpha", "beta"),
            package("alpha", ""),
            package("gamma", "alpha beta"),
        ];
        let grouped = Matcher::new("(alpha beta)", NAME_DESC).unwrap();
        let flat = Matcher::new("alpha beta", NAME_DESC).unwrap();
        for record in &records {
            assert_eq!(grouped.matches(record), flat.matches(record));
        }
    }

    #[test]
    fn test_negated_group() {
        let matcher = Matcher::new("~(foo bar)", &[Attribute::Name]).unwrap();
        assert!(!matcher.matches(&package("foobar", "")));
        assert!(matcher.matches(&package("foo", "")));
    }

    #[test]
    fn test_group_inside_element() {
        let matcher = Matcher::new("lib (ssl | tls)", &[Attribute::Name]).unwrap();
        assert!(matcher.matches(&package("libressl", "")));
        assert!(matcher.matches(&package("gnutls-lib", "")));
        assert!(!matcher.matches(&package("libpng", "")));
    }

    #[test]
    fn test_empty_keys_never_match() {
        let matcher = Matcher::new("foo", &[]).unwrap();
        assert!(!matcher.matches(&package("foo", "")));
    }

    #[test]
    fn test_files_mode() {
        let record = Record::default()
            .with(Attribute::Name, "coreutils")
            .with(Attribute::Files, "usr/bin/ls\nusr/bin/cat\nusr/share/man/ls.1");
        let keys = &[Attribute::Files];
        assert!(Matcher::new("bin/ls", keys).unwrap().matches(&record));
        assert!(Matcher::new("/bin/ls", keys).unwrap().matches(&record));
        assert!(!Matcher::new("bin/l", keys).unwrap().matches(&record));
        assert!(Matcher::new("=/usr/bin/cat", keys).unwrap().matches(&record));
        assert!(!Matcher::new("=bin/cat", keys).unwrap().matches(&record));
        assert!(Matcher::new("%^/usr/share/man/.*\\.1$", keys).unwrap().matches(&record));
        assert!(!Matcher::new("%^/USR/", keys).unwrap().matches(&record));
    }

    #[test]
    fn test_files_mode_only_applies_to_files_key() {
        let record = Record::default()
            .with(Attribute::Name, "ls-tools")
            .with(Attribute::Files, "usr/bin/other");
        let matcher = Matcher::new("ls", &[Attribute::Name, Attribute::Files]).unwrap();
        assert!(matcher.matches(&record));
    }

    #[test]
    fn test_missing_attribute_reads_as_empty() {
        let record = Record::default().with(Attribute::Name, "zsh");
        assert!(Matcher::new("~usr/bin/foo", &[Attribute::Files]).unwrap().matches(&record));
        assert!(!Matcher::new("usr/bin/foo", &[Attribute::Files]).unwrap().matches(&record));
        assert!(Matcher::new("~foo", &[Attribute::Description]).unwrap().matches(&record));
        assert!(!Matcher::new("foo", &[Attribute::Description]).unwrap().matches(&record));
    }

    #[test]
    fn test_invalid_regexp() {
        let err = Matcher::new("%'foo('", &[Attribute::Name]).unwrap_err();
        assert_eq!(err.text, "foo(");
    }

    #[test]
    fn test_parse_errors_surface() {
        let err = Matcher::new("'abc", &[Attribute::Name]).unwrap_err();
        assert_eq!(err.message, "unclosed quote");
        let err = Matcher::new("(abc", &[Attribute::Name]).unwrap_err();
        assert_eq!(err.message, "unclosed parenthesis");
    }

    #[test]
    fn test_prioritize_exact_first() {
        for pattern in ["foo =bar", "=bar foo"] {
            let matcher = Matcher::new(pattern, &[Attribute::Name]).unwrap();
            assert_eq!(
                matcher.prioritize(true).unwrap(),
                vec![Target {
                    exact: true,
                    text: "bar".into()
                }]
            );
        }
    }

    #[test]
    fn test_prioritize_descends_into_groups() {
        let matcher = Matcher::new("(=a | b) | c", &[Attribute::Name]).unwrap();
        let targets = matcher.prioritize(true).unwrap();
        assert_eq!(
            targets,
            vec![
                Target {
                    exact: true,
                    text: "a".into()
                },
                Target {
                    exact: false,
                    text: "b".into()
                },
                Target {
                    exact: false,
                    text: "c".into()
                },
            ]
        );
    }

    #[test]
    fn test_prioritize_strict_rejects_negation() {
        let matcher = Matcher::new("~foo", &[Attribute::Name]).unwrap();
        let err = matcher.prioritize(true).unwrap_err();
        assert_eq!(err.message, "unqualified negative term");
        assert_eq!(err.text, "~foo");
        assert!(matcher.prioritize(false).is_ok());
    }

    #[test]
    fn test_prioritize_strict_rejects_regexp() {
        let matcher = Matcher::new("%fo+", &[Attribute::Name]).unwrap();
        let err = matcher.prioritize(true).unwrap_err();
        assert_eq!(err.message, "unqualified regexp term");
        let matcher = Matcher::new("%fo+ bar", &[Attribute::Name]).unwrap();
        assert!(matcher.prioritize(true).is_ok());
    }

    #[test]
    fn test_reparsed_targets_match_the_same() {
        let records = [package("foo", ""), package("bar", ""), package("qux", "")];
        for pattern in ["foo | =bar", "=qux | ba"] {
            let matcher = Matcher::new(pattern, &[Attribute::Name]).unwrap();
            let rebuilt: Vec<String> = matcher
                .prioritize(false)
                .unwrap()
                .into_iter()
                .map(|t| format!("{}'{}'", if t.exact { "=" } else { "" }, t.text))
                .collect();
            let reparsed = Matcher::new(&rebuilt.join(" | "), &[Attribute::Name]).unwrap();
            for record in &records {
                assert_eq!(matcher.matches(record), reparsed.matches(record));
            }
        }
    }

    #[test]
    fn test_attribute_parse_list() {
        assert_eq!(
            Attribute::parse_list("name, description,name").unwrap(),
            vec![Attribute::Name, Attribute::Description]
        );
        assert!(Attribute::parse_list("size").is_err());
    }
}
