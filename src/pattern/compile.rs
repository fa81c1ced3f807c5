//! Predicate construction and record evaluation.

use std::borrow::Cow;
use std::cell::OnceCell;

use regex::{Regex, RegexBuilder};

use super::query::{Body, Element, Query, Term};
use super::{Attribute, Searchable};
use crate::error::PatternError;

#[derive(Debug)]
enum Predicate {
    Regex(Regex),
    Contains(String),
}

impl Predicate {
    fn test(&self, value: &str) -> bool {
        match self {
            Predicate::Regex(regex) => regex.is_match(value),
            Predicate::Contains(fragment) => value.contains(fragment.as_str()),
        }
    }
}

#[derive(Debug)]
enum Kind {
    Leaf {
        default: Predicate,
        files: Option<Predicate>,
    },
    Group(Vec<Vec<Compiled>>),
}

#[derive(Debug)]
pub(super) struct Compiled {
    negated: bool,
    kind: Kind,
}

fn build_regex(pattern: &str, case_insensitive: bool) -> Result<Regex, PatternError> {
    RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .multi_line(true)
        .build()
        .map_err(|e| PatternError::new(pattern, e.to_string()))
}

fn default_predicate(term: &Term, text: &str) -> Result<Predicate, PatternError> {
    let pattern = if term.is_regexp() {
        text.to_string()
    } else if term.is_exact() {
        format!("^{}$", regex::escape(text))
    } else {
        regex::escape(text)
    };
    Ok(Predicate::Regex(build_regex(&pattern, true)?))
}

fn files_predicate(term: &Term, text: &str) -> Result<Predicate, PatternError> {
    if term.is_regexp() {
        return Ok(Predicate::Regex(build_regex(text, false)?));
    }
    let mut fragment = format!("/{}\n", text.trim_start_matches('/'));
    if term.is_exact() {
        fragment.insert(0, '\n');
    }
    Ok(Predicate::Contains(fragment))
}

pub(super) fn compile(query: &Query, files: bool) -> Result<Vec<Vec<Compiled>>, PatternError> {
    query
        .iter()
        .map(|element| compile_element(element, files))
        .collect()
}

fn compile_element(element: &Element, files: bool) -> Result<Vec<Compiled>, PatternError> {
    element
        .iter()
        .map(|term| {
            let kind = match &term.body {
                Body::Text(text) => Kind::Leaf {
                    default: default_predicate(term, text)?,
                    files: if files {
                        Some(files_predicate(term, text)?)
                    } else {
                        None
                    },
                },
                Body::Group(query) => Kind::Group(compile(query, files)?),
            };
            Ok(Compiled {
                negated: term.is_negated(),
                kind,
            })
        })
        .collect()
}

/// Converts a newline separated file list into the `\n/path\n` form that
/// files predicates look for.
pub(super) fn normalize_files(listing: &str) -> String {
    let mut normalized = String::from("\n");
    for line in listing.lines().filter(|line| !line.is_empty()) {
        normalized.push('/');
        normalized.push_str(line.trim_start_matches('/'));
        normalized.push('\n');
    }
    normalized
}

/// Attribute values of one record, fetched on first use.
pub(super) struct Values<'r, R: Searchable + ?Sized> {
    record: &'r R,
    keys: &'r [Attribute],
    cells: Vec<OnceCell<Option<Cow<'r, str>>>>,
}

impl<'r, R: Searchable + ?Sized> Values<'r, R> {
    pub(super) fn new(record: &'r R, keys: &'r [Attribute]) -> Self {
        Self {
            record,
            keys,
            cells: keys.iter().map(|_| OnceCell::new()).collect(),
        }
    }

    fn get(&self, index: usize) -> Option<&str> {
        self.cells[index]
            .get_or_init(|| {
                let key = self.keys[index];
                let value = self.record.attribute(key)?;
                if key == Attribute::Files {
                    Some(Cow::Owned(normalize_files(&value)))
                } else {
                    Some(value)
                }
            })
            .as_deref()
    }
}

pub(super) fn query_matches<R: Searchable + ?Sized>(
    query: &[Vec<Compiled>],
    values: &Values<'_, R>,
) -> bool {
    query
        .iter()
        .any(|element| element_matches(element, values))
}

fn element_matches<R: Searchable + ?Sized>(element: &[Compiled], values: &Values<'_, R>) -> bool {
    if element.is_empty() {
        return false;
    }
    let mut found = vec![false; element.len()];
    for (index, key) in values.keys.iter().enumerate() {
        // a missing attribute reads as empty, so negated terms still hold
        let value = values.get(index).unwrap_or("");
        for (term, hit) in element.iter().zip(found.iter_mut()) {
            if *hit {
                continue;
            }
            let matched = match &term.kind {
                Kind::Leaf { default, files } => {
                    let predicate = match (key, files) {
                        (Attribute::Files, Some(files)) => files,
                        _ => default,
                    };
                    predicate.test(value)
                }
                Kind::Group(inner) => query_matches(inner, values),
            };
            *hit = matched != term.negated;
        }
        if found.iter().all(|hit| *hit) {
            return true;
        }
    }
    false
}
