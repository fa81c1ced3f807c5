//! Classification bit-sets for packages and enumeration sources.

use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not};
use std::str::FromStr;

use anyhow::bail;

/// Status of a package summary: installation state bits plus origin bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct State(u32);

impl State {
    pub const NONE: State = State(0);
    pub const NON_INSTALLED: State = State(1);
    pub const INSTALLED: State = State(1 << 1);
    pub const EXPLICIT: State = State(1 << 2);
    pub const DEPENDENCY: State = State(1 << 3);
    pub const OPTIONAL: State = State(1 << 4);
    pub const ORPHAN: State = State(1 << 5);
    pub const FOREIGN: State = State(1 << 6);
    pub const UPGRADE: State = State(1 << 7);
    pub const DOWNGRADE: State = State(1 << 8);
    pub const UPDATE: State = State(Self::UPGRADE.0 | Self::DOWNGRADE.0);
    pub const REMOTE: State = State(1 << 9);
    pub const GROUP: State = State(1 << 10);
    pub const UNKNOWN: State = State(1 << 11);
    pub const DATABASE: State = State(1 << 12);

    const NAMES: [(State, &'static str); 13] = [
        (State::NON_INSTALLED, "not-installed"),
        (State::INSTALLED, "installed"),
        (State::EXPLICIT, "explicit"),
        (State::DEPENDENCY, "dependency"),
        (State::OPTIONAL, "optional"),
        (State::ORPHAN, "orphan"),
        (State::FOREIGN, "foreign"),
        (State::UPGRADE, "upgrade"),
        (State::DOWNGRADE, "downgrade"),
        (State::REMOTE, "remote"),
        (State::GROUP, "group"),
        (State::UNKNOWN, "unknown"),
        (State::DATABASE, "database"),
    ];

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if every bit of `other` is set.
    pub const fn contains(self, other: State) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if any bit of `other` is set.
    pub const fn intersects(self, other: State) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: State) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: State) {
        self.0 &= !other.0;
    }

    /// Filter used when the caller did not ask for anything specific.
    pub fn or_default_filter(self) -> State {
        if self.is_empty() {
            State::INSTALLED | State::NON_INSTALLED | State::UPDATE
        } else {
            self
        }
    }

    /// Parses a comma separated list of filter names (`installed,update`).
    pub fn parse_list(text: &str) -> anyhow::Result<State> {
        text.split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .try_fold(State::NONE, |acc, name| Ok(acc | name.parse::<State>()?))
    }
}

impl BitOr for State {
    type Output = State;

    fn bitor(self, rhs: State) -> State {
        State(self.0 | rhs.0)
    }
}

impl BitOrAssign for State {
    fn bitor_assign(&mut self, rhs: State) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for State {
    type Output = State;

    fn bitand(self, rhs: State) -> State {
        State(self.0 & rhs.0)
    }
}

impl BitAndAssign for State {
    fn bitand_assign(&mut self, rhs: State) {
        self.0 &= rhs.0;
    }
}

impl Not for State {
    type Output = State;

    fn not(self) -> State {
        State(!self.0)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = State::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        f.write_str(&names.join(","))
    }
}

impl FromStr for State {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.to_lowercase();
        if name == "update" {
            return Ok(State::UPDATE);
        }
        match State::NAMES.iter().find(|(_, candidate)| *candidate == name) {
            Some((flag, _)) => Ok(*flag),
            None => bail!("Unknown filter: {}", s),
        }
    }
}

/// Selects which databases an enumeration walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Source(u8);

impl Source {
    pub const LOCAL: Source = Source(1);
    pub const SYNC: Source = Source(1 << 1);
    pub const FOREIGN: Source = Source(1 << 2);

    pub const fn intersects(self, other: Source) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Source {
    type Output = Source;

    fn bitor(self, rhs: Source) -> Source {
        Source(self.0 | rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_and_intersects() {
        let state = State::INSTALLED | State::UPGRADE;
        assert!(state.contains(State::INSTALLED));
        assert!(!state.contains(State::UPDATE));
        assert!(state.intersects(State::UPDATE));
        assert!(!state.intersects(State::NON_INSTALLED));
    }

    #[test]
    fn test_insert_remove() {
        let mut state = State::GROUP | State::INSTALLED;
        state.remove(State::GROUP);
        assert_eq!(state, State::INSTALLED);
        state.insert(State::REMOTE);
        assert!(state.contains(State::REMOTE));
    }

    #[test]
    fn test_default_filter() {
        assert_eq!(
            State::NONE.or_default_filter(),
            State::INSTALLED | State::NON_INSTALLED | State::UPDATE
        );
        assert_eq!(State::FOREIGN.or_default_filter(), State::FOREIGN);
    }

    #[test]
    fn test_parse_list() {
        let state = State::parse_list("installed, update").unwrap();
        assert_eq!(state, State::INSTALLED | State::UPDATE);
        assert!(State::parse_list("bogus").is_err());
        assert_eq!(State::parse_list("").unwrap(), State::NONE);
    }

    #[test]
    fn test_display() {
        let state = State::NON_INSTALLED | State::REMOTE;
        assert_eq!(state.to_string(), "not-installed,remote");
        assert_eq!(State::NONE.to_string(), "");
    }

    #[test]
    fn test_source_ops() {
        let source = Source::SYNC | Source::LOCAL;
        assert!(source.intersects(Source::LOCAL));
        assert!(!source.intersects(Source::FOREIGN));
        assert!(Source::default().is_empty());
    }
}
