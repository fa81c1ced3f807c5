//! Recursive-descent parser for the query language.
//!
//! ```text
//! query       := alternative ( '|' alternative )*
//! alternative := term*
//! term        := modifier* ( word | quoted | '(' query ')' )
//! modifier    := '~' | '=' | '%'
//! ```

use std::iter::Peekable;
use std::str::Chars;

use crate::error::PatternError;

/// Modifier and kind flags attached to a term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Flags(u8);

impl Flags {
    pub const NOT: Flags = Flags(1);
    pub const EXACT: Flags = Flags(1 << 1);
    pub const REGEXP: Flags = Flags(1 << 2);
    pub const GROUP: Flags = Flags(1 << 3);

    pub const fn empty() -> Self {
        Flags(0)
    }

    pub const fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Flags) -> Flags {
        Flags(self.0 | other.0)
    }

    pub const fn intersection(self, other: Flags) -> Flags {
        Flags(self.0 & other.0)
    }

    pub const fn toggle(self, other: Flags) -> Flags {
        Flags(self.0 ^ other.0)
    }
}

/// One parsed term, before modifiers are pushed down into groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Literal { flags: Flags, text: String },
    Group { flags: Flags, alternatives: Tree },
}

/// Alternatives (OR) of term sequences (AND).
pub type Tree = Vec<Vec<Node>>;

pub fn parse(text: &str) -> Result<Tree, PatternError> {
    let mut parser = Parser {
        source: text,
        chars: text.chars().peekable(),
    };
    parser.query(false)
}

fn is_special(c: char) -> bool {
    matches!(c, '(' | ')' | '"' | '\'' | '|' | '~' | '=' | '%')
}

struct Parser<'a> {
    source: &'a str,
    chars: Peekable<Chars<'a>>,
}

impl Parser<'_> {
    fn error(&self, message: &str) -> PatternError {
        PatternError::new(self.source, message)
    }

    fn skip_whitespace(&mut self) {
        while self.chars.next_if(|c| c.is_whitespace()).is_some() {}
    }

    fn query(&mut self, nested: bool) -> Result<Tree, PatternError> {
        let mut alternatives = Vec::new();
        let mut current = Vec::new();
        loop {
            self.skip_whitespace();
            match self.chars.peek() {
                None if nested => return Err(self.error("unclosed parenthesis")),
                None => break,
                Some(')') => {
                    self.chars.next();
                    if !nested {
                        return Err(self.error("unclosed parenthesis"));
                    }
                    break;
                }
                Some('|') => {
                    self.chars.next();
                    if !current.is_empty() {
                        alternatives.push(std::mem::take(&mut current));
                    }
                }
                Some(_) => {
                    if let Some(node) = self.term()? {
                        current.push(node);
                    }
                }
            }
        }
        if !current.is_empty() {
            alternatives.push(current);
        }
        Ok(alternatives)
    }

    fn modifiers(&mut self) -> Flags {
        let mut flags = Flags::empty();
        loop {
            match self.chars.peek() {
                Some('~') => flags = flags.union(Flags::NOT),
                Some('=') => flags = flags.union(Flags::EXACT),
                Some('%') => flags = flags.union(Flags::REGEXP),
                Some(c) if c.is_whitespace() => {}
                _ => return flags,
            }
            self.chars.next();
        }
    }

    /// Returns `None` for empty groups and for modifiers with nothing after them.
    fn term(&mut self) -> Result<Option<Node>, PatternError> {
        let flags = self.modifiers();
        match self.chars.peek().copied() {
            Some('(') => {
                self.chars.next();
                let alternatives = self.query(true)?;
                if alternatives.is_empty() {
                    return Ok(None);
                }
                Ok(Some(Node::Group {
                    flags,
                    alternatives,
                }))
            }
            Some(quote @ ('"' | '\'')) => {
                self.chars.next();
                let mut text = String::new();
                loop {
                    match self.chars.next() {
                        Some(c) if c == quote => break,
                        Some(c) => text.push(c),
                        None => return Err(self.error("unclosed quote")),
                    }
                }
                Ok(Some(Node::Literal { flags, text }))
            }
            Some(c) if !is_special(c) => {
                let mut text = String::new();
                while let Some(c) = self
                    .chars
                    .next_if(|c| !c.is_whitespace() && !is_special(*c))
                {
                    text.push(c);
                }
                Ok(Some(Node::Literal { flags, text }))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(flags: Flags, text: &str) -> Node {
        Node::Literal {
            flags,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_parse_words_and_alternatives() {
        let tree = parse("foo bar | baz").unwrap();
        assert_eq!(
            tree,
            vec![
                vec![lit(Flags::empty(), "foo"), lit(Flags::empty(), "bar")],
                vec![lit(Flags::empty(), "baz")],
            ]
        );
    }

    #[test]
    fn test_parse_modifiers_combine() {
        let tree = parse("~=foo %b.r").unwrap();
        assert_eq!(
            tree,
            vec![vec![
                lit(Flags::NOT.union(Flags::EXACT), "foo"),
                lit(Flags::REGEXP, "b.r"),
            ]]
        );
    }

    #[test]
    fn test_special_characters_split_words() {
        let tree = parse("a|b~c").unwrap();
        assert_eq!(
            tree,
            vec![
                vec![lit(Flags::empty(), "a")],
                vec![lit(Flags::empty(), "b"), lit(Flags::NOT, "c")],
            ]
        );
    }

    #[test]
    fn test_quotes_keep_whitespace_and_specials() {
        let tree = parse(r#"'a b' "x|y" """#).unwrap();
        assert_eq!(
            tree,
            vec![vec![
                lit(Flags::empty(), "a b"),
                lit(Flags::empty(), "x|y"),
                lit(Flags::empty(), ""),
            ]]
        );
    }

    #[test]
    fn test_groups_nest() {
        let tree = parse("~(a | =b) c").unwrap();
        assert_eq!(
            tree,
            vec![vec![
                Node::Group {
                    flags: Flags::NOT,
                    alternatives: vec![
                        vec![lit(Flags::empty(), "a")],
                        vec![lit(Flags::EXACT, "b")],
                    ],
                },
                lit(Flags::empty(), "c"),
            ]]
        );
    }

    #[test]
    fn test_empty_group_is_dropped() {
        assert_eq!(parse("~() a").unwrap(), vec![vec![lit(Flags::empty(), "a")]]);
        assert!(parse("()").unwrap().is_empty());
    }

    #[test]
    fn test_dangling_modifier_attaches_across_whitespace() {
        assert_eq!(parse("~ a").unwrap(), vec![vec![lit(Flags::NOT, "a")]]);
        assert!(parse("~").unwrap().is_empty());
    }

    #[test]
    fn test_unclosed_quote() {
        let err = parse("foo \"bar").unwrap_err();
        assert_eq!(err.message, "unclosed quote");
        assert_eq!(err.text, "foo \"bar");
    }

    #[test]
    fn test_unclosed_parenthesis() {
        let err = parse("(foo bar").unwrap_err();
        assert_eq!(err.message, "unclosed parenthesis");
        let err = parse("foo)").unwrap_err();
        assert_eq!(err.message, "unclosed parenthesis");
    }
}
