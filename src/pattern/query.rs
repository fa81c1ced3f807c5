//! Lowering of the parse tree into an ordered, deduplicated query.

use std::cmp::{Ordering, Reverse};

use super::parse::{Flags, Node, Tree};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Body {
    Text(String),
    Group(Query),
}

/// A term after modifiers have been pushed down from enclosing groups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Term {
    pub flags: Flags,
    pub body: Body,
}

impl Term {
    pub fn is_negated(&self) -> bool {
        self.flags.contains(Flags::NOT)
    }

    pub fn is_regexp(&self) -> bool {
        self.flags.contains(Flags::REGEXP)
    }

    pub fn is_exact(&self) -> bool {
        self.flags.contains(Flags::EXACT)
    }
}

/// Terms that must all be satisfied.
pub type Element = Vec<Term>;

/// Alternatives, any of which may match.
pub type Query = Vec<Element>;

pub fn lower(tree: &Tree) -> Query {
    lower_alternatives(tree, Flags::empty())
}

fn lower_alternatives(tree: &Tree, inherited: Flags) -> Query {
    let mut query: Query = Vec::new();
    for alternative in tree {
        let mut element = Vec::new();
        for node in alternative {
            lower_node(node, inherited, &mut element);
        }
        sort_element(&mut element);
        if !element.is_empty() && !query.contains(&element) {
            query.push(element);
        }
    }
    query
}

fn lower_node(node: &Node, inherited: Flags, element: &mut Element) {
    match node {
        Node::Literal { flags, text } => element.push(Term {
            flags: flags.union(inherited),
            body: Body::Text(text.clone()),
        }),
        Node::Group {
            flags,
            alternatives,
        } => {
            let pushed = inherited.union(flags.intersection(Flags::EXACT.union(Flags::REGEXP)));
            let mut inner = lower_alternatives(alternatives, pushed);
            let negated = flags.contains(Flags::NOT);
            if inner.len() == 1 {
                if !negated {
                    element.append(&mut inner[0]);
                    return;
                }
                if inner[0].len() == 1 {
                    if let Some(mut term) = inner[0].pop() {
                        term.flags = term.flags.toggle(Flags::NOT);
                        element.push(term);
                    }
                    return;
                }
            }
            if inner.is_empty() {
                return;
            }
            let mut group_flags = Flags::GROUP;
            if negated {
                group_flags = group_flags.union(Flags::NOT);
            }
            element.push(Term {
                flags: group_flags,
                body: Body::Group(inner),
            });
        }
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct PriorityKey<'a> {
    deferred: bool,
    shape: Shape<'a>,
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Shape<'a> {
    Literal {
        fuzzy: bool,
        length: Reverse<usize>,
        text: &'a str,
    },
    Group {
        first: Option<Box<PriorityKey<'a>>>,
        alternatives: usize,
    },
}

fn priority_key(term: &Term) -> PriorityKey<'_> {
    let deferred = term.is_negated() || term.is_regexp();
    let shape = match &term.body {
        Body::Text(text) => Shape::Literal {
            fuzzy: !term.is_exact(),
            length: Reverse(text.chars().count()),
            text,
        },
        Body::Group(query) => Shape::Group {
            first: query
                .first()
                .and_then(|element| element.first())
                .map(|term| Box::new(priority_key(term))),
            alternatives: query.len(),
        },
    };
    PriorityKey { deferred, shape }
}

fn compare(a: &Term, b: &Term) -> Ordering {
    priority_key(a)
        .cmp(&priority_key(b))
        .then_with(|| a.cmp(b))
}

fn sort_element(element: &mut Element) {
    element.sort_by(compare);
    element.dedup();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::parse::parse;

    fn text(flags: Flags, value: &str) -> Term {
        Term {
            flags,
            body: Body::Text(value.to_string()),
        }
    }

    fn lowered(input: &str) -> Query {
        lower(&parse(input).unwrap())
    }

    #[test]
    fn test_exact_sorts_before_substring() {
        assert_eq!(
            lowered("foo =bar"),
            vec![vec![text(Flags::EXACT, "bar"), text(Flags::empty(), "foo")]]
        );
    }

    #[test]
    fn test_negated_and_regexp_sort_last() {
        assert_eq!(
            lowered("~a %b c"),
            vec![vec![
                text(Flags::empty(), "c"),
                text(Flags::NOT, "a"),
                text(Flags::REGEXP, "b"),
            ]]
        );
    }

    #[test]
    fn test_longer_text_first_within_class() {
        assert_eq!(
            lowered("ab abcd"),
            vec![vec![text(Flags::empty(), "abcd"), text(Flags::empty(), "ab")]]
        );
    }

    #[test]
    fn test_duplicates_removed() {
        assert_eq!(lowered("a a | a"), vec![vec![text(Flags::empty(), "a")]]);
        assert_eq!(lowered("a b | b a").len(), 1);
    }

    #[test]
    fn test_group_flattened() {
        assert_eq!(lowered("(a b) c"), lowered("a b c"));
    }

    #[test]
    fn test_modifiers_pushed_into_group() {
        assert_eq!(
            lowered("=(a | %b)"),
            vec![vec![Term {
                flags: Flags::GROUP,
                body: Body::Group(vec![
                    vec![text(Flags::EXACT, "a")],
                    vec![text(Flags::EXACT.union(Flags::REGEXP), "b")],
                ]),
            }]]
        );
    }

    #[test]
    fn test_double_negation_cancels() {
        assert_eq!(lowered("~(~a)"), lowered("a"));
        assert_eq!(lowered("~(a)"), lowered("~a"));
    }

    #[test]
    fn test_negated_group_kept_whole() {
        let query = lowered("~(a b)");
        assert_eq!(query.len(), 1);
        let term = &query[0][0];
        assert!(term.is_negated());
        assert_eq!(
            term.body,
            Body::Group(vec![vec![text(Flags::empty(), "a"), text(Flags::empty(), "b")]])
        );
    }
}
