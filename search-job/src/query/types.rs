use std::fmt;
use std::ops::Deref;

use serde::{Serialize, Serializer};

use super::QueryError;

/// A `field:value` filter of a clause.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Parameter {
    pub field: String,
    pub value: String,
    pub negated: bool,
}

impl Parameter {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            negated: false,
        }
    }

    pub fn negated(mut self) -> Self {
        self.negated = true;
        self
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "-")?;
        }
        write!(f, "{}:", self.field)?;
        if self.value.chars().any(char::is_whitespace) {
            write_quoted(f, &self.value)
        } else {
            write!(f, "{}", self.value)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternKind {
    Literal,
    Regexp,
    /// A literal that was written between double quotes.
    Quoted,
}

/// A single search term.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pattern {
    pub value: String,
    pub negated: bool,
    pub kind: PatternKind,
}

impl Pattern {
    pub fn literal(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            negated: false,
            kind: PatternKind::Literal,
        }
    }

    pub fn regexp(value: impl Into<String>) -> Self {
        Self {
            kind: PatternKind::Regexp,
            ..Self::literal(value)
        }
    }

    pub fn quoted(value: impl Into<String>) -> Self {
        Self {
            kind: PatternKind::Quoted,
            ..Self::literal(value)
        }
    }

    pub fn negate(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    pub fn is_regexp(&self) -> bool {
        self.kind == PatternKind::Regexp
    }

    /// Regular expression source matching this term.
    pub fn to_regex_source(&self) -> String {
        match self.kind {
            PatternKind::Regexp => self.value.clone(),
            PatternKind::Literal | PatternKind::Quoted => regex::escape(&self.value),
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "NOT ")?;
        }
        match self.kind {
            PatternKind::Regexp => write!(f, "/{}/", self.value),
            PatternKind::Quoted => write_quoted(f, &self.value),
            PatternKind::Literal if self.value.chars().any(char::is_whitespace) => {
                write_quoted(f, &self.value)
            }
            PatternKind::Literal => write!(f, "{}", self.value),
        }
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    write!(f, "\"")?;
    for c in value.chars() {
        match c {
            '"' => write!(f, "\\\"")?,
            '\\' => write!(f, "\\\\")?,
            c => write!(f, "{}", c)?,
        }
    }
    write!(f, "\"")
}

/// Pattern expression tree of a clause.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Node {
    Pattern(Pattern),
    And(Vec<Node>),
    Or(Vec<Node>),
    /// Adjacent terms, searched as a phrase.
    Concat(Vec<Node>),
}

impl Node {
    /// All leaves in left-to-right order.
    pub fn leaves(&self) -> Vec<&Pattern> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Pattern>) {
        match self {
            Node::Pattern(p) => out.push(p),
            Node::And(nodes) | Node::Or(nodes) | Node::Concat(nodes) => {
                for node in nodes {
                    node.collect_leaves(out);
                }
            }
        }
    }

    /// Leaves of a pattern that is a single term or a flat concatenation.
    pub fn flat_leaves(&self) -> Option<Vec<&Pattern>> {
        match self {
            Node::Pattern(p) => Some(vec![p]),
            Node::Concat(nodes) => nodes
                .iter()
                .map(|n| match n {
                    Node::Pattern(p) => Some(p),
                    _ => None,
                })
                .collect(),
            Node::And(_) | Node::Or(_) => None,
        }
    }

    pub fn has_or(&self) -> bool {
        match self {
            Node::Pattern(_) => false,
            Node::Or(_) => true,
            Node::And(nodes) | Node::Concat(nodes) => nodes.iter().any(Node::has_or),
        }
    }

    /// Builds a concatenation, collapsing the single-operand case.
    pub fn concat(mut nodes: Vec<Node>) -> Option<Node> {
        match nodes.len() {
            0 => None,
            1 => nodes.pop(),
            _ => Some(Node::Concat(nodes)),
        }
    }

    pub fn and(mut nodes: Vec<Node>) -> Option<Node> {
        match nodes.len() {
            0 => None,
            1 => nodes.pop(),
            _ => Some(Node::And(nodes)),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |f: &mut fmt::Formatter<'_>, nodes: &[Node], sep: &str| -> fmt::Result {
            for (i, node) in nodes.iter().enumerate() {
                if i > 0 {
                    write!(f, "{}", sep)?;
                }
                write!(f, "{}", node)?;
            }
            Ok(())
        };
        match self {
            Node::Pattern(p) => write!(f, "{}", p),
            Node::Concat(nodes) => join(f, nodes, " "),
            Node::And(nodes) => {
                write!(f, "(")?;
                join(f, nodes, " AND ")?;
                write!(f, ")")
            }
            Node::Or(nodes) => {
                write!(f, "(")?;
                join(f, nodes, " OR ")?;
                write!(f, ")")
            }
        }
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One clause of a plan: parameters plus an optional pattern expression.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Basic {
    pub parameters: Vec<Parameter>,
    pub pattern: Option<Node>,
}

impl Basic {
    pub fn new(parameters: Vec<Parameter>, pattern: Option<Node>) -> Self {
        Self {
            parameters,
            pattern,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty() && self.pattern.is_none()
    }

    pub fn with_pattern(&self, pattern: Option<Node>) -> Self {
        Self {
            parameters: self.parameters.clone(),
            pattern,
        }
    }

    /// Human readable rendering: parameters, then the pattern.
    pub fn string_human(&self) -> String {
        let params = self
            .parameters
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        match &self.pattern {
            Some(pattern) => format!("{} {}", params, pattern),
            None => params,
        }
    }
}

impl fmt::Display for Basic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.string_human())
    }
}

/// Independent alternative clauses whose results are unioned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan(Vec<Basic>);

impl Plan {
    pub fn new(clauses: Vec<Basic>) -> Result<Self, QueryError> {
        match clauses.first() {
            None => Err(QueryError::Empty),
            Some(first) if first.is_empty() => Err(QueryError::Empty),
            Some(_) => Ok(Self(clauses)),
        }
    }

    pub fn clauses(&self) -> &[Basic] {
        &self.0
    }
}

impl Deref for Plan {
    type Target = [Basic];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl IntoIterator for Plan {
    type Item = Basic;
    type IntoIter = std::vec::IntoIter<Basic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
