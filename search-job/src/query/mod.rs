//! Clause model and a lightweight scanner producing plans from query strings.

mod options;
mod parser;
mod types;

pub(crate) use options::compile_regex;
pub use options::{CommitRequest, IndexMode, Inclusion, RepoOptions, TextRequest};
pub use parser::parse;
pub use types::{Basic, Node, Parameter, Pattern, PatternKind, Plan};

use search_result::SelectPathError;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub const FIELD_REPO: &str = "repo";
pub const FIELD_FILE: &str = "file";
pub const FIELD_REV: &str = "rev";
pub const FIELD_SELECT: &str = "select";
pub const FIELD_COUNT: &str = "count";
pub const FIELD_TIMEOUT: &str = "timeout";
pub const FIELD_TYPE: &str = "type";
pub const FIELD_PATTERN_TYPE: &str = "patterntype";
pub const FIELD_CASE: &str = "case";
pub const FIELD_FORK: &str = "fork";
pub const FIELD_ARCHIVED: &str = "archived";
pub const FIELD_INDEX: &str = "index";
pub const FIELD_LANG: &str = "lang";
pub const FIELD_AFTER: &str = "after";
pub const FIELD_BEFORE: &str = "before";
pub const FIELD_AUTHOR: &str = "author";
pub const FIELD_MESSAGE: &str = "message";

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("query is empty")]
    Empty,
    #[error("unterminated quoted string starting at {0}")]
    UnterminatedQuote(usize),
    #[error("invalid value {value:?} for field {field}")]
    InvalidValue { field: String, value: String },
    #[error("invalid regular expression {pattern:?}: {reason}")]
    InvalidRegexp { pattern: String, reason: String },
    #[error(transparent)]
    InvalidSelect(#[from] SelectPathError),
    #[error("invalid time bound {0:?}")]
    InvalidTime(String),
}

/// How unannotated patterns are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize)]
#[strum(ascii_case_insensitive, serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    #[default]
    Literal,
    #[strum(serialize = "regexp", serialize = "regex")]
    Regexp,
    /// Literal, except `/.../` delimits a regular expression.
    Standard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize)]
#[strum(ascii_case_insensitive, serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Streaming,
    Batch,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, Serialize,
)]
#[strum(ascii_case_insensitive, serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ResultType {
    File,
    Path,
    Repo,
    Commit,
    Diff,
    Symbol,
}
