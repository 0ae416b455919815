use std::collections::BTreeSet;
use std::str::FromStr;
use std::time::Duration;

use regex::Regex;
use search_result::SelectPath;
use serde::Serialize;
use serde_with::{serde_as, DisplayFromStr};
use strum::{Display, EnumString};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

use super::types::{Basic, Node, Parameter};
use super::*;

/// Whether forks or archived repositories take part in a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize)]
#[strum(ascii_case_insensitive, serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Inclusion {
    Yes,
    #[default]
    No,
    Only,
}

impl Inclusion {
    pub fn admits(self, flag: bool) -> bool {
        match self {
            Inclusion::Yes => true,
            Inclusion::No => !flag,
            Inclusion::Only => flag,
        }
    }
}

/// Which half of the repo pager runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize)]
#[strum(ascii_case_insensitive, serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum IndexMode {
    #[default]
    Yes,
    Only,
    No,
}

/// Repository resolution options derived from a clause.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepoOptions {
    pub repo_filters: Vec<String>,
    pub minus_repo_filters: Vec<String>,
    pub case_sensitive: bool,
    pub fork: Inclusion,
    pub archived: Inclusion,
}

impl RepoOptions {
    /// Compiled include and exclude filters. An invalid filter is a query error.
    pub fn compile(&self) -> Result<(Vec<Regex>, Vec<Regex>), QueryError> {
        let build = |filters: &[String]| {
            filters
                .iter()
                .map(|f| compile_regex(f, self.case_sensitive))
                .collect::<Result<Vec<_>, _>>()
        };
        Ok((build(&self.repo_filters)?, build(&self.minus_repo_filters)?))
    }

    /// Whether `name` passes every include filter and no exclude filter.
    pub fn matches_name(&self, name: &str) -> Result<bool, QueryError> {
        let (include, exclude) = self.compile()?;
        Ok(include.iter().all(|r| r.is_match(name)) && !exclude.iter().any(|r| r.is_match(name)))
    }
}

pub(crate) fn compile_regex(pattern: &str, case_sensitive: bool) -> Result<Regex, QueryError> {
    regex::RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|e| QueryError::InvalidRegexp {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}

/// Content search request handed to the indexed and unindexed searchers.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextRequest {
    pub pattern: Option<Node>,
    pub is_case_sensitive: bool,
    pub file_match_limit: i64,
    pub index: IndexMode,
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub select: Option<SelectPath>,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub languages: Vec<String>,
    pub rev: Option<String>,
    pub pattern_matches_content: bool,
    pub pattern_matches_path: bool,
}

/// Commit and diff search request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitRequest {
    pub pattern: Option<Node>,
    pub diff: bool,
    pub is_case_sensitive: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub after: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub before: Option<OffsetDateTime>,
    pub authors: Vec<String>,
    pub messages: Vec<String>,
    pub include_patterns: Vec<String>,
    pub limit: i64,
}

impl Basic {
    pub fn parameters_of<'a, 'f>(&'a self, field: &'f str) -> impl Iterator<Item = &'a Parameter> + use<'a, 'f> {
        self.parameters.iter().filter(move |p| p.field == field)
    }

    fn values_of(&self, field: &str, negated: bool) -> Vec<String> {
        self.parameters_of(field)
            .filter(|p| p.negated == negated)
            .map(|p| p.value.clone())
            .collect()
    }

    /// The first non-negated value of `field`.
    pub fn string_value(&self, field: &str) -> Option<&str> {
        self.parameters_of(field)
            .find(|p| !p.negated)
            .map(|p| p.value.as_str())
    }

    fn bool_value(&self, field: &str) -> bool {
        matches!(
            self.string_value(field).map(str::to_ascii_lowercase).as_deref(),
            Some("yes" | "true")
        )
    }

    /// Result limit: `count:N`, `count:all` (the service maximum), or `default`.
    pub fn max_results(&self, default: i64, max: i64) -> Result<i64, QueryError> {
        match self.string_value(FIELD_COUNT) {
            None => Ok(default),
            Some(v) if v.eq_ignore_ascii_case("all") => Ok(max),
            Some(v) => v
                .parse::<i64>()
                .ok()
                .filter(|n| *n > 0)
                .map(|n| n.min(max))
                .ok_or_else(|| invalid(FIELD_COUNT, v)),
        }
    }

    /// `timeout:` value capped at `max`, or `default`.
    pub fn timeout(&self, default: Duration, max: Duration) -> Result<Duration, QueryError> {
        match self.string_value(FIELD_TIMEOUT) {
            None => Ok(default.min(max)),
            Some(v) => humantime::parse_duration(v)
                .map(|d| d.min(max))
                .map_err(|_| invalid(FIELD_TIMEOUT, v)),
        }
    }

    pub fn select_path(&self) -> Result<Option<SelectPath>, QueryError> {
        self.string_value(FIELD_SELECT)
            .map(SelectPath::from_str)
            .transpose()
            .map_err(QueryError::from)
    }

    /// `patterntype:` when it names a known type, otherwise `default`.
    pub fn search_type(&self, default: SearchType) -> SearchType {
        self.string_value(FIELD_PATTERN_TYPE)
            .and_then(|v| SearchType::from_str(v).ok())
            .unwrap_or(default)
    }

    pub fn index_mode(&self) -> Result<IndexMode, QueryError> {
        self.string_value(FIELD_INDEX)
            .map(|v| IndexMode::from_str(v).map_err(|_| invalid(FIELD_INDEX, v)))
            .unwrap_or(Ok(IndexMode::Yes))
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.bool_value(FIELD_CASE)
    }

    /// Result types requested with `type:`. Without one, content, path and
    /// repository results are produced.
    pub fn result_types(&self) -> Result<BTreeSet<ResultType>, QueryError> {
        let mut types = BTreeSet::new();
        for v in self.values_of(FIELD_TYPE, false) {
            types.insert(ResultType::from_str(&v).map_err(|_| invalid(FIELD_TYPE, &v))?);
        }
        if types.is_empty() {
            types.extend([ResultType::File, ResultType::Path, ResultType::Repo]);
        }
        Ok(types)
    }

    pub fn repo_options(&self) -> Result<RepoOptions, QueryError> {
        let inclusion = |field: &str| {
            self.string_value(field)
                .map(|v| Inclusion::from_str(v).map_err(|_| invalid(field, v)))
                .unwrap_or(Ok(Inclusion::No))
        };
        Ok(RepoOptions {
            repo_filters: self.values_of(FIELD_REPO, false),
            minus_repo_filters: self.values_of(FIELD_REPO, true),
            case_sensitive: self.is_case_sensitive(),
            fork: inclusion(FIELD_FORK)?,
            archived: inclusion(FIELD_ARCHIVED)?,
        })
    }

    pub fn text_request(&self, file_match_limit: i64) -> Result<TextRequest, QueryError> {
        let types = self.result_types()?;
        Ok(TextRequest {
            pattern: self.pattern.clone(),
            is_case_sensitive: self.is_case_sensitive(),
            file_match_limit,
            index: self.index_mode()?,
            select: self.select_path()?,
            include_patterns: self.values_of(FIELD_FILE, false),
            exclude_patterns: self.values_of(FIELD_FILE, true),
            languages: self.values_of(FIELD_LANG, false),
            rev: self.string_value(FIELD_REV).map(str::to_string),
            pattern_matches_content: types.contains(&ResultType::File),
            pattern_matches_path: types.contains(&ResultType::Path),
        })
    }

    pub fn commit_request(&self, diff: bool, limit: i64) -> Result<CommitRequest, QueryError> {
        self.commit_request_at(diff, limit, OffsetDateTime::now_utc())
    }

    pub(crate) fn commit_request_at(
        &self,
        diff: bool,
        limit: i64,
        now: OffsetDateTime,
    ) -> Result<CommitRequest, QueryError> {
        let time_bound = |field: &str| {
            self.string_value(field)
                .map(|v| parse_time_bound(v, now))
                .transpose()
        };
        Ok(CommitRequest {
            pattern: self.pattern.clone(),
            diff,
            is_case_sensitive: self.is_case_sensitive(),
            after: time_bound(FIELD_AFTER)?,
            before: time_bound(FIELD_BEFORE)?,
            authors: self.values_of(FIELD_AUTHOR, false),
            messages: self.values_of(FIELD_MESSAGE, false),
            include_patterns: self.values_of(FIELD_FILE, false),
            limit,
        })
    }
}

fn invalid(field: &str, value: &str) -> QueryError {
    QueryError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
}

/// Accepts RFC 3339 timestamps, `YYYY-MM-DD` dates and relative durations such
/// as `2 weeks ago`.
fn parse_time_bound(value: &str, now: OffsetDateTime) -> Result<OffsetDateTime, QueryError> {
    if let Ok(t) = OffsetDateTime::parse(value, &Rfc3339) {
        return Ok(t);
    }
    if let Ok(d) = Date::parse(value, format_description!("[year]-[month]-[day]")) {
        return Ok(d.midnight().assume_utc());
    }
    let relative: String = value
        .trim_end_matches("ago")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    humantime::parse_duration(&relative)
        .ok()
        .and_then(|d| time::Duration::try_from(d).ok())
        .map(|d| now - d)
        .ok_or_else(|| QueryError::InvalidTime(value.to_string()))
}
