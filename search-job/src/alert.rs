use std::time::Duration;

use serde::Serialize;
use strum::Display;

use crate::error::JobError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    ExcludedRepos,
    LimitHit,
    NoReposMatched,
    IndexDegraded,
    TimedOut,
    PartialResults,
}

impl AlertKind {
    fn priority(self) -> u8 {
        match self {
            AlertKind::ExcludedRepos => 0,
            AlertKind::LimitHit => 1,
            AlertKind::NoReposMatched => 2,
            AlertKind::IndexDegraded => 3,
            AlertKind::TimedOut => 4,
            AlertKind::PartialResults => 5,
        }
    }
}

/// Best-effort notice about a search that still produced results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub title: String,
    pub description: String,
}

impl Alert {
    fn new(kind: AlertKind, title: &str, description: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.to_string(),
            description: description.into(),
        }
    }

    pub fn priority(&self) -> u8 {
        self.kind.priority()
    }

    pub fn limit_hit(limit: i64) -> Self {
        Self::new(
            AlertKind::LimitHit,
            "Result limit hit",
            format!("Only the first {} results are shown.", limit),
        )
    }

    pub fn timed_out(timeout: Duration) -> Self {
        Self::new(
            AlertKind::TimedOut,
            "Timed out",
            format!(
                "The search did not finish within {}, results may be incomplete.",
                humantime::format_duration(timeout)
            ),
        )
    }

    pub fn excluded_repos(forks: usize, archived: usize) -> Self {
        Self::new(
            AlertKind::ExcludedRepos,
            "Some repositories were excluded",
            format!(
                "{} forked and {} archived repositories were not searched. Use fork:yes or archived:yes to include them.",
                forks, archived
            ),
        )
    }

    pub fn no_repos_matched() -> Self {
        Self::new(
            AlertKind::NoReposMatched,
            "No repositories matched",
            "No repositories satisfied the repository filters of the query.",
        )
    }

    pub fn index_degraded(reason: impl std::fmt::Display) -> Self {
        Self::new(
            AlertKind::IndexDegraded,
            "Index unavailable",
            format!("All repositories were searched without the index: {}", reason),
        )
    }

    pub fn partial_results(errors: &[JobError]) -> Self {
        let reasons: Vec<String> = errors.iter().map(ToString::to_string).collect();
        Self::new(
            AlertKind::PartialResults,
            "Some results are missing",
            format!("Parts of the search failed: {}", reasons.join("; ")),
        )
    }
}

/// The more important of two alerts. Ties keep `a`.
pub fn max_alert(a: Option<Alert>, b: Option<Alert>) -> Option<Alert> {
    match (a, b) {
        (Some(a), Some(b)) if b.priority() > a.priority() => Some(b),
        (Some(a), _) => Some(a),
        (None, b) => b,
    }
}

pub fn max_priority_alert(alerts: impl IntoIterator<Item = Option<Alert>>) -> Option<Alert> {
    alerts.into_iter().fold(None, max_alert)
}
