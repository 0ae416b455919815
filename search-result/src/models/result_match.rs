use super::{CommitDiffMatch, CommitMatch, FileMatch, Key, MinimalRepo, RepoMatch, SelectPath};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    #[error("commit match {0} has neither a message nor a diff preview")]
    NoCountableContent(String),
}

/// One search result. The set of variants is closed so every consumer has to
/// handle each kind explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Match {
    File(FileMatch),
    Repo(RepoMatch),
    Commit(CommitMatch),
    CommitDiff(CommitDiffMatch),
}

impl Match {
    pub fn key(&self) -> Key {
        match self {
            Match::File(m) => m.key(),
            Match::Repo(m) => m.key(),
            Match::Commit(m) => m.key(),
            Match::CommitDiff(m) => m.key(),
        }
    }

    pub fn repo_name(&self) -> MinimalRepo {
        match self {
            Match::File(m) => m.repo.clone(),
            Match::Repo(m) => m.repo_name(),
            Match::Commit(m) => m.repo.clone(),
            Match::CommitDiff(m) => m.repo.clone(),
        }
    }

    pub fn result_count(&self) -> usize {
        match self {
            Match::File(m) => m.result_count(),
            Match::Repo(m) => m.result_count(),
            Match::Commit(m) => m.result_count(),
            Match::CommitDiff(m) => m.result_count(),
        }
    }

    /// Trim this match to at most `limit` hits and return the budget that is
    /// left. The result is zero or negative once the budget is used up.
    pub fn try_limit(&mut self, limit: i64) -> Result<i64, MatchError> {
        match self {
            Match::File(m) => Ok(m.limit(limit)),
            Match::Repo(m) => Ok(m.limit(limit)),
            Match::Commit(m) => m.try_limit(limit),
            Match::CommitDiff(m) => Ok(m.limit(limit)),
        }
    }

    /// Like [`Match::try_limit`], but an invariant violation panics in debug
    /// builds and counts as zero hits otherwise.
    pub fn limit(&mut self, limit: i64) -> i64 {
        match self.try_limit(limit) {
            Ok(remaining) => remaining,
            Err(err) => {
                tracing::error!(error = %err, "Limit called on a match without countable content");
                debug_assert!(false, "{}", err);
                limit
            }
        }
    }

    /// Project the match onto `path`, or `None` when it does not satisfy the
    /// projection.
    pub fn select(self, path: &SelectPath) -> Option<Match> {
        match self {
            Match::File(m) => m.select(path),
            Match::Repo(m) => m.select(path),
            Match::Commit(m) => m.select(path),
            Match::CommitDiff(m) => m.select(path),
        }
    }

    pub fn url(&self) -> String {
        match self {
            Match::File(m) => format!("{}/-/blob/{}", m.repo.url(), m.path),
            Match::Repo(m) => m.url(),
            Match::Commit(m) => m.url(),
            Match::CommitDiff(m) => format!("{}/-/commit/{}", m.repo.url(), m.commit.id),
        }
    }
}

impl From<FileMatch> for Match {
    fn from(m: FileMatch) -> Self {
        Match::File(m)
    }
}

impl From<RepoMatch> for Match {
    fn from(m: RepoMatch) -> Self {
        Match::Repo(m)
    }
}

impl From<CommitMatch> for Match {
    fn from(m: CommitMatch) -> Self {
        Match::Commit(m)
    }
}

impl From<CommitDiffMatch> for Match {
    fn from(m: CommitDiffMatch) -> Self {
        Match::CommitDiff(m)
    }
}

pub fn result_count(matches: &[Match]) -> usize {
    matches.iter().map(Match::result_count).sum()
}

/// Trim `matches` so that together they hold at most `limit` hits. Matches
/// after the one that exhausts the budget are dropped. Returns the budget left.
pub fn limit_matches(matches: &mut Vec<Match>, limit: i64) -> i64 {
    let mut remaining = limit;
    let mut keep = matches.len();
    for (i, m) in matches.iter_mut().enumerate() {
        if remaining <= 0 {
            keep = i;
            break;
        }
        remaining = m.limit(remaining);
    }
    matches.truncate(keep);
    remaining
}

/// Sort matches by their key.
pub fn sort_matches(matches: &mut [Match]) {
    matches.sort_by_cached_key(Match::key);
}
