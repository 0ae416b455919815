use std::cmp::Ordering;

use time::OffsetDateTime;

/// Rank of a match type, used as the final tie-breaker when ordering keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TypeRank {
    File = 0,
    Commit = 1,
    Diff = 2,
    Repo = 3,
}

/// How a path changed in a commit diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PathStatus {
    #[default]
    Modified,
    Added,
    Deleted,
}

/// Sort and deduplication key shared by every match type.
///
/// Keys order by repository name, then newest author date first, then commit,
/// path, path status and finally type rank. Two matches with equal keys refer
/// to the same result and are expected to be merged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key {
    pub type_rank: TypeRank,
    pub repo: String,
    pub rev: String,
    pub author_date: Option<OffsetDateTime>,
    pub commit: String,
    pub path: String,
    pub path_status: PathStatus,
}

impl Key {
    pub fn new(type_rank: TypeRank, repo: impl Into<String>) -> Self {
        Self {
            type_rank,
            repo: repo.into(),
            rev: String::new(),
            author_date: None,
            commit: String::new(),
            path: String::new(),
            path_status: PathStatus::default(),
        }
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        self.repo
            .cmp(&other.repo)
            .then_with(|| self.rev.cmp(&other.rev))
            // Newer commits sort first.
            .then_with(|| other.author_date.cmp(&self.author_date))
            .then_with(|| self.commit.cmp(&other.commit))
            .then_with(|| self.path.cmp(&other.path))
            .then_with(|| self.path_status.cmp(&other.path_status))
            .then_with(|| self.type_rank.cmp(&other.type_rank))
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn orders_by_repo_first() {
        let a = Key::new(TypeRank::Repo, "a/repo");
        let b = Key::new(TypeRank::File, "b/repo");
        assert!(a < b);
    }

    #[test]
    fn newer_commits_sort_first() {
        let older = Key {
            author_date: Some(datetime!(2022-01-01 0:00 UTC)),
            ..Key::new(TypeRank::Commit, "repo")
        };
        let newer = Key {
            author_date: Some(datetime!(2023-01-01 0:00 UTC)),
            ..Key::new(TypeRank::Commit, "repo")
        };
        assert!(newer < older);
    }

    #[test]
    fn type_rank_breaks_ties() {
        let file = Key::new(TypeRank::File, "repo");
        let repo = Key::new(TypeRank::Repo, "repo");
        assert!(file < repo);
        assert_eq!(file.cmp(&file.clone()), Ordering::Equal);
    }
}
