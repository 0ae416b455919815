use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Key, Match, Range, SelectPath, SelectRoot, TypeRank};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RepoId(pub i32);

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The smallest amount of repository information a match carries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MinimalRepo {
    pub id: RepoId,
    pub name: String,
}

impl MinimalRepo {
    pub fn new(id: i32, name: impl Into<String>) -> Self {
        Self {
            id: RepoId(id),
            name: name.into(),
        }
    }

    pub fn url(&self) -> String {
        format!("/{}", self.name)
    }
}

/// A repository that matched by name (or a projection of another match onto
/// its repository).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoMatch {
    pub name: String,
    pub id: RepoId,
    pub description: Option<String>,
    pub rev: Option<String>,
    /// Highlights inside the repository name.
    pub name_ranges: Vec<Range>,
}

impl RepoMatch {
    pub fn new(repo: &MinimalRepo) -> Self {
        Self {
            name: repo.name.clone(),
            id: repo.id,
            description: None,
            rev: None,
            name_ranges: Vec::new(),
        }
    }

    pub fn repo_name(&self) -> MinimalRepo {
        MinimalRepo {
            id: self.id,
            name: self.name.clone(),
        }
    }

    pub fn url(&self) -> String {
        match &self.rev {
            Some(rev) if !rev.is_empty() => format!("/{}@{}", self.name, rev),
            _ => format!("/{}", self.name),
        }
    }

    pub fn key(&self) -> Key {
        Key {
            rev: self.rev.clone().unwrap_or_default(),
            ..Key::new(TypeRank::Repo, self.name.clone())
        }
    }

    pub fn result_count(&self) -> usize {
        1
    }

    pub fn limit(&mut self, limit: i64) -> i64 {
        limit - 1
    }

    pub fn select(self, path: &SelectPath) -> Option<Match> {
        match path.root() {
            SelectRoot::Repository => Some(Match::Repo(self)),
            _ => None,
        }
    }
}
