//! Interfaces to the search backends jobs fan out to.
//!
//! Every call receives the job's [`SearchContext`] and must give up with
//! [`BackendError::Cancelled`] once it is cancelled. Results go to the sink
//! through [`SearchContext::send`].

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use search_result::{MinimalRepo, RepoId};
use serde::{Deserialize, Serialize};

use crate::context::SearchContext;
use crate::error::BackendError;
use crate::query::{CommitRequest, RepoOptions, TextRequest};
use crate::streaming::Sender;

pub type Result<T> = std::result::Result<T, BackendError>;

/// Repository metadata as known to the repository store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Repo {
    pub id: RepoId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub fork: bool,
    #[serde(default)]
    pub archived: bool,
}

impl Repo {
    pub fn minimal(&self) -> MinimalRepo {
        MinimalRepo {
            id: self.id,
            name: self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoPage {
    pub repos: Vec<Repo>,
    /// Offset of the next page, `None` on the last page.
    pub next: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExcludedRepos {
    pub forks: usize,
    pub archived: usize,
}

/// Repositories split by whether the indexed searcher can serve them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexedRepos {
    pub indexed: Vec<Repo>,
    pub unindexed: Vec<Repo>,
}

/// Trait for resolving repository filters to repositories.
#[async_trait]
pub trait RepoStore: Send + Sync {
    /// One page of repositories matching `opts`, ordered by name.
    async fn list_repos(
        &self,
        ctx: &SearchContext,
        opts: &RepoOptions,
        offset: usize,
        limit: usize,
    ) -> Result<RepoPage>;

    /// Forks and archived repositories that match the filters but are
    /// excluded by `opts`.
    async fn excluded_repos(&self, ctx: &SearchContext, opts: &RepoOptions)
        -> Result<ExcludedRepos>;
}

/// Trait for the trigram index.
#[async_trait]
pub trait IndexedSearcher: Send + Sync {
    /// Splits `repos` into the ones the index serves and the rest. Fails when
    /// the index is unavailable.
    async fn partition(&self, ctx: &SearchContext, repos: Vec<Repo>) -> Result<IndexedRepos>;

    async fn search(
        &self,
        ctx: &SearchContext,
        request: &TextRequest,
        repos: &[Repo],
        sink: &dyn Sender,
    ) -> Result<()>;
}

/// Trait for grep-style search over repositories the index does not serve.
#[async_trait]
pub trait UnindexedSearcher: Send + Sync {
    async fn search(
        &self,
        ctx: &SearchContext,
        request: &TextRequest,
        repos: &[Repo],
        sink: &dyn Sender,
    ) -> Result<()>;
}

/// Trait for commit message and diff search.
#[async_trait]
pub trait CommitSearcher: Send + Sync {
    async fn search(
        &self,
        ctx: &SearchContext,
        request: &CommitRequest,
        repos: &[Repo],
        sink: &dyn Sender,
    ) -> Result<()>;
}

/// The backends a job tree runs against.
#[derive(Clone)]
pub struct Clients {
    pub repos: Arc<dyn RepoStore>,
    pub indexed: Arc<dyn IndexedSearcher>,
    pub unindexed: Arc<dyn UnindexedSearcher>,
    pub commits: Arc<dyn CommitSearcher>,
}

impl Clients {
    /// Serves every backend from one implementation.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: RepoStore + IndexedSearcher + UnindexedSearcher + CommitSearcher + 'static,
    {
        Self {
            repos: backend.clone(),
            indexed: backend.clone(),
            unindexed: backend.clone(),
            commits: backend,
        }
    }
}

impl std::fmt::Debug for Clients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clients").finish_non_exhaustive()
    }
}
