//! Leaf jobs, one per backend call.

use async_trait::async_trait;
use search_result::{Match, RepoMatch};
use serde_json::Value;
use tracing::instrument;

use super::{describe, to_value, Job};
use crate::alert::Alert;
use crate::backend::{Clients, Repo};
use crate::context::SearchContext;
use crate::error::{JobError, Result};
use crate::query::{CommitRequest, RepoOptions, TextRequest};
use crate::streaming::{SearchEvent, Sender, Stats};

/// Describes a leaf: its request fields plus the bound repositories, `null`
/// until the repo pager binds a page.
fn describe_leaf(name: &str, request: Value, repos: Option<&[Repo]>) -> Value {
    let mut fields = match request {
        Value::Object(map) => map,
        other => {
            let mut map = serde_json::Map::new();
            map.insert("request".to_string(), other);
            map
        }
    };
    let repos = repos.map(|rs| rs.iter().map(|r| r.name.clone()).collect::<Vec<_>>());
    fields.insert("repos".to_string(), to_value(repos));
    describe(name, Value::Object(fields))
}

/// Indexed search over the indexed subset of a page of repositories.
#[derive(Debug, Clone)]
pub struct IndexedSubsetJob {
    request: TextRequest,
    repos: Option<Vec<Repo>>,
}

impl IndexedSubsetJob {
    pub fn new(request: TextRequest) -> Self {
        Self {
            request,
            repos: None,
        }
    }

    pub fn with_repos(&self, repos: Vec<Repo>) -> Self {
        Self {
            request: self.request.clone(),
            repos: Some(repos),
        }
    }
}

#[async_trait]
impl Job for IndexedSubsetJob {
    #[instrument(level = "debug", skip_all, fields(repos = self.repos.as_ref().map_or(0, Vec::len)))]
    async fn run(
        &self,
        ctx: &SearchContext,
        clients: &Clients,
        sink: &dyn Sender,
    ) -> Result<Option<Alert>> {
        let Some(repos) = self.repos.as_deref().filter(|rs| !rs.is_empty()) else {
            return Ok(None);
        };
        clients
            .indexed
            .search(ctx, &self.request, repos, sink)
            .await
            .map_err(|e| JobError::backend(self.name(), e))?;
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "ZoektRepoSubset"
    }

    fn to_json(&self) -> Value {
        describe_leaf(self.name(), to_value(&self.request), self.repos.as_deref())
    }
}

/// Unindexed search over repositories the index does not serve.
#[derive(Debug, Clone)]
pub struct SearcherJob {
    request: TextRequest,
    repos: Option<Vec<Repo>>,
}

impl SearcherJob {
    pub fn new(request: TextRequest) -> Self {
        Self {
            request,
            repos: None,
        }
    }

    pub fn with_repos(&self, repos: Vec<Repo>) -> Self {
        Self {
            request: self.request.clone(),
            repos: Some(repos),
        }
    }
}

#[async_trait]
impl Job for SearcherJob {
    #[instrument(level = "debug", skip_all, fields(repos = self.repos.as_ref().map_or(0, Vec::len)))]
    async fn run(
        &self,
        ctx: &SearchContext,
        clients: &Clients,
        sink: &dyn Sender,
    ) -> Result<Option<Alert>> {
        let Some(repos) = self.repos.as_deref().filter(|rs| !rs.is_empty()) else {
            return Ok(None);
        };
        clients
            .unindexed
            .search(ctx, &self.request, repos, sink)
            .await
            .map_err(|e| JobError::backend(self.name(), e))?;
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "Searcher"
    }

    fn to_json(&self) -> Value {
        describe_leaf(self.name(), to_value(&self.request), self.repos.as_deref())
    }
}

/// Repositories whose names match the repository filters and the pattern.
#[derive(Debug, Clone)]
pub struct RepoSearchJob {
    repo_options: RepoOptions,
    page_size: usize,
}

impl RepoSearchJob {
    /// `repo_options` must already carry the pattern as an extra filter.
    pub fn new(repo_options: RepoOptions, page_size: usize) -> Self {
        Self {
            repo_options,
            page_size,
        }
    }
}

#[async_trait]
impl Job for RepoSearchJob {
    #[instrument(level = "debug", skip_all)]
    async fn run(
        &self,
        ctx: &SearchContext,
        clients: &Clients,
        sink: &dyn Sender,
    ) -> Result<Option<Alert>> {
        let mut offset = 0;
        loop {
            ctx.check()?;
            let page = clients
                .repos
                .list_repos(ctx, &self.repo_options, offset, self.page_size)
                .await
                .map_err(|e| JobError::backend(self.name(), e))?;
            let results: Vec<Match> = page
                .repos
                .iter()
                .map(|r| {
                    let mut m = RepoMatch::new(&r.minimal());
                    m.description = r.description.clone();
                    Match::Repo(m)
                })
                .collect();
            if !results.is_empty() && !ctx.send(sink, SearchEvent::results(results)).await {
                return Err(JobError::Cancelled);
            }
            match page.next {
                Some(next) => offset = next,
                None => return Ok(None),
            }
        }
    }

    fn name(&self) -> &'static str {
        "RepoSearch"
    }

    fn to_json(&self) -> Value {
        describe(self.name(), to_value(&self.repo_options))
    }
}

/// Reports forks and archived repositories the filters silently excluded.
#[derive(Debug, Clone)]
pub struct ComputeExcludedReposJob {
    repo_options: RepoOptions,
}

impl ComputeExcludedReposJob {
    pub fn new(repo_options: RepoOptions) -> Self {
        Self { repo_options }
    }
}

#[async_trait]
impl Job for ComputeExcludedReposJob {
    #[instrument(level = "debug", skip_all)]
    async fn run(
        &self,
        ctx: &SearchContext,
        clients: &Clients,
        sink: &dyn Sender,
    ) -> Result<Option<Alert>> {
        let excluded = clients
            .repos
            .excluded_repos(ctx, &self.repo_options)
            .await
            .map_err(|e| JobError::backend(self.name(), e))?;
        if excluded.forks == 0 && excluded.archived == 0 {
            return Ok(None);
        }

        let stats = Stats {
            excluded_forks: excluded.forks,
            excluded_archived: excluded.archived,
            ..Stats::default()
        };
        ctx.send(sink, SearchEvent::stats(stats)).await;
        Ok(Some(Alert::excluded_repos(excluded.forks, excluded.archived)))
    }

    fn name(&self) -> &'static str {
        "ComputeExcludedRepos"
    }

    fn to_json(&self) -> Value {
        describe(self.name(), to_value(&self.repo_options))
    }
}

/// Commit message or diff search over every matching repository.
#[derive(Debug, Clone)]
pub struct CommitSearchJob {
    request: CommitRequest,
    repo_options: RepoOptions,
    page_size: usize,
}

impl CommitSearchJob {
    pub fn new(request: CommitRequest, repo_options: RepoOptions, page_size: usize) -> Self {
        Self {
            request,
            repo_options,
            page_size,
        }
    }
}

#[async_trait]
impl Job for CommitSearchJob {
    #[instrument(level = "debug", skip_all, fields(diff = self.request.diff))]
    async fn run(
        &self,
        ctx: &SearchContext,
        clients: &Clients,
        sink: &dyn Sender,
    ) -> Result<Option<Alert>> {
        let mut offset = 0;
        loop {
            ctx.check()?;
            let page = clients
                .repos
                .list_repos(ctx, &self.repo_options, offset, self.page_size)
                .await
                .map_err(|e| JobError::backend(self.name(), e))?;
            if !page.repos.is_empty() {
                clients
                    .commits
                    .search(ctx, &self.request, &page.repos, sink)
                    .await
                    .map_err(|e| JobError::backend(self.name(), e))?;
            }
            match page.next {
                Some(next) => offset = next,
                None => return Ok(None),
            }
        }
    }

    fn name(&self) -> &'static str {
        if self.request.diff {
            "Diff"
        } else {
            "Commit"
        }
    }

    fn to_json(&self) -> Value {
        let mut request = to_value(&self.request);
        if let Value::Object(map) = &mut request {
            map.insert("repo_options".to_string(), to_value(&self.repo_options));
        }
        describe(self.name(), request)
    }
}
