use async_trait::async_trait;
use serde_json::Value;
use tracing::instrument;

use super::parallel::fold_results;
use super::{describe, BoxedJob, IndexedSubsetJob, Job, ParallelJob, SearcherJob};
use crate::alert::{max_alert, Alert};
use crate::backend::{Clients, IndexedRepos, Repo};
use crate::context::SearchContext;
use crate::error::{BackendError, JobError, Result};
use crate::query::RepoOptions;
use crate::streaming::Sender;

/// Resolves the repositories of a clause page by page and searches each page
/// with an indexed and an unindexed job running side by side.
///
/// Either half may be absent (`index:no`, `index:only`). When the index is
/// unavailable every repository of the page goes to the unindexed half, or
/// the page fails if there is none.
#[derive(Debug)]
pub struct RepoPagerJob {
    repo_options: RepoOptions,
    page_size: usize,
    indexed: Option<IndexedSubsetJob>,
    unindexed: Option<SearcherJob>,
}

impl RepoPagerJob {
    pub fn new(
        repo_options: RepoOptions,
        page_size: usize,
        indexed: Option<IndexedSubsetJob>,
        unindexed: Option<SearcherJob>,
    ) -> Self {
        Self {
            repo_options,
            page_size: page_size.max(1),
            indexed,
            unindexed,
        }
    }

    async fn partition(
        &self,
        ctx: &SearchContext,
        clients: &Clients,
        repos: Vec<Repo>,
    ) -> Result<(IndexedRepos, Option<Alert>)> {
        if self.indexed.is_none() {
            let parts = IndexedRepos {
                indexed: Vec::new(),
                unindexed: repos,
            };
            return Ok((parts, None));
        }
        match clients.indexed.partition(ctx, repos.clone()).await {
            Ok(parts) => Ok((parts, None)),
            Err(BackendError::Cancelled) => Err(JobError::Cancelled),
            Err(err) if self.unindexed.is_none() => Err(JobError::backend(self.name(), err)),
            Err(err) => {
                tracing::warn!(error = %err, "index unavailable, searching without it");
                let parts = IndexedRepos {
                    indexed: Vec::new(),
                    unindexed: repos,
                };
                Ok((parts, Some(Alert::index_degraded(err))))
            }
        }
    }

    async fn search_page(
        &self,
        ctx: &SearchContext,
        clients: &Clients,
        sink: &dyn Sender,
        repos: Vec<Repo>,
    ) -> Result<Option<Alert>> {
        let (parts, alert) = self.partition(ctx, clients, repos).await?;
        tracing::debug!(
            indexed = parts.indexed.len(),
            unindexed = parts.unindexed.len(),
            "searching page"
        );

        let mut children: Vec<BoxedJob> = Vec::with_capacity(2);
        if let Some(job) = &self.indexed {
            children.push(Box::new(job.with_repos(parts.indexed)));
        }
        if let Some(job) = &self.unindexed {
            children.push(Box::new(job.with_repos(parts.unindexed)));
        }
        let outcome = ParallelJob::new(children).run(ctx, clients, sink).await?;
        Ok(max_alert(outcome, alert))
    }
}

#[async_trait]
impl Job for RepoPagerJob {
    #[instrument(level = "debug", skip_all, fields(page_size = self.page_size))]
    async fn run(
        &self,
        ctx: &SearchContext,
        clients: &Clients,
        sink: &dyn Sender,
    ) -> Result<Option<Alert>> {
        let mut outcomes = Vec::new();
        let mut offset = 0;
        loop {
            if let Err(err) = ctx.check() {
                outcomes.push(Err(err));
                break;
            }
            let page = match clients
                .repos
                .list_repos(ctx, &self.repo_options, offset, self.page_size)
                .await
            {
                Ok(page) => page,
                Err(err) => {
                    outcomes.push(Err(JobError::backend(self.name(), err)));
                    break;
                }
            };
            if offset == 0 && page.repos.is_empty() {
                return Ok(Some(Alert::no_repos_matched()));
            }

            let outcome = self.search_page(ctx, clients, sink, page.repos).await;
            if matches!(&outcome, Err(err) if err.is_fatal()) {
                return outcome;
            }
            outcomes.push(outcome);

            match page.next {
                Some(next) => offset = next,
                None => break,
            }
        }
        fold_results(outcomes)
    }

    fn name(&self) -> &'static str {
        "REPOPAGER"
    }

    fn to_json(&self) -> Value {
        let mut children = Vec::new();
        if let Some(job) = &self.indexed {
            children.push(job.to_json());
        }
        if let Some(job) = &self.unindexed {
            children.push(job.to_json());
        }
        describe(self.name(), describe("PARALLEL", Value::Array(children)))
    }
}
