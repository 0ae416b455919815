//! Compiles a plan into a job tree.
//!
//! Every clause, plus the clauses the mutation rules derive from it, becomes
//! `TIMEOUT(LIMIT(SELECT?(fan-out)))`. Clause jobs are combined under one `OR`.

use tracing::instrument;

use crate::config::SearchSettings;
use crate::error::{JobError, Result};
use crate::job::{
    new_or_job, BoxedJob, CommitSearchJob, ComputeExcludedReposJob, IndexedSubsetJob, LimitJob,
    NoopJob, ParallelJob, RepoPagerJob, RepoSearchJob, SearcherJob, SelectJob, SequentialJob,
    TimeoutJob,
};
use crate::mutation::RuleSet;
use crate::query::{
    compile_regex, Basic, IndexMode, Node, Plan, Protocol, RepoOptions, ResultType, SearchType,
};

/// What the compiler needs besides the plan.
#[derive(Debug, Clone, Default)]
pub struct SearchInputs {
    pub search_type: SearchType,
    pub protocol: Protocol,
    pub settings: SearchSettings,
}

impl SearchInputs {
    pub fn new(search_type: SearchType, protocol: Protocol, settings: SearchSettings) -> Self {
        Self {
            search_type,
            protocol,
            settings,
        }
    }

    /// Result limit of clauses without `count:`.
    pub fn default_limit(&self) -> i64 {
        self.settings.limits.default_for(self.protocol)
    }
}

/// Compiles every clause of `plan` and its mutations under one `OR`.
#[instrument(level = "debug", skip_all, fields(clauses = plan.len()))]
pub fn new_plan_job(inputs: &SearchInputs, plan: &Plan) -> Result<BoxedJob> {
    let rules = RuleSet::new(&inputs.settings.mutations);

    let mut clauses: Vec<&Basic> = Vec::new();
    let mut derived: Vec<Basic> = Vec::new();
    for basic in plan.iter() {
        if !clauses.contains(&basic) {
            clauses.push(basic);
        }
        derived.extend(rules.mutate(basic, inputs.search_type));
    }

    let mut children = Vec::with_capacity(clauses.len() + derived.len());
    let mut compiled: Vec<&Basic> = Vec::new();
    for basic in clauses.into_iter().chain(derived.iter()) {
        if compiled.contains(&basic) {
            continue;
        }
        children.push(new_basic_job(inputs, basic)?);
        compiled.push(basic);
    }
    tracing::debug!(jobs = children.len(), "compiled plan");
    Ok(new_or_job(children))
}

/// `TIMEOUT(LIMIT(SELECT?(evaluate)))` for one clause.
pub fn new_basic_job(inputs: &SearchInputs, basic: &Basic) -> Result<BoxedJob> {
    let limits = &inputs.settings.limits;
    let timeouts = &inputs.settings.timeouts;
    let max_results = basic.max_results(inputs.default_limit(), limits.max)?;
    let timeout = basic.timeout(timeouts.default, timeouts.max)?;

    let mut job = to_evaluate_job(inputs, basic)?;
    if let Some(path) = basic.select_path()? {
        job = Box::new(SelectJob::new(path, job));
    }
    Ok(Box::new(TimeoutJob::new(
        timeout,
        Box::new(LimitJob::new(max_results, job)),
    )))
}

/// The backend fan-out of one clause, without limits.
pub fn to_evaluate_job(inputs: &SearchInputs, basic: &Basic) -> Result<BoxedJob> {
    validate(basic)?;

    let max_results = basic.max_results(inputs.default_limit(), inputs.settings.limits.max)?;
    let page_size = inputs.settings.pager.page_size;
    let types = basic.result_types()?;
    let repo_options = basic.repo_options()?;
    repo_options.compile()?;

    let mut children: Vec<BoxedJob> = Vec::new();
    let text_search = basic.pattern.is_some()
        && (types.contains(&ResultType::File) || types.contains(&ResultType::Path));
    if text_search {
        let request = basic.text_request(max_results)?;
        let indexed =
            (request.index != IndexMode::No).then(|| IndexedSubsetJob::new(request.clone()));
        let unindexed = (request.index != IndexMode::Only).then(|| SearcherJob::new(request));
        children.push(Box::new(RepoPagerJob::new(
            repo_options.clone(),
            page_size,
            indexed,
            unindexed,
        )));
    }

    let repo_search = types.contains(&ResultType::Repo)
        .then(|| repo_search_options(&repo_options, basic.pattern.as_ref()))
        .flatten();
    if let Some(opts) = repo_search {
        children.push(Box::new(RepoSearchJob::new(opts, page_size)));
    }

    if !children.is_empty() {
        children.push(Box::new(ComputeExcludedReposJob::new(repo_options.clone())));
    }

    for (ty, diff) in [(ResultType::Commit, false), (ResultType::Diff, true)] {
        if types.contains(&ty) {
            children.push(Box::new(CommitSearchJob::new(
                basic.commit_request(diff, max_results)?,
                repo_options.clone(),
                page_size,
            )));
        }
    }

    if children.is_empty() {
        tracing::debug!(clause = %basic, "no backend answers clause");
        return Ok(Box::new(NoopJob));
    }
    Ok(match inputs.protocol {
        Protocol::Streaming => Box::new(ParallelJob::new(children)),
        Protocol::Batch => Box::new(SequentialJob::new(children)),
    })
}

fn validate(basic: &Basic) -> Result<()> {
    let Some(pattern) = &basic.pattern else {
        return Ok(());
    };
    if pattern.has_or() {
        return Err(JobError::invalid_plan(format!(
            "clause {} contains an OR expression",
            basic
        )));
    }
    for leaf in pattern.leaves().into_iter().filter(|p| p.is_regexp()) {
        compile_regex(&leaf.value, basic.is_case_sensitive())?;
    }
    Ok(())
}

/// Repository filters of a repository-name search, with the pattern as one
/// more filter. `None` when the pattern cannot be read as a repository name.
fn repo_search_options(opts: &RepoOptions, pattern: Option<&Node>) -> Option<RepoOptions> {
    let Some(pattern) = pattern else {
        return Some(opts.clone());
    };
    let leaves = pattern.flat_leaves()?;
    if leaves.iter().any(|p| p.negated) {
        return None;
    }
    let filter = leaves
        .iter()
        .map(|p| p.to_regex_source())
        .collect::<Vec<_>>()
        .join(" ");
    let mut opts = opts.clone();
    opts.repo_filters.push(filter);
    Some(opts)
}
