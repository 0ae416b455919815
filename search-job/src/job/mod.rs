//! Jobs and the combinators that compose them into a search tree.
//!
//! A job is immutable once built. Everything that changes during a run lives
//! in the [`SearchContext`] and the sink passed to [`Job::run`].

mod backends;
mod limit;
mod parallel;
mod repo_pager;
mod select;
mod sequential;
mod timeout;

pub use backends::{
    CommitSearchJob, ComputeExcludedReposJob, IndexedSubsetJob, RepoSearchJob, SearcherJob,
};
pub use limit::LimitJob;
pub use parallel::{new_or_job, ParallelJob};
pub use repo_pager::RepoPagerJob;
pub use select::SelectJob;
pub use sequential::SequentialJob;
pub use timeout::TimeoutJob;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::alert::Alert;
use crate::backend::Clients;
use crate::context::SearchContext;
use crate::error::Result;
use crate::streaming::Sender;

/// A unit of search execution.
///
/// `run` streams matches into `sink` and returns a best-effort alert. Errors
/// are reserved for conditions that abort the subtree; partial failures are
/// reported through the alert.
#[async_trait]
pub trait Job: Send + Sync {
    async fn run(
        &self,
        ctx: &SearchContext,
        clients: &Clients,
        sink: &dyn Sender,
    ) -> Result<Option<Alert>>;

    fn name(&self) -> &'static str;

    /// Verbose description of this job and its children.
    fn to_json(&self) -> Value;
}

pub type BoxedJob = Box<dyn Job>;

impl std::fmt::Debug for dyn Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

/// Pretty printed [`Job::to_json`].
pub fn pretty_json(job: &dyn Job) -> String {
    serde_json::to_string_pretty(&job.to_json()).unwrap_or_default()
}

/// `{name: value}`
fn describe(name: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(name.to_string(), value);
    Value::Object(map)
}

/// `{name: child, "value": value}`, the shape of wrapping combinators.
fn describe_wrapper(name: &str, child: &dyn Job, value: impl Serialize) -> Value {
    let mut map = Map::new();
    map.insert(name.to_string(), child.to_json());
    map.insert("value".to_string(), to_value(value));
    Value::Object(map)
}

fn to_value(value: impl Serialize) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Does nothing. Compiled for clauses no backend can answer.
#[derive(Debug, Default)]
pub struct NoopJob;

#[async_trait]
impl Job for NoopJob {
    async fn run(&self, _: &SearchContext, _: &Clients, _: &dyn Sender) -> Result<Option<Alert>> {
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "NOOP"
    }

    fn to_json(&self) -> Value {
        describe(self.name(), Value::Object(Map::new()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use search_result::{FileMatch, LineMatch, Match, MinimalRepo};

    use super::*;
    use crate::backend::memory::InMemoryBackend;
    use crate::error::{BackendError, JobError};
    use crate::streaming::SearchEvent;

    pub(crate) fn clients() -> Clients {
        Clients::from_backend(Arc::new(InMemoryBackend::default()))
    }

    pub(crate) fn file_match(repo: &str, path: &str, ranges: usize) -> Match {
        let mut fm = FileMatch::new(MinimalRepo::new(1, repo), path);
        fm.line_matches.push(LineMatch {
            preview: "x".repeat(ranges),
            line_number: 0,
            offset_and_lengths: (0..ranges).map(|i| (i, 1)).collect(),
        });
        Match::File(fm)
    }

    /// Sends fixed batches, optionally pausing between them.
    pub(crate) struct StaticJob {
        pub batches: Vec<Vec<Match>>,
        pub pause: Option<Duration>,
    }

    impl StaticJob {
        pub(crate) fn boxed(batches: Vec<Vec<Match>>) -> BoxedJob {
            Box::new(Self {
                batches,
                pause: None,
            })
        }
    }

    #[async_trait]
    impl Job for StaticJob {
        async fn run(
            &self,
            ctx: &SearchContext,
            _: &Clients,
            sink: &dyn Sender,
        ) -> Result<Option<Alert>> {
            for batch in &self.batches {
                if let Some(pause) = self.pause {
                    tokio::select! {
                        _ = ctx.done() => return Err(JobError::Cancelled),
                        _ = tokio::time::sleep(pause) => {}
                    }
                }
                if !ctx.send(sink, SearchEvent::results(batch.clone())).await {
                    return Err(JobError::Cancelled);
                }
            }
            Ok(None)
        }

        fn name(&self) -> &'static str {
            "Static"
        }

        fn to_json(&self) -> Value {
            describe(self.name(), to_value(self.batches.len()))
        }
    }

    /// Fails with the given error without sending anything.
    pub(crate) struct FailingJob(pub fn() -> JobError);

    impl FailingJob {
        pub(crate) fn unavailable() -> BoxedJob {
            Box::new(Self(|| {
                JobError::backend("searcher", BackendError::Unavailable("down".into()))
            }))
        }
    }

    #[async_trait]
    impl Job for FailingJob {
        async fn run(&self, _: &SearchContext, _: &Clients, _: &dyn Sender) -> Result<Option<Alert>> {
            Err((self.0)())
        }

        fn name(&self) -> &'static str {
            "Failing"
        }

        fn to_json(&self) -> Value {
            describe(self.name(), Value::Null)
        }
    }

    /// Ignores cancellation and never finishes.
    pub(crate) struct StallingJob;

    #[async_trait]
    impl Job for StallingJob {
        async fn run(&self, _: &SearchContext, _: &Clients, _: &dyn Sender) -> Result<Option<Alert>> {
            std::future::pending::<()>().await;
            Ok(None)
        }

        fn name(&self) -> &'static str {
            "Stalling"
        }

        fn to_json(&self) -> Value {
            describe(self.name(), Value::Null)
        }
    }

    #[tokio::test]
    async fn noop_job() {
        let sink = crate::streaming::Aggregator::new();
        let alert = NoopJob
            .run(&SearchContext::new(), &clients(), &sink)
            .await
            .unwrap();
        assert_eq!(alert, None);
        assert!(sink.is_empty());
        assert_eq!(pretty_json(&NoopJob), "{\n  \"NOOP\": {}\n}");
    }
}
