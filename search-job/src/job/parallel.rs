use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use tracing::instrument;

use super::{describe, BoxedJob, Job};
use crate::alert::{max_alert, Alert};
use crate::backend::Clients;
use crate::context::SearchContext;
use crate::error::{JobError, Result};
use crate::streaming::Sender;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FanOut {
    Parallel,
    Or,
}

/// Runs every child concurrently into the shared sink.
///
/// `PARALLEL` and `OR` execute the same way. `OR` marks children that are
/// alternative interpretations of one query, so duplicates across them are
/// expected.
#[derive(Debug)]
pub struct ParallelJob {
    kind: FanOut,
    children: Vec<BoxedJob>,
}

impl ParallelJob {
    pub fn new(children: Vec<BoxedJob>) -> Self {
        Self {
            kind: FanOut::Parallel,
            children,
        }
    }

    pub fn or(children: Vec<BoxedJob>) -> Self {
        Self {
            kind: FanOut::Or,
            children,
        }
    }
}

/// An `OR` over `children`, or the child itself when there is only one.
pub fn new_or_job(mut children: Vec<BoxedJob>) -> BoxedJob {
    if children.len() == 1 {
        if let Some(child) = children.pop() {
            return child;
        }
    }
    Box::new(ParallelJob::or(children))
}

#[async_trait]
impl Job for ParallelJob {
    #[instrument(level = "debug", skip_all, fields(job = self.name(), children = self.children.len()))]
    async fn run(
        &self,
        ctx: &SearchContext,
        clients: &Clients,
        sink: &dyn Sender,
    ) -> Result<Option<Alert>> {
        if self.children.is_empty() {
            return Ok(None);
        }

        let ctx = ctx.child();
        let mut running: FuturesUnordered<_> = self
            .children
            .iter()
            .map(|child| child.run(&ctx, clients, sink))
            .collect();

        let mut outcomes = Vec::with_capacity(self.children.len());
        while let Some(outcome) = running.next().await {
            if let Err(err) = &outcome {
                if err.is_fatal() {
                    tracing::error!(error = %err, "aborting fan-out");
                    ctx.cancel();
                    return outcome;
                }
            }
            outcomes.push(outcome);
        }
        fold_results(outcomes)
    }

    fn name(&self) -> &'static str {
        match self.kind {
            FanOut::Parallel => "PARALLEL",
            FanOut::Or => "OR",
        }
    }

    fn to_json(&self) -> Value {
        let children = self.children.iter().map(|c| c.to_json()).collect();
        describe(self.name(), Value::Array(children))
    }
}

/// Combines the outcomes of sibling jobs.
///
/// Fatal errors win. Cancelled siblings neither succeed nor fail. Failures
/// become a partial-results alert while at least one sibling succeeded;
/// otherwise they are returned as the error.
pub(crate) fn fold_results(outcomes: Vec<Result<Option<Alert>>>) -> Result<Option<Alert>> {
    let mut alert = None;
    let mut succeeded = 0;
    let mut cancelled = 0;
    let mut failures = Vec::new();

    for outcome in outcomes {
        match outcome {
            Ok(a) => {
                succeeded += 1;
                alert = max_alert(alert, a);
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) if err.is_cancellation() => {
                tracing::debug!(error = %err, "job cancelled");
                cancelled += 1;
            }
            Err(err) => failures.push(err),
        }
    }

    if failures.is_empty() {
        if succeeded == 0 && cancelled > 0 {
            return Err(JobError::Cancelled);
        }
        return Ok(alert);
    }

    if succeeded == 0 {
        return Err(match failures.len() {
            1 => failures.remove(0),
            _ => JobError::Multiple(failures),
        });
    }

    tracing::warn!(
        failed = failures.len(),
        succeeded,
        "search partially failed"
    );
    Ok(max_alert(alert, Some(Alert::partial_results(&failures))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertKind;
    use crate::job::tests::{clients, file_match, FailingJob, StaticJob};
    use crate::job::NoopJob;
    use crate::streaming::Aggregator;

    #[tokio::test]
    async fn merges_children_into_sink() {
        let job = ParallelJob::new(vec![
            StaticJob::boxed(vec![vec![file_match("a", "1", 1)]]),
            StaticJob::boxed(vec![vec![file_match("b", "2", 1)], vec![file_match("b", "3", 1)]]),
        ]);
        let sink = Aggregator::new();
        let alert = job.run(&SearchContext::new(), &clients(), &sink).await.unwrap();
        assert_eq!(alert, None);
        assert_eq!(sink.len(), 3);
    }

    #[tokio::test]
    async fn failing_branch_becomes_alert() {
        let job = ParallelJob::new(vec![
            FailingJob::unavailable(),
            StaticJob::boxed(vec![vec![file_match("a", "1", 1)]]),
        ]);
        let sink = Aggregator::new();
        let alert = job.run(&SearchContext::new(), &clients(), &sink).await.unwrap();
        assert_eq!(alert.map(|a| a.kind), Some(AlertKind::PartialResults));
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn total_failure_is_an_error() {
        let job = ParallelJob::or(vec![FailingJob::unavailable(), FailingJob::unavailable()]);
        let err = job
            .run(&SearchContext::new(), &clients(), &Aggregator::new())
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Multiple(ref errs) if errs.len() == 2));
    }

    #[tokio::test]
    async fn fatal_error_propagates() {
        let job = ParallelJob::new(vec![
            Box::new(FailingJob(|| JobError::invalid_plan("bad"))) as BoxedJob,
            StaticJob::boxed(vec![vec![file_match("a", "1", 1)]]),
        ]);
        let err = job
            .run(&SearchContext::new(), &clients(), &Aggregator::new())
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn single_child_or_collapses() {
        let job = new_or_job(vec![Box::new(NoopJob) as BoxedJob]);
        assert_eq!(job.name(), "NOOP");
        let job = new_or_job(vec![Box::new(NoopJob) as BoxedJob, Box::new(NoopJob)]);
        assert_eq!(job.to_json(), serde_json::json!({"OR": [{"NOOP": {}}, {"NOOP": {}}]}));
    }

    #[test]
    fn cancelled_only_outcomes() {
        assert!(matches!(
            fold_results(vec![Err(JobError::Cancelled)]),
            Err(JobError::Cancelled)
        ));
        assert_eq!(fold_results(vec![Ok(None), Err(JobError::Cancelled)]).unwrap(), None);
        assert_eq!(fold_results(vec![]).unwrap(), None);
    }
}
