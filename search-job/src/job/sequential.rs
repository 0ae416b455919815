use async_trait::async_trait;
use serde_json::Value;
use tracing::instrument;

use super::parallel::fold_results;
use super::{describe, BoxedJob, Job};
use crate::alert::Alert;
use crate::backend::Clients;
use crate::context::SearchContext;
use crate::error::{JobError, Result};
use crate::streaming::Sender;

/// Runs children one after another, for result sets that must arrive in order.
#[derive(Debug)]
pub struct SequentialJob {
    children: Vec<BoxedJob>,
}

impl SequentialJob {
    pub fn new(children: Vec<BoxedJob>) -> Self {
        Self { children }
    }
}

#[async_trait]
impl Job for SequentialJob {
    #[instrument(level = "debug", skip_all, fields(children = self.children.len()))]
    async fn run(
        &self,
        ctx: &SearchContext,
        clients: &Clients,
        sink: &dyn Sender,
    ) -> Result<Option<Alert>> {
        let mut outcomes = Vec::with_capacity(self.children.len());
        for child in &self.children {
            if ctx.is_cancelled() {
                outcomes.push(Err(JobError::Cancelled));
                break;
            }
            let outcome = child.run(ctx, clients, sink).await;
            if matches!(&outcome, Err(err) if err.is_fatal()) {
                return outcome;
            }
            outcomes.push(outcome);
        }
        fold_results(outcomes)
    }

    fn name(&self) -> &'static str {
        "SEQUENTIAL"
    }

    fn to_json(&self) -> Value {
        let children = self.children.iter().map(|c| c.to_json()).collect();
        describe(self.name(), Value::Array(children))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::tests::{clients, file_match, FailingJob, StaticJob};
    use crate::streaming::Aggregator;

    #[tokio::test]
    async fn preserves_child_order() {
        let job = SequentialJob::new(vec![
            StaticJob::boxed(vec![vec![file_match("a", "1", 1)]]),
            FailingJob::unavailable(),
            StaticJob::boxed(vec![vec![file_match("b", "2", 1)]]),
        ]);
        let sink = Aggregator::new();
        let alert = job.run(&SearchContext::new(), &clients(), &sink).await.unwrap();
        assert!(alert.is_some());
        let (results, _) = sink.into_results();
        let repos: Vec<String> = results.iter().map(|m| m.key().repo).collect();
        assert_eq!(repos, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn stops_when_cancelled() {
        let ctx = SearchContext::new();
        ctx.cancel();
        let job = SequentialJob::new(vec![StaticJob::boxed(vec![vec![file_match("a", "1", 1)]])]);
        let sink = Aggregator::new();
        let err = job.run(&ctx, &clients(), &sink).await.unwrap_err();
        assert!(err.is_cancellation());
        assert!(sink.is_empty());
    }
}
