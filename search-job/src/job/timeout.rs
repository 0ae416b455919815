use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;
use tracing::instrument;

use super::{describe_wrapper, BoxedJob, Job};
use crate::alert::{max_alert, Alert};
use crate::backend::Clients;
use crate::context::SearchContext;
use crate::error::{JobError, Result};
use crate::streaming::Sender;

/// Bounds the run time of its child.
///
/// At the deadline the child is cancelled and dropped, so control returns even
/// if the child ignores cancellation. An expired deadline is reported as a
/// "timed out" alert, even when parts of the child finished in time, or as [`JobError::DeadlineExceeded`] when the job was
/// built with [`TimeoutJob::hard`].
#[derive(Debug)]
pub struct TimeoutJob {
    timeout: Duration,
    hard: bool,
    child: BoxedJob,
}

impl TimeoutJob {
    pub fn new(timeout: Duration, child: BoxedJob) -> Self {
        Self {
            timeout,
            hard: false,
            child,
        }
    }

    pub fn hard(mut self) -> Self {
        self.hard = true;
        self
    }

    fn expired(&self) -> Result<Option<Alert>> {
        tracing::debug!(timeout = ?self.timeout, "search deadline expired");
        if self.hard {
            Err(JobError::DeadlineExceeded(self.timeout))
        } else {
            Ok(Some(Alert::timed_out(self.timeout)))
        }
    }
}

#[async_trait]
impl Job for TimeoutJob {
    #[instrument(level = "debug", skip_all, fields(timeout = ?self.timeout))]
    async fn run(
        &self,
        ctx: &SearchContext,
        clients: &Clients,
        sink: &dyn Sender,
    ) -> Result<Option<Alert>> {
        let ctx = ctx.child().with_deadline(Instant::now() + self.timeout);
        let _cancel_on_exit = ctx.token().clone().drop_guard();

        match tokio::time::timeout(self.timeout, self.child.run(&ctx, clients, sink)).await {
            Ok(Ok(alert)) if ctx.deadline_exceeded() => Ok(max_alert(alert, self.expired()?)),
            Ok(Err(err)) if !err.is_fatal() && ctx.deadline_exceeded() => {
                tracing::debug!(error = %err, "child stopped at deadline");
                self.expired()
            }
            Ok(outcome) => outcome,
            Err(_) => self.expired(),
        }
    }

    fn name(&self) -> &'static str {
        "TIMEOUT"
    }

    fn to_json(&self) -> Value {
        let value = humantime::format_duration(self.timeout).to_string();
        describe_wrapper(self.name(), self.child.as_ref(), value)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::alert::AlertKind;
    use crate::job::tests::{clients, file_match, StallingJob, StaticJob};
    use crate::job::{NoopJob, ParallelJob};
    use crate::streaming::Aggregator;

    #[tokio::test]
    async fn returns_at_deadline_when_child_stalls() {
        let job = TimeoutJob::new(Duration::from_millis(50), Box::new(StallingJob));
        let started = std::time::Instant::now();
        let alert = job
            .run(&SearchContext::new(), &clients(), &Aggregator::new())
            .await
            .unwrap();
        assert_eq!(alert.map(|a| a.kind), Some(AlertKind::TimedOut));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn cooperative_child_times_out_with_partial_results() {
        let child = StaticJob {
            batches: vec![vec![file_match("a", "1", 1)]; 100],
            pause: Some(Duration::from_millis(20)),
        };
        let job = TimeoutJob::new(Duration::from_millis(70), Box::new(child));
        let sink = Aggregator::new();
        let alert = job.run(&SearchContext::new(), &clients(), &sink).await.unwrap();
        assert_eq!(alert.map(|a| a.kind), Some(AlertKind::TimedOut));
        assert!(!sink.is_empty());
        assert!(sink.len() < 100);
    }

    #[tokio::test]
    async fn reports_timeout_when_only_some_branches_finished() {
        let slow = StaticJob {
            batches: vec![vec![file_match("b", "1", 1)]; 100],
            pause: Some(Duration::from_millis(20)),
        };
        let child = ParallelJob::new(vec![
            StaticJob::boxed(vec![vec![file_match("a", "1", 1)]]),
            Box::new(slow),
        ]);
        let job = TimeoutJob::new(Duration::from_millis(70), Box::new(child));
        let sink = Aggregator::new();
        let alert = job.run(&SearchContext::new(), &clients(), &sink).await.unwrap();
        assert_eq!(alert.map(|a| a.kind), Some(AlertKind::TimedOut));
        assert!(sink.len() > 1);
        assert!(sink.len() < 101);
    }

    #[tokio::test]
    async fn hard_deadline_is_an_error() {
        let job = TimeoutJob::new(Duration::from_millis(10), Box::new(StallingJob)).hard();
        let err = job
            .run(&SearchContext::new(), &clients(), &Aggregator::new())
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::DeadlineExceeded(_)));
    }

    #[test]
    fn describes_timeout_in_human_units() {
        let job = TimeoutJob::new(Duration::from_secs(20), Box::new(NoopJob));
        assert_eq!(
            job.to_json(),
            serde_json::json!({"TIMEOUT": {"NOOP": {}}, "value": "20s"})
        );
    }
}
