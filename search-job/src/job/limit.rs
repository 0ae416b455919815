use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use search_result::{limit_matches, result_count};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::{describe_wrapper, BoxedJob, Job};
use crate::alert::{max_alert, Alert};
use crate::backend::Clients;
use crate::context::SearchContext;
use crate::error::Result;
use crate::streaming::{SearchEvent, Sender, Stats};

/// Stops its child after `limit` hits.
///
/// Batches are trimmed against a shared budget. Once the budget is spent the
/// child's context is cancelled and the run reports that the limit was hit. A
/// zero limit never starts the child.
#[derive(Debug)]
pub struct LimitJob {
    limit: i64,
    child: BoxedJob,
}

impl LimitJob {
    pub fn new(limit: i64, child: BoxedJob) -> Self {
        Self { limit, child }
    }
}

#[async_trait]
impl Job for LimitJob {
    #[instrument(level = "debug", skip_all, fields(limit = self.limit))]
    async fn run(
        &self,
        ctx: &SearchContext,
        clients: &Clients,
        sink: &dyn Sender,
    ) -> Result<Option<Alert>> {
        if self.limit <= 0 {
            sink.send(SearchEvent::stats(Stats {
                is_limit_hit: true,
                ..Stats::default()
            }))
            .await;
            return Ok(Some(Alert::limit_hit(self.limit)));
        }

        let ctx = ctx.child();
        let sender = LimitSender::new(sink, self.limit, ctx.token().clone());
        let outcome = self.child.run(&ctx, clients, &sender).await;

        if !sender.is_limit_hit() {
            return outcome;
        }
        match outcome {
            Ok(alert) => Ok(max_alert(alert, Some(Alert::limit_hit(self.limit)))),
            Err(err) if err.is_cancellation() => {
                tracing::debug!(error = %err, "child stopped after result limit");
                Ok(Some(Alert::limit_hit(self.limit)))
            }
            Err(err) if !err.is_fatal() => {
                tracing::warn!(error = %err, "search failed before result limit");
                Ok(max_alert(
                    Some(Alert::partial_results(&[err])),
                    Some(Alert::limit_hit(self.limit)),
                ))
            }
            Err(err) => Err(err),
        }
    }

    fn name(&self) -> &'static str {
        "LIMIT"
    }

    fn to_json(&self) -> Value {
        describe_wrapper(self.name(), self.child.as_ref(), self.limit)
    }
}

struct LimitSender<'a> {
    parent: &'a dyn Sender,
    remaining: AtomicI64,
    hit: AtomicBool,
    cancel: CancellationToken,
}

impl<'a> LimitSender<'a> {
    fn new(parent: &'a dyn Sender, limit: i64, cancel: CancellationToken) -> Self {
        Self {
            parent,
            remaining: AtomicI64::new(limit),
            hit: AtomicBool::new(false),
            cancel,
        }
    }

    fn is_limit_hit(&self) -> bool {
        self.hit.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Sender for LimitSender<'_> {
    async fn send(&self, mut event: SearchEvent) {
        let count = result_count(&event.results) as i64;
        if count == 0 {
            self.parent.send(event).await;
            return;
        }

        let old = self.remaining.fetch_sub(count, Ordering::SeqCst);
        if old > 0 {
            if old < count {
                limit_matches(&mut event.results, old);
            }
            self.parent.send(event).await;
        } else if !event.stats.is_zero() {
            self.parent.send(SearchEvent::stats(event.stats)).await;
        }

        if old - count <= 0 && !self.hit.swap(true, Ordering::SeqCst) {
            self.parent
                .send(SearchEvent::stats(Stats {
                    is_limit_hit: true,
                    ..Stats::default()
                }))
                .await;
            self.cancel.cancel();
        }
    }
}
