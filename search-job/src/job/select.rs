use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use search_result::{Deduper, Key, Match, SelectPath, SelectRoot};
use serde_json::Value;
use tracing::instrument;

use super::{describe_wrapper, BoxedJob, Job};
use crate::alert::Alert;
use crate::backend::Clients;
use crate::context::SearchContext;
use crate::error::Result;
use crate::streaming::{SearchEvent, Sender};

/// Projects every match of its child onto a select path.
///
/// Matches without a projection are dropped and projected matches with equal
/// keys are sent once. Duplicates within a batch are merged; a match already
/// sent is final, so a duplicate arriving in a later batch is dropped along
/// with any highlights it carries. File matches projected onto `content` keep
/// their identity and are never coalesced across batches.
#[derive(Debug)]
pub struct SelectJob {
    path: SelectPath,
    child: BoxedJob,
}

impl SelectJob {
    pub fn new(path: SelectPath, child: BoxedJob) -> Self {
        Self { path, child }
    }
}

#[async_trait]
impl Job for SelectJob {
    #[instrument(level = "debug", skip_all, fields(path = %self.path))]
    async fn run(
        &self,
        ctx: &SearchContext,
        clients: &Clients,
        sink: &dyn Sender,
    ) -> Result<Option<Alert>> {
        let sender = SelectSender {
            parent: sink,
            path: &self.path,
            seen: Mutex::new(HashSet::new()),
        };
        self.child.run(ctx, clients, &sender).await
    }

    fn name(&self) -> &'static str {
        "SELECT"
    }

    fn to_json(&self) -> Value {
        describe_wrapper(self.name(), self.child.as_ref(), self.path.to_string())
    }
}

struct SelectSender<'a> {
    parent: &'a dyn Sender,
    path: &'a SelectPath,
    seen: Mutex<HashSet<Key>>,
}

impl SelectSender<'_> {
    fn project(&self, results: Vec<Match>) -> Vec<Match> {
        let mut batch = Deduper::new();
        for m in results {
            if let Some(projected) = m.select(self.path) {
                batch.add(projected);
            }
        }

        let mut seen = match self.seen.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let content = self.path.root() == SelectRoot::Content;
        batch
            .results()
            .into_iter()
            .filter(|m| (content && matches!(m, Match::File(_))) || seen.insert(m.key()))
            .collect()
    }
}

#[async_trait]
impl Sender for SelectSender<'_> {
    async fn send(&self, event: SearchEvent) {
        let results = self.project(event.results);
        if !results.is_empty() || !event.stats.is_zero() {
            self.parent
                .send(SearchEvent {
                    results,
                    stats: event.stats,
                })
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::tests::{clients, file_match, StaticJob};
    use crate::streaming::Aggregator;

    async fn run(path: &str, batches: Vec<Vec<Match>>) -> Vec<Match> {
        let job = SelectJob::new(path.parse().unwrap(), StaticJob::boxed(batches));
        let sink = Aggregator::new();
        job.run(&SearchContext::new(), &clients(), &sink).await.unwrap();
        sink.into_results().0
    }

    #[tokio::test]
    async fn projects_and_coalesces_repos() {
        let results = run(
            "repo",
            vec![
                vec![file_match("a", "1", 1), file_match("a", "2", 1)],
                vec![file_match("a", "3", 1), file_match("b", "1", 1)],
            ],
        )
        .await;
        let repos: Vec<String> = results.iter().map(|m| m.key().repo).collect();
        assert_eq!(repos, vec!["a", "b"]);
        assert!(results.iter().all(|m| matches!(m, Match::Repo(_))));
    }

    #[tokio::test]
    async fn first_delivery_wins_across_batches() {
        let results = run(
            "file",
            vec![
                vec![file_match("a", "1", 1), file_match("a", "2", 1)],
                vec![file_match("a", "1", 3)],
            ],
        )
        .await;
        let paths: Vec<String> = results.iter().map(|m| m.key().path).collect();
        assert_eq!(paths, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn drops_matches_without_projection() {
        let results = run("commit", vec![vec![file_match("a", "1", 1)]]).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn content_matches_are_not_coalesced_across_batches() {
        let results = run(
            "content",
            vec![vec![file_match("a", "1", 1)], vec![file_match("a", "1", 2)]],
        )
        .await;
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn select_is_idempotent() {
        let input = vec![vec![
            file_match("a", "src/x.rs", 1),
            file_match("a", "src/y.rs", 1),
            file_match("b", "main.rs", 1),
        ]];
        for path in ["repo", "file", "file.directory", "content"] {
            let once = run(path, input.clone()).await;
            let twice = run(path, vec![once.clone()]).await;
            assert_eq!(once, twice, "select:{}", path);
        }
    }
}
