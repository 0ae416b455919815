//! Result sinks.

use std::sync::Mutex;

use async_trait::async_trait;
use search_result::Match;
use serde::Serialize;
use tokio::sync::mpsc;

/// Counters that travel alongside results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub is_limit_hit: bool,
    pub excluded_forks: usize,
    pub excluded_archived: usize,
}

impl Stats {
    pub fn update(&mut self, other: &Stats) {
        self.is_limit_hit |= other.is_limit_hit;
        self.excluded_forks += other.excluded_forks;
        self.excluded_archived += other.excluded_archived;
    }

    pub fn is_zero(&self) -> bool {
        *self == Stats::default()
    }
}

/// One batch delivered to a sink.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchEvent {
    pub results: Vec<Match>,
    pub stats: Stats,
}

impl SearchEvent {
    pub fn results(results: Vec<Match>) -> Self {
        Self {
            results,
            stats: Stats::default(),
        }
    }

    pub fn stats(stats: Stats) -> Self {
        Self {
            results: Vec::new(),
            stats,
        }
    }
}

/// Append-only receiver of search events, safe for concurrent senders.
///
/// Jobs send through [`SearchContext::send`](crate::SearchContext::send) so
/// that a blocked send gives up when the search is cancelled.
#[async_trait]
pub trait Sender: Send + Sync {
    async fn send(&self, event: SearchEvent);
}

/// Forwards events into a bounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSender {
    tx: mpsc::Sender<SearchEvent>,
}

impl ChannelSender {
    pub fn new(tx: mpsc::Sender<SearchEvent>) -> Self {
        Self { tx }
    }

    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<SearchEvent>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl Sender for ChannelSender {
    async fn send(&self, event: SearchEvent) {
        if self.tx.send(event).await.is_err() {
            tracing::debug!("search event receiver dropped");
        }
    }
}

/// Collects everything sent to it.
#[derive(Debug, Default)]
pub struct Aggregator {
    inner: Mutex<(Vec<Match>, Stats)>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|g| g.0.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> Stats {
        self.inner.lock().map(|g| g.1).unwrap_or_default()
    }

    pub fn into_results(self) -> (Vec<Match>, Stats) {
        match self.inner.into_inner() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl Sender for Aggregator {
    async fn send(&self, event: SearchEvent) {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.0.extend(event.results);
        inner.1.update(&event.stats);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use search_result::{MinimalRepo, RepoMatch};

    #[tokio::test]
    async fn aggregator_collects_results_and_stats() {
        let agg = Aggregator::new();
        let repo = MinimalRepo::new(1, "a/b");
        agg.send(SearchEvent::results(vec![RepoMatch::new(&repo).into()]))
            .await;
        agg.send(SearchEvent::stats(Stats {
            excluded_forks: 2,
            ..Stats::default()
        }))
        .await;
        assert_eq!(agg.len(), 1);
        let (results, stats) = agg.into_results();
        assert_eq!(results.len(), 1);
        assert_eq!(stats.excluded_forks, 2);
        assert!(!stats.is_limit_hit);
    }

    #[tokio::test]
    async fn channel_sender_ignores_dropped_receiver() {
        let (sink, rx) = ChannelSender::channel(1);
        drop(rx);
        sink.send(SearchEvent::default()).await;
    }
}
