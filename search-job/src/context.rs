use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{JobError, Result};
use crate::streaming::{SearchEvent, Sender};

/// Cancellation and deadline of a running job.
///
/// Children derive their context with [`SearchContext::child`]; cancelling a
/// parent cancels every descendant but not the other way around.
#[derive(Debug, Clone, Default)]
pub struct SearchContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl SearchContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            deadline: self.deadline,
        }
    }

    /// Tightens the deadline. A later deadline than the current one is ignored.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn deadline_exceeded(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves once the context is cancelled or its deadline has passed.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.cancel.cancelled().await,
        }
    }

    /// Fails when the context is cancelled or past its deadline.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() || self.deadline_exceeded() {
            return Err(JobError::Cancelled);
        }
        Ok(())
    }

    /// Sends `event` unless the context is done first. Returns whether the
    /// event was delivered.
    pub async fn send(&self, sink: &dyn Sender, event: SearchEvent) -> bool {
        tokio::select! {
            biased;
            _ = self.done() => false,
            _ = sink.send(event) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::streaming::ChannelSender;

    #[tokio::test]
    async fn child_cancellation_is_one_way() {
        let parent = SearchContext::new();
        let child = parent.child();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());

        let child = parent.child();
        parent.cancel();
        assert!(child.is_cancelled());
        assert!(matches!(child.check(), Err(JobError::Cancelled)));
    }

    #[tokio::test]
    async fn deadlines_only_tighten() {
        let now = Instant::now();
        let ctx = SearchContext::new()
            .with_deadline(now + Duration::from_secs(1))
            .with_deadline(now + Duration::from_secs(10));
        assert_eq!(ctx.deadline(), Some(now + Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn blocked_send_observes_cancellation() {
        let (tx, _rx) = tokio::sync::mpsc::channel(1);
        let sink = ChannelSender::new(tx);
        let ctx = SearchContext::new();
        assert!(ctx.send(&sink, SearchEvent::default()).await);

        // The channel is full now, so the next send blocks until cancelled.
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });
        assert!(!ctx.send(&sink, SearchEvent::default()).await);
    }
}
