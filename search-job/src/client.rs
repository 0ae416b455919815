use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::instrument;

use crate::alert::Alert;
use crate::backend::Clients;
use crate::compile::{new_plan_job, SearchInputs};
use crate::config::SearchSettings;
use crate::context::SearchContext;
use crate::error::{JobError, Result};
use crate::job::BoxedJob;
use crate::query::{parse, Plan, Protocol, SearchType};
use crate::streaming::{ChannelSender, SearchEvent, Sender};

/// Entry point for running searches against a set of backends.
#[derive(Debug, Clone)]
pub struct SearchClient {
    clients: Clients,
    settings: SearchSettings,
}

impl SearchClient {
    pub fn new(clients: Clients, settings: SearchSettings) -> Self {
        Self { clients, settings }
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    pub fn plan(&self, query: &str, search_type: SearchType) -> Result<Plan> {
        Ok(parse(query, search_type)?)
    }

    /// Compiles `query` without running it.
    pub fn job(&self, query: &str, search_type: SearchType, protocol: Protocol) -> Result<BoxedJob> {
        let plan = self.plan(query, search_type)?;
        new_plan_job(&self.inputs(search_type, protocol), &plan)
    }

    fn inputs(&self, search_type: SearchType, protocol: Protocol) -> SearchInputs {
        SearchInputs::new(search_type, protocol, self.settings.clone())
    }

    /// Compiles and runs `query`, streaming matches into `sink`.
    #[instrument(skip(self, ctx, sink))]
    pub async fn execute(
        &self,
        query: &str,
        search_type: SearchType,
        protocol: Protocol,
        ctx: &SearchContext,
        sink: &dyn Sender,
    ) -> Result<Option<Alert>> {
        let job = self.job(query, search_type, protocol)?;
        tracing::debug!(job = %job.name(), "running search");

        let outcome = job.run(ctx, &self.clients, sink).await;
        match &outcome {
            Ok(alert) => {
                tracing::info!(alert = ?alert.as_ref().map(|a| a.kind), "search finished")
            }
            Err(err) if err.is_cancellation() => tracing::debug!(error = %err, "search cancelled"),
            Err(err) => tracing::error!(error = %err, "search failed"),
        }
        outcome
    }

    /// Runs `query` on a spawned task. Events arrive on the returned stream
    /// until the search finishes or is cancelled.
    pub fn stream(&self, query: &str, search_type: SearchType, protocol: Protocol) -> SearchStream {
        let (sender, events) = ChannelSender::channel(self.settings.stream.buffer);
        let ctx = SearchContext::new();

        let client = self.clone();
        let query = query.to_string();
        let task_ctx = ctx.clone();
        let handle = tokio::spawn(async move {
            client
                .execute(&query, search_type, protocol, &task_ctx, &sender)
                .await
        });

        SearchStream {
            events,
            ctx,
            handle,
        }
    }
}

/// A search running on its own task.
#[derive(Debug)]
pub struct SearchStream {
    events: mpsc::Receiver<SearchEvent>,
    ctx: SearchContext,
    handle: JoinHandle<Result<Option<Alert>>>,
}

impl SearchStream {
    /// The next event, or `None` once the search has finished.
    pub async fn recv(&mut self) -> Option<SearchEvent> {
        self.events.recv().await
    }

    pub fn cancel(&self) {
        self.ctx.cancel();
    }

    /// Waits for the search to finish and returns its outcome. Events not yet
    /// received are discarded.
    pub async fn finish(self) -> Result<Option<Alert>> {
        drop(self.events);
        self.handle
            .await
            .map_err(|e| JobError::Task(e.to_string()))?
    }
}
