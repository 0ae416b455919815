//! Execution core of a code search service.
//!
//! A query is parsed into a [`Plan`](query::Plan), compiled into a tree of
//! [`Job`]s and run against a set of backend [`Clients`], streaming matches
//! into a [`Sender`].

mod alert;
pub mod backend;
mod client;
mod compile;
mod config;
mod context;
mod error;
pub mod job;
pub mod mutation;
pub mod query;
mod streaming;

pub use alert::{max_alert, max_priority_alert, Alert, AlertKind};
pub use backend::Clients;
pub use client::{SearchClient, SearchStream};
pub use compile::{new_basic_job, new_plan_job, to_evaluate_job, SearchInputs};
pub use self::config::{
    read_settings, LimitSettings, MutationSettings, PagerSettings, SearchSettings, StreamSettings,
    TimeoutSettings,
};
pub use context::SearchContext;
pub use error::{BackendError, JobError, Result};
pub use job::{pretty_json, BoxedJob, Job};
pub use streaming::{Aggregator, ChannelSender, SearchEvent, Sender, Stats};
