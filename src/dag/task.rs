// src/dag/task.rs

//! Units of work and how they attach to the graph.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::models::RunContext;

/// A schedulable unit of work.
///
/// Receives the run context and the assembled upstream data, returns the
/// value handed to downstream tasks.
#[async_trait]
pub trait Task: Send + Sync {
    async fn run(&self, ctx: &RunContext, input: Value) -> Result<Value>;
}

/// Adapts an async closure into a [`Task`].
pub struct FnTask<F>(F);

#[async_trait]
impl<F, Fut> Task for FnTask<F>
where
    F: Fn(RunContext, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    async fn run(&self, ctx: &RunContext, input: Value) -> Result<Value> {
        (self.0)(ctx.clone(), input).await
    }
}

/// Wrap an async closure as a task.
pub fn fn_task<F, Fut>(f: F) -> Arc<dyn Task>
where
    F: Fn(RunContext, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(FnTask(f))
}

/// How a task depends on one of its upstream tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dependency {
    /// Wait for completion only
    Order,
    /// Receive the upstream output
    Data,
    /// One instance per element of the upstream output array
    Expand,
    /// Receive every instance output of a mapped upstream as one array
    Collect,
}

impl Dependency {
    /// Whether the upstream value reaches the task input.
    pub fn carries_data(self) -> bool {
        !matches!(self, Dependency::Order)
    }
}

/// An incoming edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub upstream: String,
    pub kind: Dependency,
}

/// A task together with its dependencies and retry policy.
#[derive(Clone)]
pub struct TaskSpec {
    pub(crate) id: String,
    pub(crate) task: Arc<dyn Task>,
    pub(crate) upstream: Vec<Edge>,
    pub(crate) retries: Option<u32>,
    pub(crate) retry_delay: Option<Duration>,
    pub(crate) input: Option<Value>,
}

impl TaskSpec {
    pub fn new(id: impl Into<String>, task: Arc<dyn Task>) -> Self {
        Self {
            id: id.into(),
            task,
            upstream: Vec::new(),
            retries: None,
            retry_delay: None,
            input: None,
        }
    }

    fn depends(mut self, upstream: &str, kind: Dependency) -> Self {
        self.upstream.push(Edge {
            upstream: upstream.to_string(),
            kind,
        });
        self
    }

    /// Run after `upstream` completes, ignoring its output.
    pub fn after(self, upstream: &str) -> Self {
        self.depends(upstream, Dependency::Order)
    }

    /// Consume the output of `upstream`.
    pub fn data_from(self, upstream: &str) -> Self {
        self.depends(upstream, Dependency::Data)
    }

    /// Fan out over the array returned by `upstream`.
    pub fn expand_from(self, upstream: &str) -> Self {
        self.depends(upstream, Dependency::Expand)
    }

    /// Join every instance of the mapped task `upstream`.
    pub fn collect_from(self, upstream: &str) -> Self {
        self.depends(upstream, Dependency::Collect)
    }

    /// Retry a failed attempt this many times.
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Input used when no upstream data reaches this task.
    pub fn with_input(mut self, input: Value) -> Self {
        self.input = Some(input);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn upstream(&self) -> &[Edge] {
        &self.upstream
    }
}

impl std::fmt::Debug for TaskSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskSpec")
            .field("id", &self.id)
            .field("upstream", &self.upstream)
            .field("retries", &self.retries)
            .finish_non_exhaustive()
    }
}
