// src/dag/runner.rs

//! Executes one run of a [`Dag`] for a given logical date.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde_json::{Map, Value};

use super::{Dag, Dependency, Node};
use crate::error::{AppError, Result};
use crate::models::{EngineConfig, RunContext};
use crate::utils::log;

/// Limits and defaults applied to a run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Maximum task instances executing at once
    pub max_active_tasks: usize,
    /// Retries for tasks that don't set their own
    pub default_retries: u32,
    /// Delay between attempts for tasks that don't set their own
    pub retry_delay: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for RunOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_active_tasks: config.max_active_tasks.max(1),
            default_retries: config.default_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }
}

/// Final state of one task instance.
#[derive(Debug, Clone, PartialEq)]
pub enum InstanceState {
    Success(Value),
    Failed(String),
    UpstreamFailed,
}

impl InstanceState {
    pub fn is_success(&self) -> bool {
        matches!(self, InstanceState::Success(_))
    }

    pub fn output(&self) -> Option<&Value> {
        match self {
            InstanceState::Success(value) => Some(value),
            _ => None,
        }
    }
}

/// Outcome of every instance of one task.
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub task_id: String,
    pub mapped: bool,
    pub instances: Vec<InstanceState>,
    /// Why a mapped task never got instances (failed or unusable expansion)
    pub blocked: Option<InstanceState>,
}

/// Outcome of a whole run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub context: RunContext,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Topological order
    pub tasks: Vec<TaskReport>,
}

impl RunReport {
    pub fn task(&self, task_id: &str) -> Option<&TaskReport> {
        self.tasks.iter().find(|t| t.task_id == task_id)
    }

    /// Number of instances the task ran as (0 for an empty expansion).
    pub fn instance_count(&self, task_id: &str) -> usize {
        self.task(task_id).map_or(0, |t| t.instances.len())
    }

    /// Output of a successful unmapped task.
    pub fn output(&self, task_id: &str) -> Option<&Value> {
        self.task(task_id)
            .filter(|t| !t.mapped)
            .and_then(|t| t.instances.first())
            .and_then(InstanceState::output)
    }

    /// Labels and messages of instances that did not succeed.
    pub fn failures(&self) -> Vec<(String, String)> {
        self.tasks
            .iter()
            .flat_map(|t| {
                let blocked = t
                    .blocked
                    .as_ref()
                    .and_then(failure_message)
                    .map(|msg| (t.task_id.clone(), msg));
                let instances = t.instances.iter().enumerate().filter_map(move |(i, state)| {
                    failure_message(state).map(|msg| (instance_label(&t.task_id, t.mapped, i), msg))
                });
                blocked.into_iter().chain(instances)
            })
            .collect()
    }

    pub fn succeeded(&self) -> bool {
        self.tasks.iter().all(|t| {
            t.blocked.is_none() && t.instances.iter().all(InstanceState::is_success)
        })
    }

    /// Turn a report with failures into an error.
    pub fn into_result(self) -> Result<Self> {
        if self.succeeded() {
            return Ok(self);
        }
        Err(AppError::RunFailed {
            dag_id: self.context.dag_id.clone(),
            logical_date: self.context.ds(),
            failed: self.failures().len(),
        })
    }
}

fn failure_message(state: &InstanceState) -> Option<String> {
    match state {
        InstanceState::Success(_) => None,
        InstanceState::Failed(msg) => Some(msg.clone()),
        InstanceState::UpstreamFailed => Some("upstream failed".into()),
    }
}

fn instance_label(task_id: &str, mapped: bool, index: usize) -> String {
    if mapped {
        format!("{}[{}]", task_id, index)
    } else {
        task_id.to_string()
    }
}

/// Planned execution of one instance.
enum Plan {
    Run(Value),
    Skip(InstanceState),
}

/// Run every task of `dag` once for `ctx`.
///
/// Failures never abort the run: the failed instance and everything
/// depending on it are recorded and unrelated instances keep going.
pub async fn run_dag(dag: &Dag, ctx: &RunContext, options: &RunOptions) -> RunReport {
    let started_at = Utc::now();
    log::header(&format!("{} | {} | {}", dag.id(), ctx.ds(), ctx.run_id));

    let mut states: Vec<Vec<InstanceState>> = vec![Vec::new(); dag.nodes.len()];
    let mut blocked: Vec<Option<InstanceState>> = vec![None; dag.nodes.len()];
    let total_layers = dag.layers.len();

    for (layer_no, layer) in dag.layers.iter().enumerate() {
        let mut work = Vec::new();
        for &idx in layer {
            let plans = match plan_instances(idx, &dag.nodes, &states, &blocked) {
                Ok(plans) => plans,
                Err(state) => {
                    ::log::warn!("{}: no instances scheduled", dag.nodes[idx].spec.id());
                    blocked[idx] = Some(state);
                    continue;
                }
            };

            states[idx] = plans
                .iter()
                .map(|plan| match plan {
                    Plan::Run(_) => InstanceState::UpstreamFailed,
                    Plan::Skip(state) => state.clone(),
                })
                .collect();

            for (i, plan) in plans.into_iter().enumerate() {
                if let Plan::Run(input) = plan {
                    work.push((idx, i, input));
                }
            }
        }

        let names: Vec<&str> = layer.iter().map(|&i| dag.nodes[i].spec.id()).collect();
        log::step(
            layer_no + 1,
            total_layers,
            &format!("{} ({} instance(s))", names.join(", "), work.len()),
        );

        let results: Vec<(usize, usize, InstanceState)> = stream::iter(work)
            .map(|(idx, i, input)| {
                let node = &dag.nodes[idx];
                async move { (idx, i, run_instance(node, i, ctx, input, options).await) }
            })
            .buffer_unordered(options.max_active_tasks.max(1))
            .collect()
            .await;

        for (idx, i, state) in results {
            states[idx][i] = state;
        }
    }

    let tasks: Vec<TaskReport> = dag
        .nodes
        .iter()
        .zip(states.into_iter().zip(blocked))
        .map(|(node, (instances, blocked))| TaskReport {
            task_id: node.spec.id().to_string(),
            mapped: node.is_mapped(),
            instances,
            blocked,
        })
        .collect();

    let report = RunReport {
        context: ctx.clone(),
        started_at,
        finished_at: Utc::now(),
        tasks,
    };

    let instances: usize = report.tasks.iter().map(|t| t.instances.len()).sum();
    let failures = report.failures();
    log::summary(
        &format!("{} {}", dag.id(), ctx.ds()),
        &[
            ("Tasks", report.tasks.len().to_string()),
            ("Instances", instances.to_string()),
            ("Not succeeded", failures.len().to_string()),
            (
                "Duration",
                format!(
                    "{} ms",
                    (report.finished_at - report.started_at).num_milliseconds()
                ),
            ),
        ],
    );
    for (label, message) in &failures {
        ::log::warn!("{}: {}", label, message);
    }

    report
}

/// Work out the instances of `node` and their inputs from upstream states.
///
/// `Err` means a mapped node gets no instances at all; the state is
/// recorded for the node as a whole.
fn plan_instances(
    idx: usize,
    nodes: &[Node],
    states: &[Vec<InstanceState>],
    blocked: &[Option<InstanceState>],
) -> std::result::Result<Vec<Plan>, InstanceState> {
    let node = &nodes[idx];
    let edges = || node.spec.upstream().iter().zip(&node.upstream_idx);

    let count = match node.map_root {
        None => 1,
        Some(root) if root != idx => {
            if blocked[root].is_some() {
                return Err(InstanceState::UpstreamFailed);
            }
            states[root].len()
        }
        Some(_) => {
            let Some((edge, &up)) = edges().find(|(e, _)| e.kind == Dependency::Expand) else {
                return Err(InstanceState::Failed("expansion source missing".into()));
            };
            match states[up].first() {
                Some(InstanceState::Success(Value::Array(items))) => items.len(),
                Some(InstanceState::Success(other)) => {
                    return Err(InstanceState::Failed(format!(
                        "cannot expand over non-array output of '{}': {}",
                        edge.upstream,
                        type_name(other)
                    )));
                }
                _ => return Err(InstanceState::UpstreamFailed),
            }
        }
    };

    let plans = (0..count)
        .map(|i| {
            let mut inputs: Vec<(&str, Value)> = Vec::new();
            for (edge, &up) in edges() {
                let upstream = &nodes[up];
                let upstream_states = &states[up];
                let value = match edge.kind {
                    Dependency::Collect => {
                        if blocked[up].is_some()
                            || !upstream_states.iter().all(InstanceState::is_success)
                        {
                            return Plan::Skip(InstanceState::UpstreamFailed);
                        }
                        Value::Array(
                            upstream_states
                                .iter()
                                .filter_map(|s| s.output().cloned())
                                .collect(),
                        )
                    }
                    Dependency::Expand => match upstream_states.first().and_then(InstanceState::output) {
                        Some(Value::Array(items)) => items[i].clone(),
                        _ => return Plan::Skip(InstanceState::UpstreamFailed),
                    },
                    Dependency::Data | Dependency::Order => {
                        let state = if upstream.is_mapped() {
                            upstream_states.get(i)
                        } else {
                            upstream_states.first()
                        };
                        match state.and_then(InstanceState::output) {
                            Some(value) => value.clone(),
                            None => return Plan::Skip(InstanceState::UpstreamFailed),
                        }
                    }
                };
                if edge.kind.carries_data() {
                    inputs.push((edge.upstream.as_str(), value));
                }
            }
            Plan::Run(assemble_input(node, inputs))
        })
        .collect();

    Ok(plans)
}

fn assemble_input(node: &Node, mut inputs: Vec<(&str, Value)>) -> Value {
    match inputs.len() {
        0 => node.spec.input.clone().unwrap_or(Value::Null),
        1 => inputs.pop().map(|(_, v)| v).unwrap_or(Value::Null),
        _ => Value::Object(
            inputs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect::<Map<String, Value>>(),
        ),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

async fn run_instance(
    node: &Node,
    index: usize,
    ctx: &RunContext,
    input: Value,
    options: &RunOptions,
) -> InstanceState {
    let label = instance_label(node.spec.id(), node.is_mapped(), index);
    let retries = node.spec.retries.unwrap_or(options.default_retries);
    let delay = node.spec.retry_delay.unwrap_or(options.retry_delay);

    let mut attempt = 0;
    loop {
        attempt += 1;
        ::log::debug!("{}: attempt {}/{}", label, attempt, retries + 1);

        match node.spec.task.run(ctx, input.clone()).await {
            Ok(output) => {
                ::log::info!("{}: success", label);
                return InstanceState::Success(output);
            }
            Err(e) if attempt <= retries => {
                ::log::warn!(
                    "{}: attempt {} failed: {}. Retrying in {:?}",
                    label,
                    attempt,
                    e,
                    delay
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            Err(e) => {
                ::log::error!("{}: failed: {}", label, e);
                return InstanceState::Failed(e.to_string());
            }
        }
    }
}
