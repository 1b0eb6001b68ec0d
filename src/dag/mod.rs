//! Task graphs.
//!
//! A [`Dag`] is a validated set of [`TaskSpec`]s. Tasks are grouped into
//! layers: every task sits one layer below its deepest upstream, so all
//! tasks of a layer can run concurrently once the previous layers are done.
//!
//! A task is *mapped* when it runs as several instances:
//! - `Expand` from an unmapped task creates one instance per array element;
//! - `Data`/`Order` from a mapped task makes the downstream task mapped too,
//!   instance `i` consuming instance `i`;
//! - `Collect` from a mapped task joins it back into a single instance.

pub mod runner;
mod task;

use std::collections::{HashMap, HashSet};

pub use runner::{InstanceState, RunOptions, RunReport, TaskReport, run_dag};
pub use task::{Dependency, Edge, FnTask, Task, TaskSpec, fn_task};

use crate::error::{AppError, Result};
use crate::models::Schedule;

/// A validated node of the graph.
#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) spec: TaskSpec,
    /// Indices of upstream nodes, parallel to `spec.upstream`
    pub(crate) upstream_idx: Vec<usize>,
    /// The node whose `Expand` edge drives this node's instance count
    pub(crate) map_root: Option<usize>,
}

impl Node {
    pub(crate) fn is_mapped(&self) -> bool {
        self.map_root.is_some()
    }
}

/// A validated, immutable task graph.
#[derive(Debug, Clone)]
pub struct Dag {
    id: String,
    description: String,
    schedule: Option<Schedule>,
    /// Topological order
    pub(crate) nodes: Vec<Node>,
    pub(crate) layers: Vec<Vec<usize>>,
}

impl Dag {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn schedule(&self) -> Option<&Schedule> {
        self.schedule.as_ref()
    }

    /// Replace the schedule, keeping the validated graph.
    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = Some(schedule);
        self
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Task ids in topological order.
    pub fn task_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.spec.id())
    }

    /// Look up a task by id.
    pub fn task(&self, id: &str) -> Option<&TaskSpec> {
        self.nodes.iter().map(|n| &n.spec).find(|s| s.id() == id)
    }

    /// Whether the task runs as a variable number of instances.
    pub fn is_mapped(&self, id: &str) -> bool {
        self.nodes
            .iter()
            .any(|n| n.spec.id() == id && n.is_mapped())
    }

    /// Task ids grouped by execution layer.
    pub fn layers(&self) -> Vec<Vec<&str>> {
        self.layers
            .iter()
            .map(|layer| layer.iter().map(|&i| self.nodes[i].spec.id()).collect())
            .collect()
    }
}

/// Collects task specs and validates them into a [`Dag`].
#[derive(Debug)]
pub struct DagBuilder {
    id: String,
    description: String,
    schedule: Option<Schedule>,
    tasks: Vec<TaskSpec>,
}

impl DagBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            schedule: None,
            tasks: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = Some(schedule);
        self
    }

    pub fn task(mut self, spec: TaskSpec) -> Self {
        self.tasks.push(spec);
        self
    }

    /// Validate the graph and fix its execution order.
    pub fn build(self) -> Result<Dag> {
        let dag_id = self.id;
        if dag_id.trim().is_empty() {
            return Err(AppError::dag("DAG id is empty"));
        }

        let mut position: HashMap<&str, usize> = HashMap::new();
        for (i, spec) in self.tasks.iter().enumerate() {
            if spec.id().trim().is_empty() {
                return Err(AppError::dag(format!("{}: task id is empty", dag_id)));
            }
            if position.insert(spec.id(), i).is_some() {
                return Err(AppError::dag(format!(
                    "{}: duplicate task '{}'",
                    dag_id,
                    spec.id()
                )));
            }
        }

        let mut upstream_pos: Vec<Vec<usize>> = Vec::with_capacity(self.tasks.len());
        for spec in &self.tasks {
            let mut seen = HashSet::new();
            let mut resolved = Vec::with_capacity(spec.upstream().len());
            for edge in spec.upstream() {
                let &up = position.get(edge.upstream.as_str()).ok_or_else(|| {
                    AppError::dag(format!(
                        "{}: task '{}' depends on unknown task '{}'",
                        dag_id,
                        spec.id(),
                        edge.upstream
                    ))
                })?;
                if edge.upstream == spec.id() {
                    return Err(AppError::dag(format!(
                        "{}: task '{}' depends on itself",
                        dag_id,
                        spec.id()
                    )));
                }
                if !seen.insert(up) {
                    return Err(AppError::dag(format!(
                        "{}: task '{}' lists '{}' twice",
                        dag_id,
                        spec.id(),
                        edge.upstream
                    )));
                }
                resolved.push(up);
            }
            upstream_pos.push(resolved);
        }

        let order = topological_order(&dag_id, &self.tasks, &upstream_pos)?;

        // Re-index everything by topological position.
        let mut new_index = vec![0; order.len()];
        for (new, &old) in order.iter().enumerate() {
            new_index[old] = new;
        }

        let mut tasks: Vec<Option<TaskSpec>> = self.tasks.into_iter().map(Some).collect();
        let mut nodes: Vec<Node> = Vec::with_capacity(order.len());
        let mut depth: Vec<usize> = Vec::with_capacity(order.len());

        for &old in &order {
            let spec = tasks[old]
                .take()
                .ok_or_else(|| AppError::dag(format!("{}: task visited twice", dag_id)))?;
            let upstream_idx: Vec<usize> = upstream_pos[old].iter().map(|&u| new_index[u]).collect();
            let map_root = resolve_mapping(&dag_id, &spec, &upstream_idx, &nodes)?;

            depth.push(
                upstream_idx
                    .iter()
                    .map(|&u| depth[u] + 1)
                    .max()
                    .unwrap_or(0),
            );
            nodes.push(Node {
                spec,
                upstream_idx,
                map_root,
            });
        }

        let layer_count = depth.iter().max().map_or(0, |d| d + 1);
        let mut layers = vec![Vec::new(); layer_count];
        for (i, d) in depth.into_iter().enumerate() {
            layers[d].push(i);
        }

        log::debug!(
            "Built DAG '{}' with {} tasks in {} layers",
            dag_id,
            nodes.len(),
            layers.len()
        );

        Ok(Dag {
            id: dag_id,
            description: self.description,
            schedule: self.schedule,
            nodes,
            layers,
        })
    }
}

/// Kahn's algorithm, ties broken by declaration order.
fn topological_order(dag_id: &str, tasks: &[TaskSpec], upstream: &[Vec<usize>]) -> Result<Vec<usize>> {
    let mut pending: Vec<usize> = upstream.iter().map(Vec::len).collect();
    let mut downstream: Vec<Vec<usize>> = vec![Vec::new(); tasks.len()];
    for (i, ups) in upstream.iter().enumerate() {
        for &u in ups {
            downstream[u].push(i);
        }
    }

    let mut order = Vec::with_capacity(tasks.len());
    let mut done = vec![false; tasks.len()];
    while order.len() < tasks.len() {
        let Some(next) = (0..tasks.len()).find(|&i| !done[i] && pending[i] == 0) else {
            let stuck: Vec<&str> = (0..tasks.len())
                .filter(|&i| !done[i])
                .map(|i| tasks[i].id())
                .collect();
            return Err(AppError::dag(format!(
                "{}: cycle between tasks {:?}",
                dag_id, stuck
            )));
        };
        done[next] = true;
        order.push(next);
        for &d in &downstream[next] {
            pending[d] -= 1;
        }
    }
    Ok(order)
}

/// Decide whether a node is mapped, and from which expansion.
fn resolve_mapping(
    dag_id: &str,
    spec: &TaskSpec,
    upstream_idx: &[usize],
    nodes: &[Node],
) -> Result<Option<usize>> {
    let fail = |message: String| Err(AppError::dag(format!("{}: task '{}' {}", dag_id, spec.id(), message)));

    let mut expanded = false;
    let mut inherited: Option<usize> = None;

    for (edge, &up) in spec.upstream().iter().zip(upstream_idx) {
        let upstream = &nodes[up];
        match edge.kind {
            Dependency::Expand => {
                if expanded {
                    return fail("has more than one expand dependency".into());
                }
                if upstream.is_mapped() {
                    return fail(format!(
                        "expands over mapped task '{}'; nested fan-out is not supported",
                        edge.upstream
                    ));
                }
                expanded = true;
            }
            Dependency::Collect => {
                if !upstream.is_mapped() {
                    return fail(format!("collects from unmapped task '{}'", edge.upstream));
                }
            }
            Dependency::Data | Dependency::Order => {
                if let Some(root) = upstream.map_root {
                    match inherited {
                        Some(existing) if existing != root => {
                            return fail("consumes mapped tasks from different expansions".into());
                        }
                        _ => inherited = Some(root),
                    }
                }
            }
        }
    }

    match (expanded, inherited) {
        (true, Some(_)) => fail("both expands and consumes a mapped task".into()),
        // The node itself is the expansion root; its index is assigned by the caller.
        (true, None) => Ok(Some(nodes.len())),
        (false, inherited) => Ok(inherited),
    }
}
