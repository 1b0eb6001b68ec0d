//! Pipeline definitions and entry points.
//!
//! - `linear`: four-stage passthrough DAG
//! - `games`: daily discovery and fan-out DAG writing one CSV per game

pub mod games;
pub mod linear;

use std::sync::Arc;

use chrono::NaiveDate;

use crate::dag::{Dag, RunOptions, RunReport, run_dag};
use crate::error::{AppError, Result};
use crate::models::{Config, RunContext};
use crate::services::NbaClient;
use crate::storage::LocalStorage;

/// Build every registered DAG from the configuration.
pub fn all_dags(config: &Config) -> Result<Vec<Dag>> {
    let source = Arc::new(NbaClient::new(&config.scraper)?);
    let storage = Arc::new(LocalStorage::new(config.output_base_dir()));

    Ok(vec![linear::build_dag()?, games::build_dag(source, storage)?])
}

/// Find a DAG by id.
pub fn find_dag<'a>(dags: &'a [Dag], dag_id: &str) -> Result<&'a Dag> {
    dags.iter().find(|d| d.id() == dag_id).ok_or_else(|| {
        let known: Vec<&str> = dags.iter().map(Dag::id).collect();
        AppError::config(format!("unknown DAG '{}' (known: {})", dag_id, known.join(", ")))
    })
}

/// Trigger a single run for a logical date.
pub async fn run_once(dag: &Dag, logical_date: NaiveDate, options: &RunOptions) -> Result<RunReport> {
    let ctx = RunContext::manual(dag.id(), logical_date);
    run_dag(dag, &ctx, options).await.into_result()
}
