// src/pipeline/linear.rs

//! Four-stage passthrough pipeline: download → extract → split → cleanup.
//!
//! Every stage returns its input unchanged; the DAG only exercises
//! sequential data dependencies.

use chrono::NaiveDate;
use serde_json::{Value, json};

use crate::dag::{Dag, DagBuilder, TaskSpec, fn_task};
use crate::error::{AppError, Result};
use crate::models::Schedule;

pub const DAG_ID: &str = "dag_exemplo_1";

/// Stage names in execution order.
pub const STAGES: [&str; 4] = ["download", "extract", "split", "cleanup"];

/// Weekly, Mondays at 11:30, no catch-up.
pub fn schedule() -> Result<Schedule> {
    let start = NaiveDate::from_ymd_opt(2023, 1, 1)
        .ok_or_else(|| AppError::config("invalid start date"))?;
    Schedule::new("30 11 * * 1", start)
}

fn passthrough(stage: &'static str) -> TaskSpec {
    TaskSpec::new(
        stage,
        fn_task(move |_ctx, doc: Value| async move {
            log::debug!("{}: passing document through", stage);
            Ok(doc)
        }),
    )
}

/// Build the linear DAG. The first stage starts from an empty document.
pub fn build_dag() -> Result<Dag> {
    let mut builder = DagBuilder::new(DAG_ID)
        .description("Linear no-op pipeline")
        .schedule(schedule()?);

    let mut previous: Option<&str> = None;
    for stage in STAGES {
        let spec = match previous {
            None => passthrough(stage).with_input(json!({})),
            Some(upstream) => passthrough(stage).data_from(upstream),
        };
        builder = builder.task(spec);
        previous = Some(stage);
    }

    builder.build()
}
