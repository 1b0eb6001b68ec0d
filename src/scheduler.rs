// src/scheduler.rs

//! Turns a DAG's schedule into runs.
//!
//! Each due logical date gets its own [`RunContext`]. Runs of the same DAG
//! execute concurrently up to the schedule's `max_active_runs`.

use chrono::{NaiveDate, NaiveDateTime};
use futures::stream::{self, StreamExt};

use crate::dag::{Dag, RunOptions, RunReport, run_dag};
use crate::error::{AppError, Result};
use crate::models::RunContext;

/// Logical dates of the runs due by `now`.
pub fn due_dates(dag: &Dag, now: NaiveDateTime) -> Result<Vec<NaiveDate>> {
    let schedule = dag
        .schedule()
        .ok_or_else(|| AppError::config(format!("DAG '{}' has no schedule", dag.id())))?;

    Ok(schedule
        .due_runs(now)
        .into_iter()
        .map(|at| at.date())
        .collect())
}

/// Execute every run due by `now`. Reports come back in logical-date order.
pub async fn run_due(dag: &Dag, now: NaiveDateTime, options: &RunOptions) -> Result<Vec<RunReport>> {
    let dates = due_dates(dag, now)?;
    let max_active_runs = dag.schedule().map_or(1, |s| s.max_active_runs).max(1);

    log::info!(
        "{}: {} run(s) due by {}, up to {} at once",
        dag.id(),
        dates.len(),
        now,
        max_active_runs
    );

    let reports: Vec<RunReport> = stream::iter(dates)
        .map(|date| async move {
            let ctx = RunContext::new(dag.id(), date);
            run_dag(dag, &ctx, options).await
        })
        .buffered(max_active_runs)
        .collect()
        .await;

    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::linear;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_due_dates_without_catchup() {
        let dag = linear::build_dag().unwrap();
        // Mondays: 2023-01-02, 09, 16; the 16th's interval closes on the 23rd.
        assert_eq!(
            due_dates(&dag, at(2023, 1, 17)).unwrap(),
            vec![NaiveDate::from_ymd_opt(2023, 1, 9).unwrap()]
        );
    }

    #[tokio::test]
    async fn test_run_due_in_date_order() {
        let dag = linear::build_dag().unwrap();
        let schedule = dag.schedule().cloned().unwrap().with_catchup(true).with_max_active_runs(3);
        let dag = dag.with_schedule(schedule);

        let reports = run_due(&dag, at(2023, 1, 24), &RunOptions::default()).await.unwrap();
        let dates: Vec<String> = reports.iter().map(|r| r.context.ds()).collect();
        assert_eq!(dates, vec!["2023-01-02", "2023-01-09", "2023-01-16"]);
        assert!(reports.iter().all(RunReport::succeeded));
    }

    #[test]
    fn test_unscheduled_dag() {
        let dag = crate::dag::DagBuilder::new("adhoc").build().unwrap();
        assert!(due_dates(&dag, at(2023, 1, 1)).is_err());
    }
}
