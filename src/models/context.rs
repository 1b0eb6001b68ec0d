//! Per-run context handed to every task instance.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::utils::date::{DATE_FORMAT, previous_day};

/// Values shared by all task instances of one DAG run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    /// DAG being executed
    pub dag_id: String,

    /// Logical date of the run
    pub logical_date: NaiveDate,

    /// Unique identifier of this run
    pub run_id: String,
}

impl RunContext {
    /// Create a context for a scheduled run.
    pub fn new(dag_id: impl Into<String>, logical_date: NaiveDate) -> Self {
        let dag_id = dag_id.into();
        let run_id = format!("scheduled__{}", logical_date.format(DATE_FORMAT));
        Self {
            dag_id,
            logical_date,
            run_id,
        }
    }

    /// Create a context for a manually triggered run.
    pub fn manual(dag_id: impl Into<String>, logical_date: NaiveDate) -> Self {
        Self {
            run_id: format!("manual__{}", logical_date.format(DATE_FORMAT)),
            ..Self::new(dag_id, logical_date)
        }
    }

    /// Logical date as `YYYY-MM-DD`.
    pub fn ds(&self) -> String {
        self.logical_date.format(DATE_FORMAT).to_string()
    }

    /// Day before the logical date, as `YYYY-MM-DD`.
    pub fn yesterday(&self) -> Result<String> {
        Ok(previous_day(self.logical_date)?
            .format(DATE_FORMAT)
            .to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_dates() {
        let date = NaiveDate::from_ymd_opt(2023, 3, 1).unwrap();
        let ctx = RunContext::new("dag_nba", date);

        assert_eq!(ctx.ds(), "2023-03-01");
        assert_eq!(ctx.yesterday().unwrap(), "2023-02-28");
        assert_eq!(ctx.run_id, "scheduled__2023-03-01");
        assert_eq!(RunContext::manual("dag_nba", date).run_id, "manual__2023-03-01");
    }
}
