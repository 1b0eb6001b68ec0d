// src/pipeline/games.rs

//! Daily box-score pipeline.
//!
//! ```text
//! create_output_location → discover_events → process_event.fetch (×N)
//!                                          → process_event.persist (×N) → finalize
//! ```
//!
//! `N` is the number of games found on the listing page for the day before
//! the logical date, known only once discovery has run.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dag::{Dag, DagBuilder, TaskSpec, fn_task};
use crate::error::{AppError, Result};
use crate::models::{Game, RunContext, Schedule};
use crate::services::GameSource;
use crate::storage::BoxScoreStorage;

pub const DAG_ID: &str = "dag_nba";

pub const CREATE_OUTPUT_LOCATION: &str = "create_output_location";
pub const DISCOVER_EVENTS: &str = "discover_events";
pub const FETCH_EVENT: &str = "process_event.fetch";
pub const PERSIST_EVENT: &str = "process_event.persist";
pub const FINALIZE: &str = "finalize";

/// Daily at 10:00, catching up from 2023-03-10, at most 5 runs at once.
pub fn schedule() -> Result<Schedule> {
    let start = NaiveDate::from_ymd_opt(2023, 3, 10)
        .ok_or_else(|| AppError::config("invalid start date"))?;
    Ok(Schedule::new("00 10 * * *", start)?
        .with_catchup(true)
        .with_max_active_runs(5))
}

/// What the persist step reports for one game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedGame {
    pub file: PathBuf,
    pub rows: usize,
}

/// Ensure the folder for the day before the logical date exists.
pub async fn create_output_location(
    storage: &dyn BoxScoreStorage,
    ctx: &RunContext,
) -> Result<PathBuf> {
    let day = ctx.yesterday()?;
    log::info!("Logical date {} -> folder {}", ctx.ds(), day);
    storage.ensure_day(&day).await
}

/// References of the games played the day before the logical date.
pub async fn discover_events(source: &dyn GameSource, ctx: &RunContext) -> Result<Vec<String>> {
    source.list_games(&ctx.yesterday()?).await
}

/// Fetch one game and descend to its record.
pub async fn fetch_event(source: &dyn GameSource, reference: &str) -> Result<Game> {
    let game = source.fetch_game(reference).await?;
    log::info!(
        "{}: {} vs {}",
        reference,
        game.home_team.display_name(),
        game.away_team.display_name()
    );
    Ok(game)
}

/// Flatten both teams and write them as one file named after the teams.
pub async fn persist_event(
    storage: &dyn BoxScoreStorage,
    ctx: &RunContext,
    game: &Game,
) -> Result<PersistedGame> {
    let records = game.player_records();
    let summary = storage
        .write_box_score(&ctx.yesterday()?, &game.file_name(), &records)
        .await?;

    Ok(PersistedGame {
        file: summary.location,
        rows: summary.rows,
    })
}

/// Join point after every game has been processed.
pub fn finalize(persisted: &[PersistedGame]) {
    let rows: usize = persisted.iter().map(|p| p.rows).sum();
    log::info!("Done: {} game file(s), {} player rows", persisted.len(), rows);
}

// Task adapters: JSON in, JSON out.

async fn create_task(storage: Arc<dyn BoxScoreStorage>, ctx: RunContext) -> Result<Value> {
    let dir = create_output_location(storage.as_ref(), &ctx).await?;
    Ok(Value::String(dir.display().to_string()))
}

async fn discover_task(source: Arc<dyn GameSource>, ctx: RunContext) -> Result<Value> {
    let references = discover_events(source.as_ref(), &ctx).await?;
    Ok(serde_json::to_value(references)?)
}

async fn fetch_task(source: Arc<dyn GameSource>, input: Value) -> Result<Value> {
    let reference = input.as_str().ok_or_else(|| {
        AppError::task(FETCH_EVENT, format!("expected a game reference, got {}", input))
    })?;
    let game = fetch_event(source.as_ref(), reference).await?;
    Ok(serde_json::to_value(game)?)
}

async fn persist_task(
    storage: Arc<dyn BoxScoreStorage>,
    ctx: RunContext,
    input: Value,
) -> Result<Value> {
    let game: Game = serde_json::from_value(input)?;
    let persisted = persist_event(storage.as_ref(), &ctx, &game).await?;
    Ok(serde_json::to_value(persisted)?)
}

async fn finalize_task(input: Value) -> Result<Value> {
    let persisted: Vec<PersistedGame> = serde_json::from_value(input)?;
    finalize(&persisted);
    Ok(Value::Null)
}

/// Build the daily DAG on top of a game source and a storage backend.
pub fn build_dag(source: Arc<dyn GameSource>, storage: Arc<dyn BoxScoreStorage>) -> Result<Dag> {
    let create = {
        let storage = Arc::clone(&storage);
        fn_task(move |ctx, _input| create_task(Arc::clone(&storage), ctx))
    };
    let discover = {
        let source = Arc::clone(&source);
        fn_task(move |ctx, _input| discover_task(Arc::clone(&source), ctx))
    };
    let fetch = fn_task(move |_ctx, input| fetch_task(Arc::clone(&source), input));
    let persist = fn_task(move |ctx, input| persist_task(Arc::clone(&storage), ctx, input));
    let join = fn_task(|_ctx, input| finalize_task(input));

    DagBuilder::new(DAG_ID)
        .description("Daily box scores of the previous day, one CSV per game")
        .schedule(schedule()?)
        .task(TaskSpec::new(CREATE_OUTPUT_LOCATION, create))
        .task(TaskSpec::new(DISCOVER_EVENTS, discover).after(CREATE_OUTPUT_LOCATION))
        .task(TaskSpec::new(FETCH_EVENT, fetch).expand_from(DISCOVER_EVENTS))
        .task(TaskSpec::new(PERSIST_EVENT, persist).data_from(FETCH_EVENT))
        .task(TaskSpec::new(FINALIZE, join).collect_from(PERSIST_EVENT))
        .build()
}
