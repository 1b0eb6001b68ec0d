// src/models/mod.rs

//! Domain models for the pipelines.
//!
//! This module contains the data structures shared by the task runner,
//! the scraping services and storage.

mod config;
mod context;
mod game;
mod schedule;

// Re-export all public types
pub use config::{
    Config, EngineConfig, LoggingConfig, OUTPUT_DIR_ENV, PathsConfig, ScraperConfig,
};
pub use context::RunContext;
pub use game::{
    Game, Player, PlayerRecord, TEAM_COLUMN, TEAM_ID_COLUMN, Team, box_score_file_name,
};
pub use schedule::{CronExpr, Schedule};
