// src/lib.rs

//! Courtside: a small DAG scheduler with a daily box-score scraping pipeline.

pub mod dag;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod scheduler;
pub mod services;
pub mod storage;
pub mod utils;
