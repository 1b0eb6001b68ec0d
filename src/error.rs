// src/error.rs

//! Unified error handling for the pipelines and the task runner.

use std::fmt;

use thiserror::Error;

/// Result type alias for courtside operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSV writing failed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Date parsing failed
    #[error("Date parse error: {0}")]
    Date(#[from] chrono::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Expected content missing from a fetched page
    #[error("Extraction error for {context}: {message}")]
    Extract { context: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Task graph definition error
    #[error("DAG error: {0}")]
    Dag(String),

    /// A task instance failed
    #[error("Task '{task}' failed: {message}")]
    Task { task: String, message: String },

    /// A DAG run finished with failed task instances
    #[error("Run of '{dag_id}' for {logical_date} failed: {failed} task instance(s) did not succeed")]
    RunFailed {
        dag_id: String,
        logical_date: String,
        failed: usize,
    },
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create an extraction error with context.
    pub fn extract(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Extract {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a DAG definition error.
    pub fn dag(message: impl Into<String>) -> Self {
        Self::Dag(message.into())
    }

    /// Create a task failure error.
    pub fn task(task: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Task {
            task: task.into(),
            message: message.to_string(),
        }
    }
}
