//! Courtside CLI
//!
//! Local entry point: inspect DAGs, trigger single runs and backfills.

use std::path::PathBuf;

use chrono::{Local, NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};
use courtside::{
    dag::{Dag, RunOptions, RunReport},
    error::{AppError, Result},
    models::Config,
    pipeline, scheduler,
    utils::{date, log as runlog},
};

/// Courtside - scheduled box score scraping
#[derive(Parser, Debug)]
#[command(name = "courtside", version, about = "DAG runner for daily box score scraping")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "data/config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List registered DAGs with their schedules and tasks
    List,

    /// Validate configuration and every DAG definition
    Validate,

    /// Run a DAG once for a logical date
    Run {
        dag_id: String,

        /// Logical date (YYYY-MM-DD)
        #[arg(long)]
        date: String,
    },

    /// Execute every run due up to a day, following the DAG's catch-up rules
    Backfill {
        dag_id: String,

        /// Last day considered (YYYY-MM-DD, default: now)
        #[arg(long)]
        until: Option<String>,
    },

    /// Print the logical dates that are due without running them
    Schedule {
        dag_id: String,

        /// Last day considered (YYYY-MM-DD, default: now)
        #[arg(long)]
        until: Option<String>,
    },
}

/// Initialize logging from the verbosity flag, falling back to the configured level.
fn init_logging(verbose: bool, configured: &str) {
    let level = if verbose { "debug" } else { configured };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// End of the given day, or the current local time.
fn reference_time(until: Option<&str>) -> Result<NaiveDateTime> {
    match until {
        Some(day) => date::parse_date(day)?
            .and_hms_opt(23, 59, 59)
            .ok_or_else(|| AppError::validation(format!("invalid --until '{}'", day))),
        None => Ok(Local::now().naive_local()),
    }
}

/// Fail when any report has failed instances.
fn check_reports(reports: Vec<RunReport>) -> Result<()> {
    let failed = reports.iter().filter(|r| !r.succeeded()).count();
    if failed > 0 {
        log::error!("{} of {} run(s) had failures", failed, reports.len());
    }
    for report in reports {
        report.into_result()?;
    }
    Ok(())
}

fn describe(dag: &Dag) {
    log::info!("{}: {}", dag.id(), dag.description());
    match dag.schedule() {
        Some(schedule) => runlog::sub_item(&format!("schedule: {}", schedule)),
        None => runlog::sub_item("schedule: none"),
    }
    for (i, layer) in dag.layers().iter().enumerate() {
        let tasks: Vec<String> = layer
            .iter()
            .map(|id| {
                if dag.is_mapped(id) {
                    format!("{}[]", id)
                } else {
                    id.to_string()
                }
            })
            .collect();
        runlog::sub_item(&format!("layer {}: {}", i, tasks.join(", ")));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Read before logging is up; a failed load is reported once it is.
    let loaded = Config::load(&cli.config);
    let level = loaded
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());
    init_logging(cli.verbose, &level);

    let mut config = match loaded {
        Ok(config) => config,
        Err(e) => {
            log::warn!("Config load failed from {:?}: {}. Using defaults.", cli.config, e);
            Config::default()
        }
    };
    config.apply_env();
    config.validate()?;

    let dags = pipeline::all_dags(&config)?;
    let options = RunOptions::from(&config.engine);

    match cli.command {
        Command::List => {
            for dag in &dags {
                describe(dag);
            }
        }

        Command::Validate => {
            log::info!("✓ Config OK (output: {})", config.output_base_dir().display());
            log::info!("✓ {} DAG(s) built", dags.len());
            log::info!("All validations passed!");
        }

        Command::Run { dag_id, date: day } => {
            let dag = pipeline::find_dag(&dags, &dag_id)?;
            let logical_date: NaiveDate = date::parse_date(&day)?;
            let report = pipeline::run_once(dag, logical_date, &options).await?;
            log::info!(
                "{} finished in {} ms",
                report.context.run_id,
                (report.finished_at - report.started_at).num_milliseconds()
            );
        }

        Command::Backfill { dag_id, until } => {
            let dag = pipeline::find_dag(&dags, &dag_id)?;
            let now = reference_time(until.as_deref())?;
            let reports = scheduler::run_due(dag, now, &options).await?;
            if reports.is_empty() {
                log::info!("Nothing due for {} by {}", dag.id(), now);
            }
            check_reports(reports)?;
        }

        Command::Schedule { dag_id, until } => {
            let dag = pipeline::find_dag(&dags, &dag_id)?;
            let now = reference_time(until.as_deref())?;
            let due = scheduler::due_dates(dag, now)?;
            log::info!("{} run(s) due for {} by {}", due.len(), dag.id(), now);
            for day in due {
                runlog::sub_item(&day.format(date::DATE_FORMAT).to_string());
            }
        }
    }

    Ok(())
}
