use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tg_cli::commands::{categories, import, ingest, recompute, report, status, usage};
use tg_cli::{CategoriesAction, Cli, Commands, Config};
use tg_core::SubjectId;
use tg_db::{CategoryUpdate, UsageFilter};

/// Load config and open database, ensuring the parent directory exists.
fn open_database(config_path: Option<&Path>) -> Result<(tg_db::Database, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");
    config.validate()?;

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let db = tg_db::Database::open(&config.database_path).context("failed to open database")?;
    Ok((db, config))
}

#[expect(
    clippy::too_many_lines,
    reason = "CLI command dispatch is inherently verbose"
)]
fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Logs go to stderr so stdout stays parseable.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let mut stdout = io::stdout().lock();

    match &cli.command {
        Some(Commands::Status) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            status::run(&mut stdout, &db, &config)?;
        }
        Some(Commands::Import {
            subject,
            accumulate,
        }) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            let outcome = import::run(
                io::stdin().lock(),
                &db,
                &config,
                subject.as_deref(),
                *accumulate,
            )?;
            eprintln!(
                "Imported {} new observations ({} duplicates, {} malformed lines skipped)",
                outcome.inserted(),
                outcome.duplicates,
                outcome.malformed
            );
            for (subject, summary) in &outcome.accumulated {
                eprintln!(
                    "Accumulated {} buckets for {subject} from {} observations",
                    summary.buckets, summary.observations
                );
            }
        }
        Some(Commands::Recompute {
            subject,
            hours_back,
            start,
            end,
        }) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            let args = recompute::WindowArgs {
                subject: subject.clone(),
                hours_back: *hours_back,
                start: start.clone(),
                end: end.clone(),
            };
            let report = recompute::run(&mut stdout, &db, &config, &args)?;
            if !report.is_success() {
                anyhow::bail!(
                    "recomputation incomplete: {} of {} subjects did not complete",
                    report.failed() + report.cancelled(),
                    report.outcomes.len()
                );
            }
        }
        Some(Commands::Ingest {
            subject,
            app,
            window,
            hour,
            minutes,
            sessions,
        }) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            let args = ingest::UsageArgs {
                subject: subject.clone(),
                app: app.clone(),
                window: window.clone(),
                hour: hour.clone(),
                minutes: *minutes,
                sessions: *sessions,
            };
            let bucket = ingest::run(&db, &config, &args)?;
            tracing::debug!(
                hour = %bucket.hour_start,
                category_id = bucket.category_id,
                "usage ingested"
            );
        }
        Some(Commands::Categories(action)) => {
            let (db, _config) = open_database(cli.config.as_deref())?;
            match action {
                CategoriesAction::List {
                    productivity_type,
                    json,
                } => categories::list(&mut stdout, &db, *productivity_type, *json)?,
                CategoriesAction::Add {
                    name,
                    productivity_type,
                    description,
                } => {
                    let category =
                        categories::add(&db, name, *productivity_type, description.as_deref())?;
                    writeln!(stdout, "{}", category.id)?;
                }
                CategoriesAction::Update {
                    id,
                    name,
                    productivity_type,
                    description,
                } => {
                    let update = CategoryUpdate {
                        name: name.clone(),
                        productivity_type: *productivity_type,
                        description: description.clone(),
                    };
                    categories::update(&db, *id, &update)?;
                }
                CategoriesAction::Remove { id } => categories::remove(&db, *id)?,
            }
        }
        Some(Commands::Report {
            start,
            end,
            subject,
            json,
        }) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            report::run(
                &mut stdout,
                &db,
                &config,
                *start,
                *end,
                subject.as_deref(),
                *json,
            )?;
        }
        Some(Commands::Usage {
            subject,
            app,
            category,
            start,
            end,
            limit,
            offset,
            json,
        }) => {
            let (db, _config) = open_database(cli.config.as_deref())?;
            let filter = UsageFilter {
                subject_id: subject.as_deref().map(SubjectId::new).transpose()?,
                app_name: app.clone(),
                category_id: *category,
                start_date: *start,
                end_date: *end,
                limit: Some(*limit),
                offset: *offset,
            };
            usage::run(&mut stdout, &db, &filter, *json)?;
        }
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            writeln!(stdout)?;
        }
    }

    Ok(())
}
