use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use progress_tracker::admin::{self, TableEraser};
use progress_tracker::config::{self, StorageBackend};
use progress_tracker::migration::{InMemoryScheduler, MigrationJob, MigrationScheduler, TickOutcome};
use progress_tracker::persistence::sqlite::Database;
use progress_tracker::persistence::Settings;

/// Operator CLI for the progress store.
#[derive(Parser)]
#[command(name = "progress-tracker", about = "Manage learner progress storage")]
struct Cli {
    /// Also write logs to a daily rolling file in this directory.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Database file (defaults to progress.db in the data directory).
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show storage settings and migration progress.
    Status,
    /// Select the backend that serves reads.
    Backend {
        #[arg(value_enum)]
        backend: BackendArg,
    },
    /// Mirror writes to both backends.
    Sync {
        #[arg(value_enum)]
        state: Toggle,
    },
    /// Migrate legacy records into the progress tables.
    Migrate {
        /// Convert and report without writing anything.
        #[arg(long)]
        dry_run: bool,
        /// Keep running batches until the legacy store is drained.
        #[arg(long, conflicts_with = "dry_run")]
        until_done: bool,
        /// Confirm the run.
        #[arg(long)]
        yes: bool,
    },
    /// List records that failed to migrate.
    MigrationErrors,
    /// Clear the migration cursor and error list.
    MigrationReset,
    /// Issue a single-use token for `erase`.
    EraseToken,
    /// Delete every row from the progress tables.
    Erase {
        #[arg(long)]
        token: String,
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    Comments,
    Tables,
}

impl From<BackendArg> for StorageBackend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Comments => StorageBackend::Comments,
            BackendArg::Tables => StorageBackend::Tables,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

fn init_tracing(log_dir: Option<&PathBuf>) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let Some(dir) = log_dir else {
        tracing_subscriber::registry().with(stderr).with(filter).init();
        return Ok(None);
    };

    std::fs::create_dir_all(dir).with_context(|| format!("creating log directory {}", dir.display()))?;
    let file_appender = tracing_appender::rolling::daily(dir, "progress-tracker");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(stderr)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_line_number(true),
        )
        .with(filter)
        .init();
    Ok(Some(guard))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_dir.as_ref())?;

    let db_path = cli.database.unwrap_or_else(config::get_database_path);
    tracing::debug!("Using database: {}", db_path.display());
    let db = Database::open(&db_path)
        .await
        .with_context(|| format!("opening {}", db_path.display()))?;
    let pool = db.pool().clone();
    let settings = Settings::new(pool.clone());
    let job = MigrationJob::new(pool.clone(), settings.clone());

    match cli.command {
        Commands::Status => {
            let storage = settings.storage_settings().await?;
            let status = job.status().await?;
            println!("backend:    {}", storage.backend);
            println!("sync:       {}", if storage.sync_enabled { "on" } else { "off" });
            println!("cursor:     {}", status.cursor);
            println!("remaining:  {}", status.remaining);
            println!("errors:     {}", status.errors);
        }
        Commands::Backend { backend } => {
            settings.set_storage_backend(backend.into()).await?;
            println!("backend set to {}", StorageBackend::from(backend));
        }
        Commands::Sync { state } => {
            let enabled = matches!(state, Toggle::On);
            settings.set_sync_enabled(enabled).await?;
            println!("sync {}", if enabled { "enabled" } else { "disabled" });
        }
        Commands::Migrate {
            dry_run,
            until_done,
            yes,
        } => {
            if dry_run {
                let report = job.run(true).await?;
                println!("{}", report.summary());
                for failure in &report.errors {
                    println!("  #{}: {}", failure.comment_id, failure.message);
                }
            } else if until_done {
                if !yes {
                    anyhow::bail!("refusing to migrate without --yes");
                }
                let scheduler = MigrationScheduler::new(InMemoryScheduler::new(), job);
                scheduler.ensure_scheduled().await?;
                let mut total = 0;
                loop {
                    let outcome = scheduler.tick().await?;
                    total += outcome.report().inserted;
                    println!("{}", outcome.report().summary());
                    if let TickOutcome::Finished(_) = outcome {
                        break;
                    }
                }
                println!("migration finished: {total} rows migrated");
            } else {
                let summary = admin::run_migration_now(&job, yes).await?;
                println!("{}", summary.message);
                for failure in &summary.errors {
                    println!("  #{}: {}", failure.comment_id, failure.message);
                }
            }
        }
        Commands::MigrationErrors => {
            let errors = job.errors().await?;
            if errors.is_empty() {
                println!("no migration errors");
            }
            for failure in errors {
                println!("#{}: {}", failure.comment_id, failure.message);
            }
        }
        Commands::MigrationReset => {
            job.reset().await?;
            println!("migration state reset");
        }
        Commands::EraseToken => {
            let token = TableEraser::new(pool, settings).issue_token().await?;
            println!("{token}");
        }
        Commands::Erase { token, yes } => {
            let report = TableEraser::new(pool, settings).erase(yes, &token).await?;
            println!(
                "erased {} rows (courses {}, lessons {}, submissions {}, grades {})",
                report.total(),
                report.course_progress,
                report.lesson_progress,
                report.quiz_submissions,
                report.quiz_grades
            );
        }
    }

    Ok(())
}
