//! Background scheduling of the migration job.
//!
//! The host's job runner is reached through [`JobScheduler`]. The migration
//! runs as a recurring job that cancels itself once the legacy store is
//! drained.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{MigrationJob, MigrationReport};
use crate::persistence::PersistenceError;

pub const MIGRATION_JOB: &str = "progress_tables_migration";
pub const MIGRATION_GROUP: &str = "progress-storage";

/// Default pause between two migration batches.
pub const DEFAULT_MIGRATION_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("scheduler rejected job {name} in {group}: {reason}")]
    Rejected {
        name: String,
        group: String,
        reason: String,
    },
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// When a scheduled job fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    Recurring(Duration),
    /// Once, at a unix timestamp.
    Once(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledJob {
    pub schedule: Schedule,
    pub args: Vec<String>,
}

/// Named background jobs, grouped, with string arguments.
pub trait JobScheduler: Send + Sync {
    fn schedule_recurring(
        &self,
        name: &str,
        group: &str,
        interval: Duration,
        args: &[String],
    ) -> impl Future<Output = Result<(), SchedulerError>> + Send;

    fn schedule_single(
        &self,
        name: &str,
        group: &str,
        at: u64,
        args: &[String],
    ) -> impl Future<Output = Result<(), SchedulerError>> + Send;

    /// Returns whether a job was removed.
    fn cancel(&self, name: &str, group: &str) -> impl Future<Output = Result<bool, SchedulerError>> + Send;

    fn is_scheduled(&self, name: &str, group: &str) -> impl Future<Output = Result<bool, SchedulerError>> + Send;
}

/// Scheduler that only remembers what was scheduled. The CLI drives
/// [`MigrationScheduler::tick`] itself.
#[derive(Debug, Clone, Default)]
pub struct InMemoryScheduler {
    jobs: Arc<Mutex<HashMap<(String, String), ScheduledJob>>>,
}

impl InMemoryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn job(&self, name: &str, group: &str) -> Option<ScheduledJob> {
        self.jobs
            .lock()
            .await
            .get(&(name.to_string(), group.to_string()))
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }

    async fn insert(&self, name: &str, group: &str, job: ScheduledJob) {
        self.jobs
            .lock()
            .await
            .insert((name.to_string(), group.to_string()), job);
    }
}

impl JobScheduler for InMemoryScheduler {
    async fn schedule_recurring(
        &self,
        name: &str,
        group: &str,
        interval: Duration,
        args: &[String],
    ) -> Result<(), SchedulerError> {
        if interval.is_zero() {
            return Err(SchedulerError::Rejected {
                name: name.to_string(),
                group: group.to_string(),
                reason: "interval must be positive".to_string(),
            });
        }
        let job = ScheduledJob {
            schedule: Schedule::Recurring(interval),
            args: args.to_vec(),
        };
        self.insert(name, group, job).await;
        Ok(())
    }

    async fn schedule_single(
        &self,
        name: &str,
        group: &str,
        at: u64,
        args: &[String],
    ) -> Result<(), SchedulerError> {
        let job = ScheduledJob {
            schedule: Schedule::Once(at),
            args: args.to_vec(),
        };
        self.insert(name, group, job).await;
        Ok(())
    }

    async fn cancel(&self, name: &str, group: &str) -> Result<bool, SchedulerError> {
        Ok(self
            .jobs
            .lock()
            .await
            .remove(&(name.to_string(), group.to_string()))
            .is_some())
    }

    async fn is_scheduled(&self, name: &str, group: &str) -> Result<bool, SchedulerError> {
        Ok(self
            .jobs
            .lock()
            .await
            .contains_key(&(name.to_string(), group.to_string())))
    }
}

/// Outcome of one scheduled run.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// More legacy records remain; the job stays scheduled.
    Continue(MigrationReport),
    /// The store is drained and the recurring job was cancelled.
    Finished(MigrationReport),
}

impl TickOutcome {
    pub fn report(&self) -> &MigrationReport {
        match self {
            TickOutcome::Continue(report) | TickOutcome::Finished(report) => report,
        }
    }
}

/// Keeps the migration job scheduled until it has nothing left to do.
pub struct MigrationScheduler<S> {
    scheduler: S,
    job: MigrationJob,
    interval: Duration,
    guard: Mutex<()>,
}

impl<S: JobScheduler> MigrationScheduler<S> {
    pub fn new(scheduler: S, job: MigrationJob) -> Self {
        Self {
            scheduler,
            job,
            interval: DEFAULT_MIGRATION_INTERVAL,
            guard: Mutex::new(()),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn job(&self) -> &MigrationJob {
        &self.job
    }

    /// Schedule the recurring migration unless it already is. Returns
    /// whether a new schedule was created.
    pub async fn ensure_scheduled(&self) -> Result<bool, SchedulerError> {
        let _guard = self.guard.lock().await;
        if self.scheduler.is_scheduled(MIGRATION_JOB, MIGRATION_GROUP).await? {
            debug!(job = MIGRATION_JOB, "Migration already scheduled");
            return Ok(false);
        }
        self.scheduler
            .schedule_recurring(MIGRATION_JOB, MIGRATION_GROUP, self.interval, &[])
            .await?;
        info!(
            job = MIGRATION_JOB,
            group = MIGRATION_GROUP,
            interval_secs = self.interval.as_secs(),
            "Migration scheduled"
        );
        Ok(true)
    }

    /// Run one batch, cancelling the recurring job once a batch inserts
    /// nothing and no legacy records remain.
    pub async fn tick(&self) -> Result<TickOutcome, SchedulerError> {
        let report = self.job.run(false).await?;
        if report.inserted > 0 {
            return Ok(TickOutcome::Continue(report));
        }
        let status = self.job.status().await?;
        if !status.is_complete() {
            return Ok(TickOutcome::Continue(report));
        }

        let _guard = self.guard.lock().await;
        self.scheduler.cancel(MIGRATION_JOB, MIGRATION_GROUP).await?;
        info!(job = MIGRATION_JOB, cursor = status.cursor, "Migration finished, job cancelled");
        Ok(TickOutcome::Finished(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::comments::{CommentRecord, CommentStore, CommentType};
    use crate::persistence::sqlite::Database;
    use crate::persistence::Settings;

    async fn setup() -> (Database, CommentStore, MigrationScheduler<InMemoryScheduler>) {
        let db = Database::new_in_memory().await.unwrap();
        let store = CommentStore::new(db.pool().clone());
        let job = MigrationJob::new(db.pool().clone(), Settings::new(db.pool().clone()))
            .with_batch_size(2);
        let scheduler = MigrationScheduler::new(InMemoryScheduler::new(), job);
        (db, store, scheduler)
    }

    #[tokio::test]
    async fn test_ensure_scheduled_is_single_flight() {
        let (_db, _store, scheduler) = setup().await;
        let scheduler = Arc::new(scheduler);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let scheduler = scheduler.clone();
            handles.push(tokio::spawn(async move { scheduler.ensure_scheduled().await.unwrap() }));
        }
        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap() {
                created += 1;
            }
        }

        assert_eq!(created, 1);
        assert_eq!(scheduler.scheduler().len().await, 1);
        let job = scheduler
            .scheduler()
            .job(MIGRATION_JOB, MIGRATION_GROUP)
            .await
            .unwrap();
        assert_eq!(job.schedule, Schedule::Recurring(DEFAULT_MIGRATION_INTERVAL));
    }

    #[tokio::test]
    async fn test_tick_cancels_when_drained() {
        let (_db, store, scheduler) = setup().await;
        for lesson_id in 100..103 {
            let record = CommentRecord::new(CommentType::LessonStatus, lesson_id, 1, "in-progress", 50);
            store.insert(&record).await.unwrap();
        }
        scheduler.ensure_scheduled().await.unwrap();

        let first = scheduler.tick().await.unwrap();
        assert!(matches!(first, TickOutcome::Continue(_)));
        assert_eq!(first.report().inserted, 2);

        let second = scheduler.tick().await.unwrap();
        assert!(matches!(second, TickOutcome::Continue(_)));
        assert_eq!(second.report().inserted, 1);

        let third = scheduler.tick().await.unwrap();
        assert!(matches!(third, TickOutcome::Finished(_)));
        assert!(!scheduler
            .scheduler()
            .is_scheduled(MIGRATION_JOB, MIGRATION_GROUP)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_zero_interval_is_rejected() {
        let scheduler = InMemoryScheduler::new();
        let err = scheduler
            .schedule_recurring("job", "group", Duration::ZERO, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Rejected { .. }));
    }

    #[tokio::test]
    async fn test_single_job_and_cancel() {
        let scheduler = InMemoryScheduler::new();
        let args = vec!["42".to_string()];
        scheduler.schedule_single("job", "group", 1_700_000_000, &args).await.unwrap();
        let job = scheduler.job("job", "group").await.unwrap();
        assert_eq!(job.schedule, Schedule::Once(1_700_000_000));
        assert_eq!(job.args, args);

        assert!(scheduler.cancel("job", "group").await.unwrap());
        assert!(!scheduler.cancel("job", "group").await.unwrap());
    }
}
