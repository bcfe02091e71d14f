use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use jiff::Timestamp;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::error::{AppError, AppResult};
use crate::jobs::executor::ScheduleExecutor;
use crate::jobs::models::ScheduleExecution;
use crate::jobs::queue::ConcurrencyQueue;
use crate::jobs::types::{ExecutionStatus, ScheduleStatus};
use crate::repositories::JobRepository;

type DispatchResult = (Uuid, AppResult<Vec<ScheduleExecution>>);

/// Counters for one tick (or one drain)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub due: usize,
    pub enqueued: usize,
    pub dispatched: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: usize,
    pub errors: usize,
    pub queued: usize,
}

impl TickReport {
    fn absorb(&mut self, (job_id, result): DispatchResult) {
        match result {
            Ok(records) => {
                for record in records {
                    match record.status {
                        ExecutionStatus::Completed => self.completed += 1,
                        ExecutionStatus::Failed => self.failed += 1,
                        ExecutionStatus::Skipped => self.skipped += 1,
                        ExecutionStatus::Cancelled => self.cancelled += 1,
                        ExecutionStatus::Pending | ExecutionStatus::Running => {}
                    }
                }
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Job tick failed");
                self.errors += 1;
            }
        }
    }
}

/// Releases the job's queue slot when the dispatched task ends, even by panic
struct Admission {
    queue: Arc<StdMutex<ConcurrencyQueue>>,
    job_id: Uuid,
}

impl Drop for Admission {
    fn drop(&mut self) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .complete(self.job_id);
    }
}

/// Poll-driven dispatcher: due lookup, admission, bounded parallel execution
pub struct JobScheduler {
    jobs: Arc<dyn JobRepository>,
    executor: Arc<ScheduleExecutor>,
    queue: Arc<StdMutex<ConcurrencyQueue>>,
    workers: Arc<Semaphore>,
    tasks: Mutex<JoinSet<DispatchResult>>,
    due_batch_limit: usize,
    tick_interval: Duration,
}

impl JobScheduler {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        executor: Arc<ScheduleExecutor>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            jobs,
            executor,
            queue: Arc::new(StdMutex::new(ConcurrencyQueue::new(
                config.max_global_concurrency,
                config.max_per_owner_concurrency,
            ))),
            workers: Arc::new(Semaphore::new(config.worker_count)),
            tasks: Mutex::new(JoinSet::new()),
            due_batch_limit: config.due_batch_limit,
            tick_interval: config.tick_interval(),
        }
    }

    /// One driver pass.
    ///
    /// Outcomes of runs that finished since the previous tick are folded
    /// into the returned report; runs dispatched now are reported later.
    pub async fn tick(&self, now: Timestamp) -> AppResult<TickReport> {
        let mut report = TickReport::default();
        let mut tasks = self.tasks.lock().await;

        while let Some(joined) = tasks.try_join_next() {
            Self::reap(&mut report, joined);
        }

        let due = self.jobs.get_due_jobs(now, self.due_batch_limit).await?;
        report.due = due.len();

        {
            let mut queue = self.lock_queue();
            for job in due {
                if queue.enqueue(job) {
                    report.enqueued += 1;
                }
            }
        }

        loop {
            let Ok(permit) = Arc::clone(&self.workers).try_acquire_owned() else {
                break;
            };
            let Some(job) = self.lock_queue().dequeue() else {
                break;
            };

            let admission = Admission {
                queue: Arc::clone(&self.queue),
                job_id: job.id,
            };
            let executor = Arc::clone(&self.executor);
            let jobs = Arc::clone(&self.jobs);
            tracing::debug!(job_id = %job.id, owner = %job.owner_id, priority = %job.priority, "Dispatching job");

            tasks.spawn(async move {
                let _permit = permit;
                let _admission = admission;
                // the queued copy may be several ticks old
                let result = match jobs.get_by_id(job.id).await {
                    Ok(current)
                        if matches!(current.status, ScheduleStatus::Paused | ScheduleStatus::Completed) =>
                    {
                        tracing::debug!(job_id = %job.id, status = %current.status, "Dropping queued job");
                        Ok(Vec::new())
                    }
                    Ok(current) => executor.handle_missed(&current, now).await,
                    Err(AppError::NotFound { .. }) => {
                        tracing::debug!(job_id = %job.id, "Queued job was deleted");
                        Ok(Vec::new())
                    }
                    Err(e) => Err(e),
                };
                (job.id, result)
            });
            report.dispatched += 1;
        }

        report.queued = self.lock_queue().len();
        Ok(report)
    }

    /// Waits for every dispatched run to finish
    pub async fn drain(&self) -> TickReport {
        let mut report = TickReport::default();
        let mut tasks = self.tasks.lock().await;
        while let Some(joined) = tasks.join_next().await {
            Self::reap(&mut report, joined);
        }
        report.queued = self.lock_queue().len();
        report
    }

    /// Ticks every `tick_interval` until `shutdown` fires, then drains
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(tick_interval_secs = self.tick_interval.as_secs(), "Scheduler started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    match self.tick(Timestamp::now()).await {
                        Ok(report) if report.due > 0 || report.completed + report.failed > 0 => {
                            tracing::info!(
                                due = report.due,
                                dispatched = report.dispatched,
                                completed = report.completed,
                                failed = report.failed,
                                skipped = report.skipped,
                                queued = report.queued,
                                "Tick finished"
                            );
                        }
                        Ok(_) => tracing::trace!("Tick found nothing due"),
                        Err(e) => tracing::error!(error = %e, "Tick failed"),
                    }
                }
            }
        }

        tracing::info!("Scheduler stopping, waiting for running jobs");
        let report = self.drain().await;
        tracing::info!(
            completed = report.completed,
            failed = report.failed,
            skipped = report.skipped,
            "Scheduler stopped"
        );
    }

    pub fn queued(&self) -> usize {
        self.lock_queue().len()
    }

    pub fn running(&self) -> usize {
        self.lock_queue().running_count()
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, ConcurrencyQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reap(report: &mut TickReport, joined: Result<DispatchResult, tokio::task::JoinError>) {
        match joined {
            Ok(result) => report.absorb(result),
            Err(e) => {
                tracing::error!(error = %e, "Dispatched job task aborted");
                report.errors += 1;
            }
        }
    }
}
