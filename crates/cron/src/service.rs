//! Scan scheduler: timer loop, overlap guard, run history.

use std::{
    collections::VecDeque,
    future::Future,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    replywatch_common::time::now_ms,
    tokio::{
        sync::{Mutex, Notify, RwLock},
        task::JoinHandle,
    },
    tracing::{debug, error, info, warn},
};

#[cfg(feature = "metrics")]
use replywatch_metrics::{counter, cron as cron_metrics, labels};

use crate::{
    error::{Error, Result},
    schedule::compute_next_run,
    types::{CronSchedule, RunStatus, RunTrigger, ScanRunRecord, SchedulerStatus},
};

/// Callback running one scan; resolves to the number of alerts found.
pub type ScanFn =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = anyhow::Result<usize>> + Send>> + Send + Sync>;

/// Run records kept in memory.
pub const MAX_HISTORY: usize = 50;

/// Poll interval when the schedule has no upcoming occurrence.
const IDLE_POLL_MS: u64 = 60_000;

/// Fires the scan on a cron schedule and keeps a short run history.
///
/// At most one scan executes at a time. A trigger that fires while a scan is
/// still running is recorded as [`RunStatus::Skipped`].
pub struct ScanScheduler {
    schedule: CronSchedule,
    on_scan: ScanFn,
    timer_handle: Mutex<Option<JoinHandle<()>>>,
    wake_notify: Arc<Notify>,
    running: RwLock<bool>,
    next_run_at_ms: RwLock<Option<u64>>,
    scan_in_progress: Arc<AtomicBool>,
    history: Mutex<VecDeque<ScanRunRecord>>,
}

/// Clears the in-progress flag when a run ends, including on panic.
struct InProgress(Arc<AtomicBool>);

impl Drop for InProgress {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ScanScheduler {
    /// Validates the schedule up front so a bad expression or timezone fails
    /// at startup rather than inside the timer loop.
    pub fn new(schedule: CronSchedule, on_scan: ScanFn) -> Result<Arc<Self>> {
        compute_next_run(&schedule, now_ms())?;
        Ok(Arc::new(Self {
            schedule,
            on_scan,
            timer_handle: Mutex::new(None),
            wake_notify: Arc::new(Notify::new()),
            running: RwLock::new(false),
            next_run_at_ms: RwLock::new(None),
            scan_in_progress: Arc::new(AtomicBool::new(false)),
            history: Mutex::new(VecDeque::new()),
        }))
    }

    pub fn schedule(&self) -> &CronSchedule {
        &self.schedule
    }

    /// Start the timer loop, replacing one that is already running.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let next = compute_next_run(&self.schedule, now_ms())?;
        *self.next_run_at_ms.write().await = next;
        *self.running.write().await = true;

        let svc = Arc::clone(self);
        let handle = tokio::spawn(async move {
            svc.timer_loop().await;
        });

        if let Some(old) = self.timer_handle.lock().await.replace(handle) {
            old.abort();
        }
        info!(
            expr = %self.schedule.expr,
            tz = self.schedule.tz.as_deref().unwrap_or("UTC"),
            next_run_at_ms = ?next,
            "scan scheduler started"
        );
        Ok(())
    }

    /// Stop the timer loop. A scan already executing runs to completion.
    pub async fn stop(&self) {
        *self.running.write().await = false;
        *self.next_run_at_ms.write().await = None;
        self.wake_notify.notify_one();

        if let Some(h) = self.timer_handle.lock().await.take() {
            h.abort();
        }
        info!("scan scheduler stopped");
    }

    /// Run a scan immediately, outside the schedule.
    pub async fn run_now(self: &Arc<Self>) -> Result<ScanRunRecord> {
        let Some(guard) = self.try_begin() else {
            return Err(Error::AlreadyRunning);
        };
        Ok(self.execute(RunTrigger::Manual, guard).await)
    }

    pub async fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            running: *self.running.read().await,
            schedule: self.schedule.clone(),
            next_run_at_ms: *self.next_run_at_ms.read().await,
            scan_in_progress: self.scan_in_progress.load(Ordering::SeqCst),
            last_run: self.history.lock().await.front().cloned(),
        }
    }

    /// Most recent runs, newest first.
    pub async fn runs(&self, limit: usize) -> Vec<ScanRunRecord> {
        self.history
            .lock()
            .await
            .iter()
            .take(limit)
            .cloned()
            .collect()
    }

    // ── Internal ────────────────────────────────────────────────────────

    fn try_begin(&self) -> Option<InProgress> {
        self.scan_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| InProgress(Arc::clone(&self.scan_in_progress)))
    }

    async fn timer_loop(self: &Arc<Self>) {
        loop {
            if !*self.running.read().await {
                break;
            }

            let sleep_ms = self.ms_until_next_wake().await;

            if sleep_ms > 0 {
                let notify = Arc::clone(&self.wake_notify);
                tokio::select! {
                    () = tokio::time::sleep(Duration::from_millis(sleep_ms)) => {},
                    () = notify.notified() => {
                        debug!("timer loop woken by notify");
                        continue;
                    },
                }
            }

            if !*self.running.read().await {
                break;
            }

            self.fire_if_due().await;
        }
    }

    async fn ms_until_next_wake(&self) -> u64 {
        let now = now_ms();
        self.next_run_at_ms
            .read()
            .await
            .map(|t| t.saturating_sub(now))
            .unwrap_or(IDLE_POLL_MS)
    }

    async fn fire_if_due(self: &Arc<Self>) {
        let now = now_ms();
        {
            let mut next = self.next_run_at_ms.write().await;
            let Some(due) = *next else {
                return;
            };
            if due > now {
                return;
            }
            *next = match compute_next_run(&self.schedule, now.max(due)) {
                Ok(n) => n,
                Err(e) => {
                    error!(error = %e, "failed to compute next scan run");
                    None
                },
            };
        }

        match self.try_begin() {
            Some(guard) => {
                let svc = Arc::clone(self);
                tokio::spawn(async move {
                    svc.execute(RunTrigger::Schedule, guard).await;
                });
            },
            None => self.record_skipped(now).await,
        }
    }

    async fn record_skipped(&self, at_ms: u64) {
        warn!("scheduled scan skipped: previous scan still running");

        #[cfg(feature = "metrics")]
        counter!(cron_metrics::SKIPPED_TOTAL).increment(1);

        self.push_record(ScanRunRecord {
            started_at_ms: at_ms,
            finished_at_ms: at_ms,
            duration_ms: 0,
            trigger: RunTrigger::Schedule,
            status: RunStatus::Skipped,
            alerts: None,
            error: None,
        })
        .await;
    }

    async fn execute(&self, trigger: RunTrigger, _guard: InProgress) -> ScanRunRecord {
        let started = now_ms();
        info!(?trigger, "scan run started");

        let result = (self.on_scan)().await;
        let finished = now_ms();

        let record = match result {
            Ok(alerts) => {
                info!(
                    alerts,
                    duration_ms = finished.saturating_sub(started),
                    "scan run finished"
                );
                ScanRunRecord {
                    started_at_ms: started,
                    finished_at_ms: finished,
                    duration_ms: finished.saturating_sub(started),
                    trigger,
                    status: RunStatus::Ok,
                    alerts: Some(alerts),
                    error: None,
                }
            },
            Err(e) => {
                error!(error = %e, "scan run failed");
                ScanRunRecord {
                    started_at_ms: started,
                    finished_at_ms: finished,
                    duration_ms: finished.saturating_sub(started),
                    trigger,
                    status: RunStatus::Error,
                    alerts: None,
                    error: Some(format!("{e:#}")),
                }
            },
        };

        #[cfg(feature = "metrics")]
        counter!(
            cron_metrics::EXECUTIONS_TOTAL,
            labels::STATUS => if record.status == RunStatus::Ok { "ok" } else { "error" }
        )
        .increment(1);

        self.push_record(record.clone()).await;
        record
    }

    async fn push_record(&self, record: ScanRunRecord) {
        let mut history = self.history.lock().await;
        history.push_front(record);
        history.truncate(MAX_HISTORY);
    }
}
