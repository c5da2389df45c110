//! Cron-driven scan scheduling.
//! Daily trigger in a configurable timezone, manual runs, in-memory run history.

pub mod error;
pub mod schedule;
pub mod service;
pub mod types;

pub use {
    error::{Error, Result},
    schedule::compute_next_run,
    service::{ScanFn, ScanScheduler},
    types::{CronSchedule, RunStatus, RunTrigger, ScanRunRecord, SchedulerStatus},
};
