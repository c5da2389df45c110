//! Schedule and run-history types.

use {
    replywatch_config::ScheduleConfig,
    serde::{Deserialize, Serialize},
};

/// A cron trigger evaluated in an optional IANA timezone.
///
/// `expr` is either the 5-field form (`min hour dom month dow`) or the
/// 7-field form of the `cron` crate (`sec min hour dom month dow year`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CronSchedule {
    pub expr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tz: Option<String>,
}

impl CronSchedule {
    /// Every day at `hour:minute` in `tz`.
    #[must_use]
    pub fn daily(hour: u32, minute: u32, tz: impl Into<String>) -> Self {
        Self {
            expr: format!("{minute} {hour} * * *"),
            tz: Some(tz.into()),
        }
    }

    /// The `cron` override when set, otherwise the daily `hour:minute`.
    #[must_use]
    pub fn from_config(config: &ScheduleConfig) -> Self {
        match config.cron.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            Some(expr) => Self {
                expr: expr.to_string(),
                tz: Some(config.timezone.clone()),
            },
            None => Self::daily(config.hour, config.minute, config.timezone.clone()),
        }
    }
}

/// Outcome of a single run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RunStatus {
    Ok,
    Error,
    /// The trigger fired while another run was still in progress.
    Skipped,
}

/// What started a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RunTrigger {
    Schedule,
    Manual,
}

/// Log entry for one scan run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScanRunRecord {
    pub started_at_ms: u64,
    pub finished_at_ms: u64,
    pub duration_ms: u64,
    pub trigger: RunTrigger,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alerts: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Scheduler snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    /// The timer loop is active.
    pub running: bool,
    pub schedule: CronSchedule,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_run_at_ms: Option<u64>,
    /// A scan is executing right now.
    pub scan_in_progress: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run: Option<ScanRunRecord>,
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_schedule_expression() {
        let s = CronSchedule::daily(19, 0, "Europe/Moscow");
        assert_eq!(s.expr, "0 19 * * *");
        assert_eq!(s.tz.as_deref(), Some("Europe/Moscow"));
    }

    #[test]
    fn config_cron_overrides_hour_and_minute() {
        let mut config = ScheduleConfig::default();
        assert_eq!(CronSchedule::from_config(&config).expr, "0 19 * * *");

        config.cron = Some("30 8 * * 1-5".into());
        config.timezone = "UTC".into();
        assert_eq!(CronSchedule::from_config(&config), CronSchedule {
            expr: "30 8 * * 1-5".into(),
            tz: Some("UTC".into()),
        });

        config.cron = Some("  ".into());
        assert_eq!(CronSchedule::from_config(&config).expr, "0 19 * * *");
    }

    #[test]
    fn run_record_serializes_camel_case() {
        let record = ScanRunRecord {
            started_at_ms: 1,
            finished_at_ms: 3,
            duration_ms: 2,
            trigger: RunTrigger::Manual,
            status: RunStatus::Ok,
            alerts: Some(4),
            error: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["startedAtMs"], 1);
        assert_eq!(json["trigger"], "manual");
        assert_eq!(json["status"], "ok");
        assert!(json.get("error").is_none());
    }
}
