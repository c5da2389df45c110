use std::sync::Arc;

use {
    chrono_tz::Tz,
    replywatch_alerts::{Inspector, ScanService},
    replywatch_cron::ScanScheduler,
};

#[cfg(feature = "metrics")]
use replywatch_metrics::MetricsHandle;

/// Services shared by every request handler.
pub struct GatewayState {
    pub scan: Arc<ScanService>,
    pub inspector: Arc<Inspector>,
    /// Absent when scheduling is disabled in config.
    pub scheduler: Option<Arc<ScanScheduler>>,
    /// Zone used for `/health` timestamps.
    pub timezone: Tz,
    pub version: String,
    #[cfg(feature = "metrics")]
    pub metrics_handle: Option<MetricsHandle>,
}

impl GatewayState {
    pub fn new(scan: Arc<ScanService>, inspector: Arc<Inspector>, timezone: Tz) -> Self {
        Self {
            scan,
            inspector,
            scheduler: None,
            timezone,
            version: env!("CARGO_PKG_VERSION").to_string(),
            #[cfg(feature = "metrics")]
            metrics_handle: None,
        }
    }

    #[must_use]
    pub fn with_scheduler(mut self, scheduler: Arc<ScanScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    #[cfg(feature = "metrics")]
    #[must_use]
    pub fn with_metrics(mut self, handle: MetricsHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}
