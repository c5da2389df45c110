//! One scan: detect, render, deliver.

use std::{sync::Arc, time::Instant};

use {
    chrono::{DateTime, Utc},
    serde::Serialize,
    tracing::{error, info, warn},
};

#[cfg(feature = "metrics")]
use replywatch_metrics::{counter, gauge, histogram, scan as scan_metrics};

use crate::{
    detector::{Alert, Detector},
    digest::{DigestOptions, format_digest, format_scan_error},
    error::Result,
    sink::DigestSink,
};

/// Outcome of a completed scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub alerts: Vec<Alert>,
    /// The digest was handed to the sink.
    pub sent: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ScanService {
    detector: Arc<Detector>,
    sink: Arc<dyn DigestSink>,
    options: DigestOptions,
}

impl ScanService {
    pub fn new(detector: Arc<Detector>, sink: Arc<dyn DigestSink>, options: DigestOptions) -> Self {
        Self {
            detector,
            sink,
            options,
        }
    }

    #[must_use]
    pub fn detector(&self) -> &Arc<Detector> {
        &self.detector
    }

    /// Detect alerts and send the digest, even when it is empty.
    pub async fn run(&self) -> Result<ScanReport> {
        let started_at = Utc::now();
        let started = Instant::now();
        #[cfg(feature = "metrics")]
        counter!(scan_metrics::RUNS_TOTAL).increment(1);

        let alerts = self.detector.detect_at(started_at).await?;
        let text = format_digest(&alerts, &self.options);
        self.sink.send(&text).await?;

        #[cfg(feature = "metrics")]
        {
            counter!(scan_metrics::ALERTS_TOTAL).increment(alerts.len() as u64);
            gauge!(scan_metrics::LAST_ALERTS).set(alerts.len() as f64);
            histogram!(scan_metrics::DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        }
        info!(
            alerts = alerts.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "scan finished, digest sent"
        );

        Ok(ScanReport {
            alerts,
            sent: true,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// [`run`](Self::run), sending a failure notice to the sink when the scan
    /// fails. The original error is returned either way.
    pub async fn run_and_report(&self) -> Result<ScanReport> {
        match self.run().await {
            Ok(report) => Ok(report),
            Err(e) => {
                error!(error = %e, "scan failed");
                #[cfg(feature = "metrics")]
                counter!(scan_metrics::ERRORS_TOTAL).increment(1);
                if let Err(notify_err) = self.sink.send(&format_scan_error(&e)).await {
                    warn!(error = %notify_err, "failed to deliver scan error notice");
                }
                Err(e)
            },
        }
    }
}
