use {async_trait::async_trait, tracing::info};

use crate::error::Result;

/// Destination of digests and scan-error notices.
#[async_trait]
pub trait DigestSink: Send + Sync {
    async fn send(&self, text: &str) -> Result<()>;
}

/// Logs the digest instead of delivering it (dry runs, unconfigured sink).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

#[async_trait]
impl DigestSink for NoopSink {
    async fn send(&self, text: &str) -> Result<()> {
        info!(len = text.len(), "digest not delivered (no sink)");
        Ok(())
    }
}
