//! Wiring from config to services.

use std::{path::Path, sync::Arc};

use {
    anyhow::{Context, Result},
    async_trait::async_trait,
    replywatch_alerts::{DigestOptions, DigestSink, Detector, Inspector, ScanService},
    replywatch_bitrix::{BitrixClient, CrmSource},
    replywatch_config::ReplywatchConfig,
    replywatch_telegram::TelegramNotifier,
    tracing::warn,
};

/// Load `path` when given, otherwise discover the config file. Legacy
/// environment variables are applied on top either way.
pub fn load_config(path: Option<&Path>) -> Result<ReplywatchConfig> {
    let config = match path {
        Some(path) => {
            let config = replywatch_config::load_config(path)
                .with_context(|| format!("loading {}", path.display()))?;
            replywatch_config::apply_env_overrides(config)
        },
        None => replywatch_config::discover_and_load(),
    };
    report_obsolete_env(&config);
    Ok(config)
}

/// Warn once per obsolete environment variable; returns how many were set.
fn report_obsolete_env(config: &ReplywatchConfig) -> usize {
    for name in &config.obsolete_env {
        warn!(variable = %name, "environment variable is obsolete and ignored");
    }
    config.obsolete_env.len()
}

/// Prints the digest instead of delivering it.
pub struct StdoutSink;

#[async_trait]
impl DigestSink for StdoutSink {
    async fn send(&self, text: &str) -> replywatch_alerts::Result<()> {
        println!("{text}");
        Ok(())
    }
}

pub struct Services {
    pub scan: Arc<ScanService>,
    pub inspector: Arc<Inspector>,
}

fn crm_source(config: &ReplywatchConfig) -> Result<Arc<dyn CrmSource>> {
    let client = BitrixClient::new(&config.bitrix)
        .context("Bitrix24 webhook is not usable (set bitrix.webhook_url or B24_WEBHOOK)")?;
    Ok(Arc::new(client))
}

/// Build the scan pipeline. With `dry_run` the digest goes to stdout.
pub fn build_services(config: &ReplywatchConfig, dry_run: bool) -> Result<Services> {
    let crm = crm_source(config)?;

    let sink: Arc<dyn DigestSink> = if dry_run {
        Arc::new(StdoutSink)
    } else {
        let notifier = TelegramNotifier::new(&config.telegram)?;
        if !notifier.is_enabled() {
            warn!("telegram is not configured; digests are only logged");
        }
        Arc::new(notifier)
    };

    let detector = Detector::new(Arc::clone(&crm), &config.detection);
    let scan = ScanService::new(
        Arc::new(detector),
        sink,
        DigestOptions::from(&config.digest),
    );

    Ok(Services {
        scan: Arc::new(scan),
        inspector: Arc::new(Inspector::new(crm)),
    })
}

/// Only the CRM views, for `debug` subcommands.
pub fn build_inspector(config: &ReplywatchConfig) -> Result<Inspector> {
    Ok(Inspector::new(crm_source(config)?))
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use {super::*, std::io::Write};

    #[test]
    fn explicit_config_file_is_loaded() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[detection]\nresponse_sla_min = 90\n\n[schedule]\nhour = 20\nminute = 30"
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.detection.response_sla_min, 90);
        assert_eq!(config.schedule.hour, 20);
        assert_eq!(config.schedule.minute, 30);
        assert_eq!(config.schedule.timezone, "Europe/Moscow");
    }

    #[test]
    fn obsolete_env_is_reported_for_every_command() {
        let mut config = ReplywatchConfig::default();
        assert_eq!(report_obsolete_env(&config), 0);
        config.obsolete_env.push("CRON_MINUTES".into());
        assert_eq!(report_obsolete_env(&config), 1);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("nope.toml"));
    }

    #[test]
    fn services_need_a_webhook() {
        let config = ReplywatchConfig::default();
        let err = build_services(&config, true).err().unwrap();
        assert!(err.to_string().contains("webhook"));
    }

    #[test]
    fn services_build_with_webhook_and_no_telegram() {
        let mut config = ReplywatchConfig::default();
        config.bitrix.webhook_url =
            secrecy::Secret::new("https://acme.bitrix24.ru/rest/1/token".to_string());
        config.telegram.chat_id.clear();
        assert!(build_services(&config, false).is_ok());
        assert!(build_inspector(&config).is_ok());
    }
}
