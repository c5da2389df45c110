//! Config schema types (CRM webhook, detection thresholds, schedule, sinks, server).
use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplywatchConfig {
    pub server: ServerConfig,
    pub bitrix: BitrixConfig,
    pub detection: DetectionConfig,
    pub schedule: ScheduleConfig,
    pub telegram: TelegramConfig,
    pub digest: DigestConfig,
    pub metrics: MetricsConfig,
    /// Names of environment variables that were recognised but are no longer
    /// honoured. Filled by [`crate::apply_env_overrides`], never read from files.
    #[serde(skip)]
    pub obsolete_env: Vec<String>,
}

/// HTTP API server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to. Defaults to "127.0.0.1".
    pub bind: String,
    /// Port to listen on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8000,
        }
    }
}

/// Bitrix24 incoming webhook and transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BitrixConfig {
    /// Full webhook URL, e.g. `https://portal.bitrix24.ru/rest/1/abc123`.
    #[serde(serialize_with = "serialize_redacted")]
    pub webhook_url: Secret<String>,
    /// Per-request timeout in seconds.
    pub http_timeout_secs: f64,
    /// Extra attempts after the first failed one.
    pub retry: u32,
    /// Pause between attempts in milliseconds.
    pub retry_sleep_ms: u64,
}

impl Default for BitrixConfig {
    fn default() -> Self {
        Self {
            webhook_url: Secret::new(String::new()),
            http_timeout_secs: 25.0,
            retry: 2,
            retry_sleep_ms: 800,
        }
    }
}

impl BitrixConfig {
    pub fn has_webhook(&self) -> bool {
        !self.webhook_url.expose_secret().trim().is_empty()
    }
}

/// Thresholds and channel tags for unanswered-conversation detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// How far back inbound activities are scanned.
    pub window_days: u32,
    /// Minutes an inbound message may wait for a reply.
    pub response_sla_min: u32,
    pub max_rows_incoming: usize,
    pub max_rows_reply: usize,
    pub max_rows_call_activities: usize,
    /// `PROVIDER_ID` values counted as correspondence.
    pub providers_msg: Vec<String>,
    /// `PROVIDER_TYPE_ID` values counted as correspondence.
    pub providers_type: Vec<String>,
    /// Tracked `OWNER_TYPE_ID` values (1 lead, 2 contact, 3 company, 4 deal).
    pub entity_types: Vec<String>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            window_days: 14,
            response_sla_min: 45,
            max_rows_incoming: 1500,
            max_rows_reply: 300,
            max_rows_call_activities: 200,
            providers_msg: vec![
                "IMOPENLINES_SESSION".into(),
                "CRM_EMAIL".into(),
                "WAZZUP".into(),
            ],
            providers_type: vec!["WHATSAPP".into(), "EMAIL".into(), "15".into()],
            entity_types: vec!["1".into(), "2".into(), "3".into(), "4".into()],
        }
    }
}

/// When the scheduled scan fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Disable to run scans only through the API or CLI.
    pub enabled: bool,
    /// IANA timezone the schedule is evaluated in.
    pub timezone: String,
    pub hour: u32,
    pub minute: u32,
    /// Full cron expression; overrides `hour`/`minute` when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timezone: "Europe/Moscow".into(),
            hour: 19,
            minute: 0,
            cron: None,
        }
    }
}

/// Telegram digest delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token from @BotFather.
    #[serde(serialize_with = "serialize_redacted")]
    pub token: Secret<String>,
    /// Numeric chat id or `@channel` username.
    pub chat_id: String,
    /// Bot API base URL override (self-hosted Bot API servers).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: Secret::new(String::new()),
            chat_id: String::new(),
            api_url: None,
        }
    }
}

impl TelegramConfig {
    /// Both token and chat are set.
    pub fn is_configured(&self) -> bool {
        !self.token.expose_secret().trim().is_empty() && !self.chat_id.trim().is_empty()
    }
}

/// Digest rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestConfig {
    /// Portal base URL used for record links, e.g. `https://portal.bitrix24.ru`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub portal_url: Option<String>,
    /// Alerts listed before the "and N more" line.
    pub max_items: usize,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            portal_url: None,
            max_items: 50,
        }
    }
}

/// Metrics and observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether metrics collection is enabled.
    pub enabled: bool,
    /// Whether to expose the `/metrics` Prometheus endpoint.
    pub prometheus_endpoint: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prometheus_endpoint: true,
        }
    }
}

fn serialize_redacted<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    if secret.expose_secret().is_empty() {
        serializer.serialize_str("")
    } else {
        serializer.serialize_str("[REDACTED]")
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_legacy_env_defaults() {
        let cfg = ReplywatchConfig::default();
        assert_eq!(cfg.detection.window_days, 14);
        assert_eq!(cfg.detection.response_sla_min, 45);
        assert_eq!(cfg.detection.max_rows_incoming, 1500);
        assert_eq!(cfg.bitrix.retry, 2);
        assert_eq!(cfg.bitrix.retry_sleep_ms, 800);
        assert_eq!(cfg.schedule.hour, 19);
        assert_eq!(cfg.schedule.timezone, "Europe/Moscow");
        assert!(!cfg.telegram.is_configured());
        assert!(!cfg.bitrix.has_webhook());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: ReplywatchConfig = toml::from_str(
            r#"
            [detection]
            response_sla_min = 30

            [telegram]
            token = "123:ABC"
            chat_id = "-100200"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.detection.response_sla_min, 30);
        assert_eq!(cfg.detection.window_days, 14);
        assert!(cfg.telegram.is_configured());
        assert_eq!(cfg.telegram.token.expose_secret(), "123:ABC");
    }

    #[test]
    fn serialization_redacts_secrets() {
        let mut cfg = ReplywatchConfig::default();
        cfg.bitrix.webhook_url = Secret::new("https://x.bitrix24.ru/rest/1/secret".into());
        let out = toml::to_string(&cfg).unwrap();
        assert!(out.contains("[REDACTED]"));
        assert!(!out.contains("secret\""));
    }
}
