use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{
    Result,
    env_subst::substitute_env,
    error::{Context, Error},
    schema::ReplywatchConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "replywatch.toml",
    "replywatch.yaml",
    "replywatch.yml",
    "replywatch.json",
];

/// Environment variables that used to drive the schedule and are now ignored.
const OBSOLETE_ENV: &[&str] = &["CRON_MINUTES"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<ReplywatchConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./replywatch.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/replywatch/replywatch.{toml,yaml,yml,json}` (user-global)
///
/// Returns `ReplywatchConfig::default()` if no config file is found. Legacy
/// environment variables are layered on top in every case.
pub fn discover_and_load() -> ReplywatchConfig {
    let config = match find_config_file() {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            load_config(&path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                ReplywatchConfig::default()
            })
        },
        None => {
            debug!("no config file found, using defaults");
            ReplywatchConfig::default()
        },
    };
    apply_env_overrides(config)
}

/// First existing config file in the standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
        .or_else(|| {
            let dir = config_dir()?;
            CONFIG_FILENAMES
                .iter()
                .map(|name| dir.join(name))
                .find(|p| p.exists())
        })
}

/// Returns the user-global config directory (`~/.config/replywatch/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "replywatch").map(|d| d.config_dir().to_path_buf())
}

/// Apply the process environment on top of `config`.
pub fn apply_env_overrides(config: ReplywatchConfig) -> ReplywatchConfig {
    apply_env_overrides_with(config, |name| std::env::var(name).ok())
}

/// Apply environment overrides using a custom lookup.
///
/// Empty values are ignored. Values that fail to parse are logged and skipped.
fn apply_env_overrides_with(
    mut config: ReplywatchConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> ReplywatchConfig {
    let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    if let Some(v) = get("B24_WEBHOOK") {
        config.bitrix.webhook_url = secrecy::Secret::new(v);
    }
    override_parsed(&get, "HTTP_TIMEOUT", &mut config.bitrix.http_timeout_secs);
    override_parsed(&get, "HTTP_RETRY", &mut config.bitrix.retry);
    if let Some(secs) = parse_env::<f64>(&get, "HTTP_RETRY_SLEEP") {
        config.bitrix.retry_sleep_ms = (secs.max(0.0) * 1000.0).round() as u64;
    }

    let detection = &mut config.detection;
    override_parsed(&get, "WINDOW_DAYS", &mut detection.window_days);
    override_parsed(&get, "RESPONSE_SLA_MIN", &mut detection.response_sla_min);
    override_parsed(&get, "MAX_ROWS_INCOMING", &mut detection.max_rows_incoming);
    override_parsed(&get, "MAX_ROWS_REPLY", &mut detection.max_rows_reply);
    override_parsed(&get, "MAX_ROWS_CALL_ACT", &mut detection.max_rows_call_activities);
    if let Some(v) = get("PROVIDERS_MSG") {
        detection.providers_msg = split_list(&v);
    }
    if let Some(v) = get("PROVIDERS_TYPE") {
        detection.providers_type = split_list(&v);
    }
    if let Some(v) = get("ENTITY_TYPES") {
        detection.entity_types = split_list(&v);
    }

    if let Some(v) = get("TIMEZONE") {
        config.schedule.timezone = v;
    }
    override_parsed(&get, "SCHEDULE_HOUR", &mut config.schedule.hour);
    override_parsed(&get, "SCHEDULE_MINUTE", &mut config.schedule.minute);

    if let Some(v) = get("TELEGRAM_TOKEN") {
        config.telegram.token = secrecy::Secret::new(v);
    }
    if let Some(v) = get("TELEGRAM_CHAT_ID") {
        config.telegram.chat_id = v;
    }

    for name in OBSOLETE_ENV {
        if get(*name).is_some() {
            config.obsolete_env.push((*name).to_string());
        }
    }

    config
}

fn parse_env<T: std::str::FromStr>(get: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = get(name)?;
    match raw.parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(name, value = %raw, "ignoring unparsable environment override");
            None
        },
    }
}

fn override_parsed<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    name: &str,
    slot: &mut T,
) {
    if let Some(v) = parse_env(get, name) {
        *slot = v;
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_config(raw: &str, path: &Path) -> Result<ReplywatchConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => Err(Error::UnsupportedFormat {
            extension: ext.to_string(),
        }),
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use {super::*, secrecy::ExposeSecret, std::collections::HashMap};

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn load_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replywatch.toml");
        std::fs::write(
            &path,
            "[schedule]\nhour = 9\nminute = 30\ntimezone = \"Europe/Berlin\"\n",
        )
        .unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.schedule.hour, 9);
        assert_eq!(cfg.schedule.minute, 30);
        assert_eq!(cfg.schedule.timezone, "Europe/Berlin");
    }

    #[test]
    fn load_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replywatch.yaml");
        std::fs::write(&path, "detection:\n  window_days: 7\n").unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.detection.window_days, 7);
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replywatch.ini");
        std::fs::write(&path, "").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat { .. }));
    }

    #[test]
    fn missing_file_mentions_path() {
        let err = load_config(Path::new("/nonexistent/replywatch.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/replywatch.toml"));
    }

    #[test]
    fn legacy_env_overrides_file_values() {
        let cfg = apply_env_overrides_with(
            ReplywatchConfig::default(),
            env(&[
                ("B24_WEBHOOK", "https://p.bitrix24.ru/rest/1/x/"),
                ("HTTP_RETRY_SLEEP", "1.5"),
                ("RESPONSE_SLA_MIN", "60"),
                ("PROVIDERS_MSG", " crm_email, ,WAZZUP "),
                ("SCHEDULE_HOUR", "8"),
                ("TELEGRAM_CHAT_ID", "-100123"),
            ]),
        );
        assert_eq!(
            cfg.bitrix.webhook_url.expose_secret(),
            "https://p.bitrix24.ru/rest/1/x/"
        );
        assert_eq!(cfg.bitrix.retry_sleep_ms, 1500);
        assert_eq!(cfg.detection.response_sla_min, 60);
        assert_eq!(cfg.detection.providers_msg, vec!["crm_email", "WAZZUP"]);
        assert_eq!(cfg.schedule.hour, 8);
        assert_eq!(cfg.telegram.chat_id, "-100123");
    }

    #[test]
    fn unparsable_env_keeps_default() {
        let cfg = apply_env_overrides_with(
            ReplywatchConfig::default(),
            env(&[("WINDOW_DAYS", "two weeks"), ("HTTP_RETRY", "")]),
        );
        assert_eq!(cfg.detection.window_days, 14);
        assert_eq!(cfg.bitrix.retry, 2);
    }

    #[test]
    fn obsolete_env_is_recorded() {
        let cfg =
            apply_env_overrides_with(ReplywatchConfig::default(), env(&[("CRON_MINUTES", "15")]));
        assert_eq!(cfg.obsolete_env, vec!["CRON_MINUTES"]);
    }
}
