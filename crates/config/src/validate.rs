//! Configuration validation engine.
//!
//! Checks semantic constraints of a loaded [`ReplywatchConfig`] and, for
//! config files, detects unknown or misspelled keys.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use secrecy::ExposeSecret;

use crate::{env_subst::substitute_env, schema::ReplywatchConfig};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "value", "obsolete", "sink"
    pub category: &'static str,
    /// Dotted path, e.g. "schedule.hour"
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {}: {}",
            self.severity, self.category, self.path, self.message
        )
    }
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    fn push(
        &mut self,
        severity: Severity,
        category: &'static str,
        path: &str,
        message: impl Into<String>,
    ) {
        self.diagnostics.push(Diagnostic {
            severity,
            category,
            path: path.to_string(),
            message: message.into(),
        });
    }
}

/// Validate semantic constraints of an already-loaded config.
#[must_use]
pub fn validate(config: &ReplywatchConfig) -> ValidationResult {
    let mut result = ValidationResult::default();
    check_values(config, &mut result);
    result
}

/// Validate a config file: syntax, unknown keys, then semantic constraints.
#[must_use]
pub fn validate_file(path: &Path) -> ValidationResult {
    let mut result = ValidationResult {
        config_path: Some(path.to_path_buf()),
        ..Default::default()
    };

    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => substitute_env(&raw),
        Err(e) => {
            result.push(
                Severity::Error,
                "syntax",
                "",
                format!("failed to read {}: {e}", path.display()),
            );
            return result;
        },
    };

    let value = match parse_value(&raw, path) {
        Ok(v) => v,
        Err(message) => {
            result.push(Severity::Error, "syntax", "", message);
            return result;
        },
    };

    check_unknown_fields(&value, &schema_map(), "", &mut result);

    match serde_json::from_value::<ReplywatchConfig>(value) {
        Ok(config) => check_values(&crate::apply_env_overrides(config), &mut result),
        Err(e) => result.push(Severity::Error, "value", "", e.to_string()),
    }
    result
}

fn parse_value(raw: &str, path: &Path) -> Result<serde_json::Value, String> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");
    match ext {
        "toml" => toml::from_str::<toml::Value>(raw)
            .map_err(|e| e.to_string())
            .and_then(|v| serde_json::to_value(v).map_err(|e| e.to_string())),
        "yaml" | "yml" => serde_yaml::from_str::<serde_yaml::Value>(raw)
            .map_err(|e| e.to_string())
            .and_then(|v| serde_json::to_value(v).map_err(|e| e.to_string())),
        "json" => serde_json::from_str(raw).map_err(|e| e.to_string()),
        _ => Err(format!("unsupported config format: .{ext}")),
    }
}

// ── Semantic checks ─────────────────────────────────────────────────────────

fn check_values(config: &ReplywatchConfig, result: &mut ValidationResult) {
    if !config.bitrix.has_webhook() {
        result.push(
            Severity::Error,
            "value",
            "bitrix.webhook_url",
            "webhook URL is empty (set it in the config file or B24_WEBHOOK)",
        );
    } else if !config
        .bitrix
        .webhook_url
        .expose_secret()
        .starts_with("http")
    {
        result.push(
            Severity::Error,
            "value",
            "bitrix.webhook_url",
            "webhook URL must start with http:// or https://",
        );
    }

    if config.bitrix.http_timeout_secs <= 0.0 {
        result.push(
            Severity::Error,
            "value",
            "bitrix.http_timeout_secs",
            "timeout must be positive",
        );
    }

    let detection = &config.detection;
    if detection.window_days == 0 {
        result.push(
            Severity::Error,
            "value",
            "detection.window_days",
            "window must be at least one day",
        );
    }
    if detection.response_sla_min == 0 {
        result.push(
            Severity::Warning,
            "value",
            "detection.response_sla_min",
            "SLA of zero minutes flags every unanswered message immediately",
        );
    }
    if detection.providers_msg.is_empty() && detection.providers_type.is_empty() {
        result.push(
            Severity::Error,
            "value",
            "detection.providers_msg",
            "no message providers configured, nothing can be detected",
        );
    }
    if detection.entity_types.is_empty() {
        result.push(
            Severity::Error,
            "value",
            "detection.entity_types",
            "no tracked entity types configured",
        );
    }

    let schedule = &config.schedule;
    if schedule.hour > 23 {
        result.push(
            Severity::Error,
            "value",
            "schedule.hour",
            format!("hour {} is out of range 0..=23", schedule.hour),
        );
    }
    if schedule.minute > 59 {
        result.push(
            Severity::Error,
            "value",
            "schedule.minute",
            format!("minute {} is out of range 0..=59", schedule.minute),
        );
    }
    if schedule.timezone.parse::<chrono_tz::Tz>().is_err() {
        result.push(
            Severity::Error,
            "value",
            "schedule.timezone",
            format!("unknown timezone: {}", schedule.timezone),
        );
    }
    if let Some(expr) = &schedule.cron
        && !is_valid_cron(expr)
    {
        result.push(
            Severity::Error,
            "value",
            "schedule.cron",
            format!("invalid cron expression: {expr}"),
        );
    }

    if config.digest.max_items == 0 {
        result.push(
            Severity::Error,
            "value",
            "digest.max_items",
            "digest must list at least one item",
        );
    }

    if !config.telegram.is_configured() {
        result.push(
            Severity::Warning,
            "sink",
            "telegram",
            "token or chat_id is empty, digests will not be delivered",
        );
    }

    for name in &config.obsolete_env {
        result.push(
            Severity::Warning,
            "obsolete",
            name,
            "no longer used, set schedule.hour/schedule.minute instead",
        );
    }
}

fn is_valid_cron(expr: &str) -> bool {
    expr.parse::<cron::Schedule>().is_ok() || format!("0 {expr} *").parse::<cron::Schedule>().is_ok()
}

// ── Schema tree for unknown-field detection ─────────────────────────────────

/// Expected shape of the configuration file.
enum KnownKeys {
    Struct(HashMap<&'static str, KnownKeys>),
    Leaf,
}

fn schema_map() -> KnownKeys {
    use KnownKeys::{Leaf, Struct};

    let leaves = |keys: &[&'static str]| Struct(keys.iter().map(|k| (*k, Leaf)).collect());

    Struct(HashMap::from([
        ("server", leaves(&["bind", "port"])),
        (
            "bitrix",
            leaves(&[
                "webhook_url",
                "http_timeout_secs",
                "retry",
                "retry_sleep_ms",
            ]),
        ),
        (
            "detection",
            leaves(&[
                "window_days",
                "response_sla_min",
                "max_rows_incoming",
                "max_rows_reply",
                "max_rows_call_activities",
                "providers_msg",
                "providers_type",
                "entity_types",
            ]),
        ),
        (
            "schedule",
            leaves(&["enabled", "timezone", "hour", "minute", "cron"]),
        ),
        ("telegram", leaves(&["token", "chat_id", "api_url"])),
        ("digest", leaves(&["portal_url", "max_items"])),
        ("metrics", leaves(&["enabled", "prometheus_endpoint"])),
    ]))
}

fn check_unknown_fields(
    value: &serde_json::Value,
    known: &KnownKeys,
    prefix: &str,
    result: &mut ValidationResult,
) {
    let (KnownKeys::Struct(fields), serde_json::Value::Object(map)) = (known, value) else {
        return;
    };
    for (key, child) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match fields.get(key.as_str()) {
            Some(expected) => check_unknown_fields(child, expected, &path, result),
            None => {
                let hint = closest_key(key, fields.keys().copied())
                    .map(|k| format!(" (did you mean \"{k}\"?)"))
                    .unwrap_or_default();
                result.push(
                    Severity::Warning,
                    "unknown-field",
                    &path,
                    format!("unknown field{hint}"),
                );
            },
        }
    }
}

/// Suggest a known key within edit distance 2.
fn closest_key<'a>(key: &str, candidates: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    candidates
        .map(|c| (levenshtein(key, c), c))
        .filter(|(d, _)| *d <= 2)
        .min_by_key(|(d, _)| *d)
        .map(|(_, c)| c)
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut cur = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            cur[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        prev = cur;
    }
    prev[b.len()]
}
