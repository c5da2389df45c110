//! Telegram HTML rendering of detection results.

use replywatch_config::DigestConfig;

use crate::detector::Alert;

pub const NO_ALERTS: &str = "✅ No unanswered conversations right now.";
const HEADER: &str = "⚠️ Clients without a reply in chat and without a call";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestOptions {
    /// Portal base URL for record links; no links when unset.
    pub portal_url: Option<String>,
    pub max_items: usize,
}

impl Default for DigestOptions {
    fn default() -> Self {
        Self::from(&DigestConfig::default())
    }
}

impl From<&DigestConfig> for DigestOptions {
    fn from(config: &DigestConfig) -> Self {
        Self {
            portal_url: config
                .portal_url
                .as_deref()
                .map(|u| u.trim().trim_end_matches('/').to_string())
                .filter(|u| !u.is_empty()),
            max_items: config.max_items,
        }
    }
}

/// Escape text for Telegram's HTML parse mode.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn entity_label(owner_type_id: &str) -> String {
    match owner_type_id {
        "1" => "Lead".into(),
        "2" => "Contact".into(),
        "3" => "Company".into(),
        "4" => "Deal".into(),
        other => format!("Entity {}", escape_html(other)),
    }
}

fn render_alert(alert: &Alert, options: &DigestOptions) -> String {
    let title = format!(
        "{} #{}",
        entity_label(&alert.owner_type_id),
        escape_html(&alert.owner_id)
    );
    let title = match &options.portal_url {
        Some(portal) => format!(
            "<a href=\"{}/crm/entity/TYPE/{}/ID/{}\">{title}</a>",
            escape_html(portal),
            escape_html(&alert.owner_type_id),
            escape_html(&alert.owner_id),
        ),
        None => title,
    };

    let mut line = format!(
        "• {title} · inbound {} at {}",
        escape_html(alert.provider_id.as_deref().unwrap_or("?")),
        escape_html(&alert.last_in_created),
    );
    if let Some(phone) = alert.phone.as_deref().filter(|p| !p.is_empty()) {
        line.push_str(" · ");
        line.push_str(&escape_html(phone));
    }
    line
}

/// The digest message for a scan. An empty scan still produces a message.
#[must_use]
pub fn format_digest(alerts: &[Alert], options: &DigestOptions) -> String {
    if alerts.is_empty() {
        return NO_ALERTS.to_string();
    }

    let mut lines = Vec::with_capacity(alerts.len().min(options.max_items) + 2);
    lines.push(format!("<b>{HEADER}</b>"));
    lines.extend(
        alerts
            .iter()
            .take(options.max_items)
            .map(|a| render_alert(a, options)),
    );
    if alerts.len() > options.max_items {
        lines.push(format!("... and {} more", alerts.len() - options.max_items));
    }
    lines.join("\n")
}

/// Notice sent instead of a digest when a scan fails.
#[must_use]
pub fn format_scan_error(error: &dyn std::fmt::Display) -> String {
    format!("❗️ Scan failed: {}", escape_html(&error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(owner_id: &str) -> Alert {
        Alert {
            owner_type_id: "2".into(),
            owner_id: owner_id.into(),
            last_in_created: "2024-05-10T12:00:00+03:00".into(),
            provider_id: Some("CRM_EMAIL".into()),
            phone: None,
            activity_id: Some("1".into()),
            subject: String::new(),
        }
    }

    #[test]
    fn empty_digest_says_so() {
        assert_eq!(format_digest(&[], &DigestOptions::default()), NO_ALERTS);
    }

    #[test]
    fn digest_lists_alerts_under_header() {
        let mut a = alert("77");
        a.phone = Some("+79990001122".into());
        let text = format_digest(&[a, alert("78")], &DigestOptions::default());
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("<b>"));
        assert_eq!(
            lines[1],
            "• Contact #77 · inbound CRM_EMAIL at 2024-05-10T12:00:00+03:00 · +79990001122"
        );
        assert_eq!(
            lines[2],
            "• Contact #78 · inbound CRM_EMAIL at 2024-05-10T12:00:00+03:00"
        );
    }

    #[test]
    fn digest_caps_items_and_counts_the_rest() {
        let alerts: Vec<_> = (0..53).map(|i| alert(&i.to_string())).collect();
        let text = format_digest(&alerts, &DigestOptions::default());
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 52);
        assert_eq!(lines[51], "... and 3 more");
    }

    #[test]
    fn digest_links_records_when_portal_is_known() {
        let options = DigestOptions::from(&DigestConfig {
            portal_url: Some("https://acme.bitrix24.ru/".into()),
            max_items: 50,
        });
        let text = format_digest(&[alert("77")], &options);
        assert!(text.contains(
            "<a href=\"https://acme.bitrix24.ru/crm/entity/TYPE/2/ID/77\">Contact #77</a>"
        ));
    }

    #[test]
    fn interpolated_values_are_escaped() {
        let mut a = alert("<77>");
        a.owner_type_id = "9&".into();
        a.provider_id = None;
        let text = format_digest(&[a], &DigestOptions::default());
        assert!(text.contains("Entity 9&amp; #&lt;77&gt; · inbound ? at"));
    }

    #[test]
    fn scan_error_is_escaped() {
        let text = format_scan_error(&"HTTP 502 for <crm.activity.list>");
        assert_eq!(text, "❗️ Scan failed: HTTP 502 for &lt;crm.activity.list&gt;");
    }
}
