//! Unanswered-conversation detection.
//!
//! For every tracked CRM record with a recent inbound message the detector
//! looks for evidence that someone answered: an outbound message, an
//! operator message in the open-lines dialog, or a call. Records with none
//! of those after the SLA has elapsed become [`Alert`]s.

use std::sync::Arc;

use {
    chrono::{DateTime, SecondsFormat, TimeDelta, Utc},
    replywatch_bitrix::{
        Activity, ActivityQuery, CallQuery, CrmSource, SortOrder,
        query::{CALL_PROVIDERS, direction},
    },
    replywatch_config::DetectionConfig,
    serde::{Deserialize, Serialize},
    serde_json::json,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use replywatch_metrics::{counter, scan as scan_metrics};

use crate::{
    classify::{ChannelFilter, extract_dialog_id, first_phone, is_openlines_session},
    error::Result,
    sender::{LastSender, classify_last_sender},
};

const INCOMING_FIELDS: &[&str] = &[
    "ID",
    "CREATED",
    "PROVIDER_ID",
    "PROVIDER_TYPE_ID",
    "SUBJECT",
    "OWNER_TYPE_ID",
    "OWNER_ID",
    "COMMUNICATIONS",
    "AUTHOR_ID",
    "DESCRIPTION",
];
const REPLY_FIELDS: &[&str] = &["ID", "CREATED", "PROVIDER_ID", "PROVIDER_TYPE_ID", "AUTHOR_ID"];
const CALL_ACTIVITY_FIELDS: &[&str] = &[
    "ID",
    "CREATED",
    "PROVIDER_ID",
    "DIRECTION",
    "COMPLETED",
    "SETTINGS",
];

/// A CRM record whose latest inbound message went unanswered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub owner_type_id: String,
    pub owner_id: String,
    /// `CREATED` of the inbound activity as the portal returned it.
    pub last_in_created: String,
    pub provider_id: Option<String>,
    pub phone: Option<String>,
    pub activity_id: Option<String>,
    pub subject: String,
}

/// Numeric thresholds of a detection pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionSettings {
    pub window: TimeDelta,
    pub response_sla: TimeDelta,
    pub max_rows_incoming: usize,
    pub max_rows_reply: usize,
    pub max_rows_call_activities: usize,
}

impl From<&DetectionConfig> for DetectionSettings {
    fn from(config: &DetectionConfig) -> Self {
        Self {
            window: TimeDelta::days(i64::from(config.window_days)),
            response_sla: TimeDelta::minutes(i64::from(config.response_sla_min)),
            max_rows_incoming: config.max_rows_incoming,
            max_rows_reply: config.max_rows_reply,
            max_rows_call_activities: config.max_rows_call_activities,
        }
    }
}

/// UTC timestamp in the form the CRM filters expect.
#[must_use]
pub fn iso_utc(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Parse an activity `CREATED`; a missing value reads as `now`.
fn parse_created(raw: Option<&str>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Some(now),
        Some(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
    }
}

/// Keep the first row per owner. Input is newest-first, so the first row is
/// the latest one; owners keep the order they were first seen in.
fn latest_per_owner(rows: Vec<Activity>) -> Vec<Activity> {
    let mut seen = std::collections::HashSet::new();
    rows.into_iter()
        .filter(|a| {
            a.owner()
                .is_some_and(|(t, id)| seen.insert((t.to_string(), id.to_string())))
        })
        .collect()
}

pub struct Detector {
    crm: Arc<dyn CrmSource>,
    filter: ChannelFilter,
    settings: DetectionSettings,
}

impl Detector {
    pub fn new(crm: Arc<dyn CrmSource>, config: &DetectionConfig) -> Self {
        Self {
            crm,
            filter: ChannelFilter::from_config(config),
            settings: DetectionSettings::from(config),
        }
    }

    #[must_use]
    pub fn filter(&self) -> &ChannelFilter {
        &self.filter
    }

    #[must_use]
    pub fn settings(&self) -> &DetectionSettings {
        &self.settings
    }

    pub async fn detect(&self) -> Result<Vec<Alert>> {
        self.detect_at(Utc::now()).await
    }

    /// Run one detection pass as of `now`.
    pub async fn detect_at(&self, now: DateTime<Utc>) -> Result<Vec<Alert>> {
        let incoming = self.fetch_recent_incoming(now).await?;
        let latest = latest_per_owner(incoming);
        debug!(owners = latest.len(), "checking latest inbound message per owner");

        #[cfg(feature = "metrics")]
        counter!(scan_metrics::OWNERS_CHECKED_TOTAL).increment(latest.len() as u64);

        let mut alerts = Vec::new();
        for last in &latest {
            if let Some(alert) = self.check_owner(last, now).await? {
                alerts.push(alert);
            }
        }

        info!(owners = latest.len(), alerts = alerts.len(), "detection finished");
        Ok(alerts)
    }

    /// Inbound correspondence on tracked owners within the window,
    /// newest first.
    async fn fetch_recent_incoming(&self, now: DateTime<Utc>) -> Result<Vec<Activity>> {
        let query = ActivityQuery::new()
            .filter(">=CREATED", iso_utc(now - self.settings.window))
            .filter("DIRECTION", direction::INCOMING)
            .order_by("CREATED", SortOrder::Desc)
            .select(INCOMING_FIELDS)
            .max_rows(self.settings.max_rows_incoming);
        let rows = self.crm.list_activities(&query).await?;
        let fetched = rows.len();
        let rows: Vec<_> = rows
            .into_iter()
            .filter(|a| self.filter.is_tracked_owner(a) && self.filter.is_message_activity(a))
            .collect();
        debug!(fetched, kept = rows.len(), "inbound activities loaded");
        Ok(rows)
    }

    async fn check_owner(&self, last: &Activity, now: DateTime<Utc>) -> Result<Option<Alert>> {
        let Some((owner_type, owner_id)) = last.owner() else {
            return Ok(None);
        };
        let (Ok(type_num), Ok(id_num)) = (owner_type.parse::<i64>(), owner_id.parse::<i64>())
        else {
            warn!(owner_type_id = owner_type, owner_id, "non-numeric owner, skipping");
            return Ok(None);
        };

        let Some(created) = parse_created(last.created.as_deref(), now) else {
            warn!(
                owner_type_id = owner_type,
                owner_id,
                created = last.created.as_deref().unwrap_or_default(),
                "unparseable CREATED, skipping owner"
            );
            return Ok(None);
        };
        if now - created < self.settings.response_sla {
            return Ok(None);
        }
        let since = iso_utc(created);

        if self.has_outgoing_reply_after(type_num, id_num, &since).await? {
            debug!(owner_type_id = owner_type, owner_id, "answered by outbound message");
            return Ok(None);
        }

        if let Some(dialog_id) = extract_dialog_id(&last.communications) {
            debug!(
                owner_type_id = owner_type,
                owner_id,
                dialog_id,
                openlines_session = is_openlines_session(last),
                "checking last dialog sender"
            );
            match self.last_sender(dialog_id).await {
                Ok(LastSender::Operator) => {
                    debug!(owner_type_id = owner_type, owner_id, "operator wrote last in dialog");
                    return Ok(None);
                },
                Ok(_) => {},
                Err(e) => {
                    warn!(dialog_id, error = %e, "dialog history unavailable, continuing with call checks");
                },
            }
        }

        let phone = first_phone(&last.communications);
        if self
            .has_successful_call_after(type_num, id_num, &since, phone)
            .await?
        {
            debug!(owner_type_id = owner_type, owner_id, "answered by call");
            return Ok(None);
        }

        Ok(Some(Alert {
            owner_type_id: owner_type.to_string(),
            owner_id: owner_id.to_string(),
            last_in_created: last.created.clone().unwrap_or_default(),
            provider_id: last.provider_id.clone(),
            phone: phone.map(String::from),
            activity_id: last.id.clone(),
            subject: last.subject.clone().unwrap_or_default(),
        }))
    }

    /// An outbound message on the owner at or after `since`.
    async fn has_outgoing_reply_after(&self, owner_type: i64, owner_id: i64, since: &str) -> Result<bool> {
        let query = ActivityQuery::new()
            .filter("OWNER_TYPE_ID", owner_type)
            .filter("OWNER_ID", owner_id)
            .filter(">=CREATED", since)
            .filter("DIRECTION", direction::OUTGOING)
            .order_by("CREATED", SortOrder::Asc)
            .select(REPLY_FIELDS)
            .max_rows(self.settings.max_rows_reply);
        let rows = self.crm.list_activities(&query).await?;
        Ok(rows.iter().any(|a| self.filter.is_message_activity(a)))
    }

    async fn last_sender(&self, dialog_id: &str) -> Result<LastSender> {
        let history = self.crm.last_dialog_messages(dialog_id, 1).await?;
        Ok(history
            .messages
            .first()
            .map_or(LastSender::Unknown, |m| classify_last_sender(m, &history.users)))
    }

    /// A call that was not marked failed, from the call log or from call
    /// activities on the owner.
    async fn has_successful_call_after(
        &self,
        owner_type: i64,
        owner_id: i64,
        since: &str,
        phone: Option<&str>,
    ) -> Result<bool> {
        let calls = self
            .crm
            .list_calls_since(
                &CallQuery::since(since)
                    .entity(owner_type, owner_id)
                    .phone(phone.map(String::from)),
            )
            .await?;
        if calls.iter().any(|c| !c.is_failed()) {
            return Ok(true);
        }

        let query = ActivityQuery::new()
            .filter("OWNER_TYPE_ID", owner_type)
            .filter("OWNER_ID", owner_id)
            .filter(">CREATED", since)
            .filter("PROVIDER_ID", json!(CALL_PROVIDERS))
            .order_by("CREATED", SortOrder::Asc)
            .select(CALL_ACTIVITY_FIELDS)
            .max_rows(self.settings.max_rows_call_activities);
        let rows = self.crm.list_activities(&query).await?;
        Ok(rows.iter().any(|a| {
            a.is_completed() || matches!(a.direction.as_deref(), Some("1") | Some("2"))
        }))
    }
}
