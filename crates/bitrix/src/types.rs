//! Records returned by the CRM, normalized from their loose wire shape.

use std::collections::HashMap;

use {
    serde::{Deserialize, Deserializer, Serialize},
    serde_json::{Map, Value},
};

use crate::lenient;

/// Contact channel attached to an activity (`COMMUNICATIONS[]`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Communication {
    /// `PHONE`, `EMAIL`, `IM`, ...
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub r#type: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub value: Option<String>,
}

/// A `crm.activity.list` row.
///
/// Only the fields the service reasons about are typed; anything else the
/// portal sends is kept in `extra` so debug views can echo it back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Activity {
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub provider_type_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub owner_type_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    /// `1` outgoing, `2` incoming.
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub completed: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub type_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient::vec_skip_invalid", skip_serializing_if = "Vec::is_empty")]
    pub communications: Vec<Communication>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Activity {
    /// `(OWNER_TYPE_ID, OWNER_ID)` when both are present.
    #[must_use]
    pub fn owner(&self) -> Option<(&str, &str)> {
        Some((self.owner_type_id.as_deref()?, self.owner_id.as_deref()?))
    }

    /// `COMPLETED == "Y"`.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case("Y"))
    }
}

/// Where a [`CallRecord`] came from, in fallback order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallSource {
    #[serde(rename = "voximplant.statistic.get")]
    Voximplant,
    #[serde(rename = "telephony.statistic.get")]
    Telephony,
    #[serde(rename = "crm.activity.list")]
    Activity,
}

impl CallSource {
    /// The REST method this source is read from.
    #[must_use]
    pub fn method(self) -> &'static str {
        match self {
            Self::Voximplant => "voximplant.statistic.get",
            Self::Telephony => "telephony.statistic.get",
            Self::Activity => "crm.activity.list",
        }
    }
}

impl std::fmt::Display for CallSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.method())
    }
}

/// A call from any of the call-log sources, normalized to one shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallRecord {
    pub source: CallSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    /// `Y` when the statistics row reports a failed call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_failed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<String>,
}

impl CallRecord {
    /// Only an explicit `CALL_FAILED = Y` marks a call as failed; rows from
    /// the activity fallback never carry the flag.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.call_failed
            .as_deref()
            .is_some_and(|f| f.eq_ignore_ascii_case("Y"))
    }

    pub(crate) fn from_statistic(source: CallSource, row: StatisticRow) -> Self {
        Self {
            source,
            call_id: row.call_id,
            call_failed: row.call_failed,
            entity_type: row.crm_entity_type.or(row.entity_type),
            entity_id: row.crm_entity_id.or(row.entity_id),
            phone_number: row.phone_number,
            started_at: row.call_start_date,
            provider_id: None,
            direction: None,
            completed: None,
        }
    }

    pub(crate) fn from_activity(activity: Activity) -> Self {
        Self {
            source: CallSource::Activity,
            call_id: activity.id,
            call_failed: None,
            entity_type: activity.owner_type_id,
            entity_id: activity.owner_id,
            phone_number: None,
            started_at: activity.created,
            provider_id: activity.provider_id,
            direction: activity.direction,
            completed: activity.completed,
        }
    }
}

/// Row of `voximplant.statistic.get` / `telephony.statistic.get`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) struct StatisticRow {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    call_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    call_failed: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    crm_entity_type: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    entity_type: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    crm_entity_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    entity_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    phone_number: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    call_start_date: Option<String>,
}

/// A chat message from `im.dialog.messages.get`.
///
/// Portals disagree on casing and on which author fields exist, so the
/// upper-case spellings are accepted as aliases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DialogMessage {
    #[serde(default, alias = "ID", deserialize_with = "lenient::opt_i64")]
    pub id: Option<i64>,
    #[serde(default, alias = "AUTHOR_ID", deserialize_with = "lenient::opt_i64")]
    pub author_id: Option<i64>,
    #[serde(default, alias = "AUTHOR_TYPE", deserialize_with = "lenient::opt_string")]
    pub author_type: Option<String>,
    #[serde(default, alias = "SOURCE", deserialize_with = "lenient::opt_string")]
    pub source: Option<String>,
    #[serde(default, alias = "USER_SOURCE", deserialize_with = "lenient::opt_string")]
    pub user_source: Option<String>,
    #[serde(default, alias = "TEXT", deserialize_with = "lenient::opt_string")]
    pub text: Option<String>,
    #[serde(default, alias = "DATE", deserialize_with = "lenient::opt_string")]
    pub date: Option<String>,
}

/// A participant of a dialog as listed in the `users` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogUser {
    #[serde(deserialize_with = "required_i64")]
    pub id: i64,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub bot: bool,
    /// External client reached through an open-line connector.
    #[serde(default, deserialize_with = "lenient::flag")]
    pub connector: bool,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub extranet: bool,
}

fn required_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    lenient::opt_i64(deserializer)?.ok_or_else(|| serde::de::Error::custom("missing user id"))
}

/// Newest-first messages of a dialog plus its participants keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DialogHistory {
    #[serde(default, deserialize_with = "lenient::vec_skip_invalid")]
    pub messages: Vec<DialogMessage>,
    #[serde(default, deserialize_with = "users_by_id")]
    pub users: HashMap<i64, DialogUser>,
}

/// `users` arrives as a list on current portals and as an id-keyed object on
/// older ones.
fn users_by_id<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<HashMap<i64, DialogUser>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    let entries: Vec<Value> = match value {
        Some(Value::Array(items)) => items,
        Some(Value::Object(map)) => map.into_iter().map(|(_, v)| v).collect(),
        _ => Vec::new(),
    };
    Ok(entries
        .into_iter()
        .filter_map(|v| serde_json::from_value::<DialogUser>(v).ok())
        .map(|u| (u.id, u))
        .collect())
}
