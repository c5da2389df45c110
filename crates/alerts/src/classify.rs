//! Channel and owner classification of CRM activities.

use std::collections::HashSet;

use {
    replywatch_bitrix::{Activity, Communication},
    replywatch_config::DetectionConfig,
};

const OPENLINES_SESSION_PROVIDER: &str = "IMOPENLINES_SESSION";
const OPENLINES_SESSION_TYPE: &str = "15";
const DIALOG_ID_PREFIX: &str = "imol|";

fn normalize(tag: &str) -> String {
    tag.trim().to_uppercase()
}

fn tag_set<I, S>(tags: I) -> HashSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|t| normalize(t.as_ref()))
        .filter(|t| !t.is_empty())
        .collect()
}

/// Which activities count as correspondence and which owners are tracked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelFilter {
    providers_msg: HashSet<String>,
    providers_type: HashSet<String>,
    entity_types: HashSet<String>,
}

impl ChannelFilter {
    pub fn new<I, S>(providers_msg: I, providers_type: I, entity_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            providers_msg: tag_set(providers_msg),
            providers_type: tag_set(providers_type),
            entity_types: tag_set(entity_types),
        }
    }

    #[must_use]
    pub fn from_config(config: &DetectionConfig) -> Self {
        Self::new(
            &config.providers_msg,
            &config.providers_type,
            &config.entity_types,
        )
    }

    /// Provider id or provider type marks the activity as a chat or mail
    /// message rather than a call, task or meeting.
    #[must_use]
    pub fn is_message_activity(&self, activity: &Activity) -> bool {
        let by_id = activity
            .provider_id
            .as_deref()
            .map(normalize)
            .is_some_and(|p| !p.is_empty() && self.providers_msg.contains(&p));
        let by_type = activity
            .provider_type_id
            .as_deref()
            .map(normalize)
            .is_some_and(|t| !t.is_empty() && self.providers_type.contains(&t));
        by_id || by_type
    }

    #[must_use]
    pub fn is_tracked_owner(&self, activity: &Activity) -> bool {
        activity
            .owner_type_id
            .as_deref()
            .is_some_and(|t| self.entity_types.contains(&normalize(t)))
    }
}

impl Default for ChannelFilter {
    fn default() -> Self {
        Self::from_config(&DetectionConfig::default())
    }
}

/// Open-lines session activities carry the chat dialog in their
/// communications.
#[must_use]
pub fn is_openlines_session(activity: &Activity) -> bool {
    activity
        .provider_id
        .as_deref()
        .is_some_and(|p| normalize(p) == OPENLINES_SESSION_PROVIDER)
        || activity
            .provider_type_id
            .as_deref()
            .is_some_and(|t| normalize(t) == OPENLINES_SESSION_TYPE)
}

/// First `IM` communication holding an open-lines dialog id
/// (`imol|<connector>|<line>|<uuid>|<session>`).
#[must_use]
pub fn extract_dialog_id(communications: &[Communication]) -> Option<&str> {
    communications
        .iter()
        .filter(|c| c.r#type.as_deref() == Some("IM"))
        .filter_map(|c| c.value.as_deref())
        .find(|v| v.starts_with(DIALOG_ID_PREFIX))
}

/// Value of the first communication, used as the phone hint for call
/// lookups.
#[must_use]
pub fn first_phone(communications: &[Communication]) -> Option<&str> {
    communications
        .first()
        .and_then(|c| c.value.as_deref())
        .filter(|v| !v.is_empty())
}
