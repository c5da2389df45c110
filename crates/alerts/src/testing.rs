//! In-memory [`CrmSource`] for detector, scan and inspection tests.

use std::{collections::HashMap, sync::Mutex};

use {
    async_trait::async_trait,
    replywatch_bitrix::{
        Activity, ActivityQuery, CallQuery, CallRecord, Communication, CrmSource, DialogHistory,
        Error, Result,
    },
    serde_json::Value,
};

type OwnerKey = (i64, i64);

/// Canned CRM answers, routed by the shape of each request.
#[derive(Default)]
pub(crate) struct FakeCrm {
    /// `DIRECTION = 2` listings.
    pub incoming: Vec<Activity>,
    /// `DIRECTION = 1` listings per owner.
    pub replies: HashMap<OwnerKey, Vec<Activity>>,
    /// Call-activity listings (`PROVIDER_ID` filter) per owner.
    pub call_activities: HashMap<OwnerKey, Vec<Activity>>,
    /// Any other per-owner listing.
    pub by_entity: HashMap<OwnerKey, Vec<Activity>>,
    pub calls: HashMap<OwnerKey, Vec<CallRecord>>,
    pub dialogs: HashMap<String, DialogHistory>,
    pub fail_incoming: bool,
    pub fail_replies: bool,
    pub fail_calls: bool,
    pub fail_dialogs: bool,
    activity_log: Mutex<Vec<ActivityQuery>>,
    call_log: Mutex<Vec<CallQuery>>,
}

impl FakeCrm {
    pub fn activity_queries(&self) -> Vec<ActivityQuery> {
        self.activity_log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn call_queries(&self) -> Vec<CallQuery> {
        self.call_log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

fn owner_of(query: &ActivityQuery) -> Option<OwnerKey> {
    Some((
        query.filter.get("OWNER_TYPE_ID")?.as_i64()?,
        query.filter.get("OWNER_ID")?.as_i64()?,
    ))
}

fn truncated(mut rows: Vec<Activity>, max_rows: Option<usize>) -> Vec<Activity> {
    if let Some(max) = max_rows {
        rows.truncate(max);
    }
    rows
}

#[async_trait]
impl CrmSource for FakeCrm {
    async fn list_activities(&self, query: &ActivityQuery) -> Result<Vec<Activity>> {
        self.activity_log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(query.clone());

        let direction = query.filter.get("DIRECTION").and_then(Value::as_i64);
        let owner = owner_of(query);
        let rows = match (direction, owner) {
            (Some(2), _) if self.fail_incoming => {
                return Err(Error::Status {
                    status: 503,
                    method: "crm.activity.list".into(),
                });
            },
            (Some(2), _) => self.incoming.clone(),
            (Some(1), Some(_)) if self.fail_replies => {
                return Err(Error::Status {
                    status: 502,
                    method: "crm.activity.list".into(),
                });
            },
            (Some(1), Some(key)) => self.replies.get(&key).cloned().unwrap_or_default(),
            (_, Some(key)) if query.filter.contains_key("PROVIDER_ID") => {
                self.call_activities.get(&key).cloned().unwrap_or_default()
            },
            (_, Some(key)) => self.by_entity.get(&key).cloned().unwrap_or_default(),
            _ => Vec::new(),
        };
        Ok(truncated(rows, query.max_rows))
    }

    async fn list_calls_since(&self, query: &CallQuery) -> Result<Vec<CallRecord>> {
        self.call_log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(query.clone());
        if self.fail_calls {
            return Err(Error::Api {
                code: "QUERY_LIMIT_EXCEEDED".into(),
                description: "too many requests".into(),
            });
        }
        let key = query.entity_type_id.zip(query.entity_id);
        Ok(key
            .and_then(|k| self.calls.get(&k).cloned())
            .unwrap_or_default())
    }

    async fn last_dialog_messages(&self, dialog_id: &str, _limit: u32) -> Result<DialogHistory> {
        if self.fail_dialogs {
            return Err(Error::Api {
                code: "ACCESS_DENIED".into(),
                description: "no access to dialog".into(),
            });
        }
        Ok(self.dialogs.get(dialog_id).cloned().unwrap_or_default())
    }
}

/// An inbound message activity with an e-mail communication.
pub(crate) fn inbound(id: &str, owner_type: &str, owner_id: &str, created: &str, provider: &str) -> Activity {
    Activity {
        id: Some(id.into()),
        created: Some(created.into()),
        provider_id: Some(provider.into()),
        owner_type_id: Some(owner_type.into()),
        owner_id: Some(owner_id.into()),
        direction: Some("2".into()),
        communications: vec![Communication {
            r#type: Some("EMAIL".into()),
            value: Some("client@example.com".into()),
        }],
        ..Default::default()
    }
}

pub(crate) trait WithDialog {
    fn with_dialog(self, dialog_id: &str) -> Self;
}

impl WithDialog for Activity {
    fn with_dialog(mut self, dialog_id: &str) -> Self {
        self.communications.push(Communication {
            r#type: Some("IM".into()),
            value: Some(dialog_id.into()),
        });
        self
    }
}
