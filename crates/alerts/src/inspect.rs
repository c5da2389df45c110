//! Read-only views over recent activities, for tuning the channel filter.

use std::{collections::HashMap, sync::Arc};

use {
    chrono::{DateTime, TimeDelta, Utc},
    replywatch_bitrix::{Activity, ActivityQuery, CrmSource, SortOrder, query::direction},
    serde::Serialize,
};

use crate::{detector::iso_utc, error::Result};

const EMPTY_TAG: &str = "(empty)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderIdCount {
    #[serde(rename = "PROVIDER_ID")]
    pub provider_id: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderTypeCount {
    #[serde(rename = "PROVIDER_TYPE_ID")]
    pub provider_type_id: String,
    pub count: usize,
}

/// Inbound activity counts per channel tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvidersSummary {
    pub total_sampled: usize,
    #[serde(rename = "by_PROVIDER_ID")]
    pub by_provider_id: Vec<ProviderIdCount>,
    #[serde(rename = "by_PROVIDER_TYPE_ID")]
    pub by_provider_type_id: Vec<ProviderTypeCount>,
}

/// Count tags, most frequent first; ties keep first-seen order.
fn most_common<'a>(tags: impl Iterator<Item = Option<&'a str>>) -> Vec<(String, usize)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut counts: Vec<(String, usize)> = Vec::new();
    for tag in tags {
        let tag = tag.map(str::to_uppercase).unwrap_or_default();
        let tag = if tag.is_empty() {
            EMPTY_TAG.to_string()
        } else {
            tag
        };
        match index.get(&tag) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(tag.clone(), counts.len());
                counts.push((tag, 1));
            },
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

pub struct Inspector {
    crm: Arc<dyn CrmSource>,
}

impl Inspector {
    pub fn new(crm: Arc<dyn CrmSource>) -> Self {
        Self { crm }
    }

    fn since(days: u32) -> String {
        let from: DateTime<Utc> = Utc::now() - TimeDelta::days(i64::from(days));
        iso_utc(from)
    }

    /// Inbound activities of the last `days`, newest first.
    pub async fn last_incomings(&self, days: u32, limit: usize) -> Result<Vec<Activity>> {
        let query = ActivityQuery::new()
            .filter("DIRECTION", direction::INCOMING)
            .filter(">=CREATED", Self::since(days))
            .order_by("CREATED", SortOrder::Desc)
            .select(&[
                "ID",
                "CREATED",
                "PROVIDER_ID",
                "PROVIDER_TYPE_ID",
                "DIRECTION",
                "OWNER_TYPE_ID",
                "OWNER_ID",
                "COMMUNICATIONS",
                "AUTHOR_ID",
                "SUBJECT",
            ])
            .max_rows(limit);
        Ok(self.crm.list_activities(&query).await?)
    }

    pub async fn providers_summary(&self, days: u32, limit: usize) -> Result<ProvidersSummary> {
        let query = ActivityQuery::new()
            .filter("DIRECTION", direction::INCOMING)
            .filter(">=CREATED", Self::since(days))
            .order_by("CREATED", SortOrder::Desc)
            .select(&["PROVIDER_ID", "PROVIDER_TYPE_ID"])
            .max_rows(limit);
        let rows = self.crm.list_activities(&query).await?;

        Ok(ProvidersSummary {
            total_sampled: rows.len(),
            by_provider_id: most_common(rows.iter().map(|r| r.provider_id.as_deref()))
                .into_iter()
                .map(|(provider_id, count)| ProviderIdCount { provider_id, count })
                .collect(),
            by_provider_type_id: most_common(rows.iter().map(|r| r.provider_type_id.as_deref()))
                .into_iter()
                .map(|(provider_type_id, count)| ProviderTypeCount {
                    provider_type_id,
                    count,
                })
                .collect(),
        })
    }

    /// Every activity on one CRM record, newest first.
    pub async fn activities_by_entity(
        &self,
        owner_type_id: i64,
        owner_id: i64,
        days: u32,
        limit: usize,
    ) -> Result<Vec<Activity>> {
        let query = ActivityQuery::new()
            .filter("OWNER_TYPE_ID", owner_type_id)
            .filter("OWNER_ID", owner_id)
            .filter(">=CREATED", Self::since(days))
            .order_by("CREATED", SortOrder::Desc)
            .select(&[
                "ID",
                "CREATED",
                "TYPE_ID",
                "PROVIDER_ID",
                "PROVIDER_TYPE_ID",
                "DIRECTION",
                "SUBJECT",
                "COMPLETED",
                "AUTHOR_ID",
            ])
            .max_rows(limit);
        Ok(self.crm.list_activities(&query).await?)
    }
}
