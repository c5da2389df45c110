//! Request builders for list methods.

use serde_json::{Map, Value, json};

/// `DIRECTION` codes of `crm.activity.list`.
pub mod direction {
    pub const OUTGOING: i64 = 1;
    pub const INCOMING: i64 = 2;
}

/// `PROVIDER_ID` values that denote telephony activities.
pub const CALL_PROVIDERS: [&str; 2] = ["VOXIMPLANT_CALL", "CALL"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Parameters of a `crm.activity.list` request.
///
/// Filter keys use Bitrix operator prefixes verbatim (`">=CREATED"`,
/// `">CREATED"`); an array value means "any of".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityQuery {
    pub filter: Map<String, Value>,
    pub order: Map<String, Value>,
    pub select: Vec<String>,
    /// Stop paging once this many rows are collected.
    pub max_rows: Option<usize>,
}

impl ActivityQuery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn filter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.order.insert(field.into(), Value::from(order.as_str()));
        self
    }

    #[must_use]
    pub fn select(mut self, fields: &[&str]) -> Self {
        self.select = fields.iter().map(|f| (*f).to_string()).collect();
        self
    }

    #[must_use]
    pub fn max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = Some(max_rows);
        self
    }

    /// Request body for the page starting at `start`.
    #[must_use]
    pub fn payload(&self, start: u64) -> Value {
        json!({
            "filter": self.filter,
            "order": self.order,
            "select": self.select,
            "start": start,
        })
    }
}

/// Parameters of a call-log lookup across all call sources.
#[derive(Debug, Clone, PartialEq)]
pub struct CallQuery {
    /// ISO-8601 lower bound on the call start.
    pub since: String,
    pub entity_type_id: Option<i64>,
    pub entity_id: Option<i64>,
    pub phone: Option<String>,
    pub max_rows: Option<usize>,
}

impl CallQuery {
    pub const DEFAULT_MAX_ROWS: usize = 2000;
    /// Row cap used by the activity fallback when no positive cap is set.
    pub const ACTIVITY_FALLBACK_MAX_ROWS: usize = 500;

    #[must_use]
    pub fn since(since: impl Into<String>) -> Self {
        Self {
            since: since.into(),
            entity_type_id: None,
            entity_id: None,
            phone: None,
            max_rows: Some(Self::DEFAULT_MAX_ROWS),
        }
    }

    #[must_use]
    pub fn entity(mut self, entity_type_id: i64, entity_id: i64) -> Self {
        self.entity_type_id = Some(entity_type_id);
        self.entity_id = Some(entity_id);
        self
    }

    #[must_use]
    pub fn phone(mut self, phone: Option<String>) -> Self {
        self.phone = phone.filter(|p| !p.trim().is_empty());
        self
    }

    #[must_use]
    pub fn max_rows(mut self, max_rows: Option<usize>) -> Self {
        self.max_rows = max_rows;
        self
    }

    /// Request body for a statistics method page.
    #[must_use]
    pub(crate) fn statistic_payload(&self, start: u64) -> Value {
        let mut filter = Map::new();
        filter.insert(">=CALL_START_DATE".into(), Value::from(self.since.as_str()));
        if let Some(phone) = &self.phone {
            filter.insert("PHONE_NUMBER".into(), Value::from(phone.as_str()));
        }
        json!({
            "FILTER": filter,
            "ORDER": {"CALL_START_DATE": "ASC"},
            "START": start,
        })
    }

    /// Whether a statistics row may belong to the requested entity.
    ///
    /// Rows without entity information are kept; only a present, different
    /// value excludes a row.
    #[must_use]
    pub(crate) fn matches_entity(&self, entity_type: Option<&str>, entity_id: Option<&str>) -> bool {
        let differs = |wanted: Option<i64>, got: Option<&str>| match (wanted, got) {
            (Some(w), Some(g)) if w != 0 => g != w.to_string(),
            _ => false,
        };
        !differs(self.entity_type_id, entity_type) && !differs(self.entity_id, entity_id)
    }

    /// `crm.activity.list` query used when no statistics source returns calls.
    #[must_use]
    pub(crate) fn activity_fallback(&self) -> ActivityQuery {
        let mut query = ActivityQuery::new()
            .filter(">CREATED", self.since.as_str())
            .filter("PROVIDER_ID", json!(CALL_PROVIDERS))
            .order_by("CREATED", SortOrder::Asc)
            .select(&[
                "ID",
                "CREATED",
                "PROVIDER_ID",
                "DIRECTION",
                "COMPLETED",
                "SETTINGS",
                "OWNER_TYPE_ID",
                "OWNER_ID",
            ])
            .max_rows(
                self.max_rows
                    .filter(|n| *n > 0)
                    .unwrap_or(Self::ACTIVITY_FALLBACK_MAX_ROWS),
            );
        if let Some(t) = self.entity_type_id {
            query = query.filter("OWNER_TYPE_ID", t);
        }
        if let Some(id) = self.entity_id {
            query = query.filter("OWNER_ID", id);
        }
        query
    }
}
