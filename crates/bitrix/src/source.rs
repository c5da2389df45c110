use async_trait::async_trait;

use crate::{
    client::BitrixClient,
    error::Result,
    query::{ActivityQuery, CallQuery},
    types::{Activity, CallRecord, DialogHistory},
};

/// Read access to the CRM data the detector needs.
///
/// Implemented by [`BitrixClient`]; tests substitute in-memory fakes.
#[async_trait]
pub trait CrmSource: Send + Sync {
    async fn list_activities(&self, query: &ActivityQuery) -> Result<Vec<Activity>>;

    async fn list_calls_since(&self, query: &CallQuery) -> Result<Vec<CallRecord>>;

    /// Newest-first messages of an open-lines dialog.
    async fn last_dialog_messages(&self, dialog_id: &str, limit: u32) -> Result<DialogHistory>;
}

#[async_trait]
impl CrmSource for BitrixClient {
    async fn list_activities(&self, query: &ActivityQuery) -> Result<Vec<Activity>> {
        BitrixClient::list_activities(self, query).await
    }

    async fn list_calls_since(&self, query: &CallQuery) -> Result<Vec<CallRecord>> {
        BitrixClient::list_calls_since(self, query).await
    }

    async fn last_dialog_messages(&self, dialog_id: &str, limit: u32) -> Result<DialogHistory> {
        BitrixClient::last_dialog_messages(self, dialog_id, limit).await
    }
}
