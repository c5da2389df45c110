//! Call-log lookup across the telephony sources a portal may expose.
//!
//! Order of attempts:
//! 1. `voximplant.statistic.get`
//! 2. `telephony.statistic.get`
//! 3. `crm.activity.list` with call providers, when neither statistics
//!    source yields a row for the requested entity.

use tracing::{debug, warn};

#[cfg(feature = "metrics")]
use replywatch_metrics::{bitrix as bitrix_metrics, counter, labels};

use crate::{
    client::BitrixClient,
    error::{Error, Result},
    query::CallQuery,
    types::{CallRecord, CallSource, StatisticRow},
};

const STATISTIC_SOURCES: [CallSource; 2] = [CallSource::Voximplant, CallSource::Telephony];

impl BitrixClient {
    /// Calls since `query.since`, from the first source that answers.
    ///
    /// A failing statistics method is treated as unavailable and the next one
    /// is tried. Only a failure of the final activity fallback is returned as
    /// an error.
    pub async fn list_calls_since(&self, query: &CallQuery) -> Result<Vec<CallRecord>> {
        let mut calls = Vec::new();
        for source in STATISTIC_SOURCES {
            match self.statistic_calls(source, query).await {
                Ok(rows) => {
                    debug!(source = %source, count = rows.len(), "call statistics loaded");
                    calls = rows;
                    break;
                },
                Err(e) => {
                    warn!(source = %source, error = %e, "call statistics unavailable, trying next source");
                    #[cfg(feature = "metrics")]
                    counter!(bitrix_metrics::CALL_SOURCE_FALLBACKS_TOTAL, labels::SOURCE => source.method())
                        .increment(1);
                },
            }
        }

        if query.entity_type_id.is_some() || query.entity_id.is_some() {
            calls.retain(|c| query.matches_entity(c.entity_type.as_deref(), c.entity_id.as_deref()));
        }

        if !calls.is_empty() {
            return Ok(calls);
        }

        let rows = self.list_activities(&query.activity_fallback()).await?;
        debug!(count = rows.len(), "call activities loaded as fallback");
        Ok(rows.into_iter().map(CallRecord::from_activity).collect())
    }

    async fn statistic_calls(&self, source: CallSource, query: &CallQuery) -> Result<Vec<CallRecord>> {
        let method = source.method();
        let rows = self
            .paginate(method, query.max_rows, |start| query.statistic_payload(start))
            .await
            .map_err(|e| Error::method(method, e))?;
        rows.into_iter()
            .map(|row| {
                serde_json::from_value::<StatisticRow>(row)
                    .map(|r| CallRecord::from_statistic(source, r))
                    .map_err(|e| Error::method(method, e.into()))
            })
            .collect()
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        mockito::Matcher,
        replywatch_config::BitrixConfig,
        secrecy::Secret,
        serde_json::json,
    };

    const SINCE: &str = "2024-05-01T09:00:00+00:00";

    fn client_for(server: &mockito::ServerGuard) -> BitrixClient {
        BitrixClient::new(&BitrixConfig {
            webhook_url: Secret::new(format!("{}/rest/1/token", server.url())),
            http_timeout_secs: 5.0,
            retry: 0,
            retry_sleep_ms: 0,
        })
        .unwrap()
    }

    async fn method_not_found(server: &mut mockito::ServerGuard, method: &str) -> mockito::Mock {
        server
            .mock("POST", format!("/rest/1/token/{method}.json").as_str())
            .with_status(400)
            .with_body(
                json!({"error": "ERROR_METHOD_NOT_FOUND", "error_description": "Method not found!"})
                    .to_string(),
            )
            .create_async()
            .await
    }

    #[tokio::test]
    async fn voximplant_rows_are_used_first() {
        let mut server = mockito::Server::new_async().await;
        let vox = server
            .mock("POST", "/rest/1/token/voximplant.statistic.get.json")
            .match_body(Matcher::PartialJson(json!({
                "FILTER": {">=CALL_START_DATE": SINCE, "PHONE_NUMBER": "+79990001122"},
                "ORDER": {"CALL_START_DATE": "ASC"},
                "START": 0
            })))
            .with_status(200)
            .with_body(
                json!({"result": [{"CALL_ID": "c1", "CALL_FAILED": "N", "PHONE_NUMBER": "+79990001122"}]})
                    .to_string(),
            )
            .create_async()
            .await;
        let telephony = server
            .mock("POST", "/rest/1/token/telephony.statistic.get.json")
            .expect(0)
            .create_async()
            .await;

        let client = client_for(&server);
        let calls = client
            .list_calls_since(&CallQuery::since(SINCE).phone(Some("+79990001122".into())))
            .await
            .unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].source, CallSource::Voximplant);
        vox.assert_async().await;
        telephony.assert_async().await;
    }

    #[tokio::test]
    async fn telephony_is_tried_when_voximplant_is_missing() {
        let mut server = mockito::Server::new_async().await;
        let _vox = method_not_found(&mut server, "voximplant.statistic.get").await;
        let _tel = server
            .mock("POST", "/rest/1/token/telephony.statistic.get.json")
            .with_status(200)
            .with_body(json!({"result": [{"CALL_ID": "t1", "CALL_FAILED": "Y"}]}).to_string())
            .create_async()
            .await;

        let client = client_for(&server);
        let calls = client.list_calls_since(&CallQuery::since(SINCE)).await.unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].source, CallSource::Telephony);
        assert!(calls[0].is_failed());
    }

    #[tokio::test]
    async fn activities_are_the_last_resort() {
        let mut server = mockito::Server::new_async().await;
        let _vox = method_not_found(&mut server, "voximplant.statistic.get").await;
        let _tel = method_not_found(&mut server, "telephony.statistic.get").await;
        let activities = server
            .mock("POST", "/rest/1/token/crm.activity.list.json")
            .match_body(Matcher::PartialJson(json!({
                "filter": {
                    ">CREATED": SINCE,
                    "PROVIDER_ID": ["VOXIMPLANT_CALL", "CALL"],
                    "OWNER_TYPE_ID": 2,
                    "OWNER_ID": 77
                },
                "order": {"CREATED": "ASC"}
            })))
            .with_status(200)
            .with_body(
                json!({"result": [{
                    "ID": "500", "CREATED": "2024-05-01T10:00:00+03:00",
                    "PROVIDER_ID": "VOXIMPLANT_CALL", "DIRECTION": "1",
                    "COMPLETED": "Y", "OWNER_TYPE_ID": "2", "OWNER_ID": "77"
                }]})
                .to_string(),
            )
            .create_async()
            .await;

        let client = client_for(&server);
        let calls = client
            .list_calls_since(&CallQuery::since(SINCE).entity(2, 77))
            .await
            .unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].source, CallSource::Activity);
        assert_eq!(calls[0].direction.as_deref(), Some("1"));
        assert!(!calls[0].is_failed());
        activities.assert_async().await;
    }

    #[tokio::test]
    async fn rows_for_other_entities_fall_through_to_activities() {
        let mut server = mockito::Server::new_async().await;
        let _vox = server
            .mock("POST", "/rest/1/token/voximplant.statistic.get.json")
            .with_status(200)
            .with_body(
                json!({"result": [{"CALL_ID": "c1", "CRM_ENTITY_TYPE": "3", "CRM_ENTITY_ID": "5"}]})
                    .to_string(),
            )
            .create_async()
            .await;
        let activities = server
            .mock("POST", "/rest/1/token/crm.activity.list.json")
            .with_status(200)
            .with_body(json!({"result": []}).to_string())
            .create_async()
            .await;

        let client = client_for(&server);
        let calls = client
            .list_calls_since(&CallQuery::since(SINCE).entity(2, 77))
            .await
            .unwrap();
        assert!(calls.is_empty());
        activities.assert_async().await;
    }

    #[tokio::test]
    async fn fallback_failure_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _vox = method_not_found(&mut server, "voximplant.statistic.get").await;
        let _tel = method_not_found(&mut server, "telephony.statistic.get").await;
        let _act = server
            .mock("POST", "/rest/1/token/crm.activity.list.json")
            .with_status(500)
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client
            .list_calls_since(&CallQuery::since(SINCE))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Status { status: 500, .. }));
    }
}
