//! Webhook transport: method calls with retry and list pagination.

use std::time::{Duration, Instant};

use {
    replywatch_config::BitrixConfig,
    secrecy::{ExposeSecret, Secret},
    serde_json::Value,
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use replywatch_metrics::{bitrix as bitrix_metrics, counter, histogram, labels};

use crate::{
    error::{Context, Error, Result},
    query::ActivityQuery,
    types::{Activity, DialogHistory, DialogMessage, DialogUser},
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(25);

/// Client for a Bitrix24 incoming webhook.
#[derive(Clone)]
pub struct BitrixClient {
    http: reqwest::Client,
    /// Webhook URL without the trailing slash; carries the access token.
    base_url: Secret<String>,
    retry: u32,
    retry_sleep: Duration,
}

impl std::fmt::Debug for BitrixClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitrixClient")
            .field("base_url", &"[REDACTED]")
            .field("retry", &self.retry)
            .field("retry_sleep", &self.retry_sleep)
            .finish_non_exhaustive()
    }
}

impl BitrixClient {
    pub fn new(config: &BitrixConfig) -> Result<Self> {
        let base_url = config.webhook_url.expose_secret().trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(Error::MissingWebhook);
        }
        let timeout =
            Duration::try_from_secs_f64(config.http_timeout_secs).unwrap_or(DEFAULT_TIMEOUT);
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: Secret::new(base_url.to_string()),
            retry: config.retry,
            retry_sleep: Duration::from_millis(config.retry_sleep_ms),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{method}.json", self.base_url.expose_secret())
    }

    /// Call a REST method, retrying any failure `retry` times.
    ///
    /// Transport errors, HTTP errors and API error payloads are all retried;
    /// the last error is returned once attempts run out.
    pub async fn call(&self, method: &str, params: &Value) -> Result<Value> {
        #[cfg(feature = "metrics")]
        let started = Instant::now();
        #[cfg(feature = "metrics")]
        counter!(bitrix_metrics::CALLS_TOTAL, labels::METHOD => method.to_string()).increment(1);

        let mut attempt = 0u32;
        let result = loop {
            match self.call_once(method, params).await {
                Ok(value) => break Ok(value),
                Err(e) if attempt >= self.retry => break Err(e),
                Err(e) => {
                    attempt += 1;
                    warn!(method, attempt, max_retries = self.retry, error = %e, "bitrix call failed, retrying");
                    #[cfg(feature = "metrics")]
                    counter!(bitrix_metrics::RETRIES_TOTAL, labels::METHOD => method.to_string())
                        .increment(1);
                    tokio::time::sleep(self.retry_sleep).await;
                },
            }
        };

        #[cfg(feature = "metrics")]
        {
            histogram!(bitrix_metrics::CALL_DURATION_SECONDS, labels::METHOD => method.to_string())
                .record(started.elapsed().as_secs_f64());
            if result.is_err() {
                counter!(bitrix_metrics::ERRORS_TOTAL, labels::METHOD => method.to_string())
                    .increment(1);
            }
        }
        result
    }

    async fn call_once(&self, method: &str, params: &Value) -> Result<Value> {
        let started = Instant::now();
        let resp = self
            .http
            .post(self.method_url(method))
            .json(params)
            .send()
            .await
            // Strip the URL: it embeds the webhook token.
            .map_err(reqwest::Error::without_url)?;
        let status = resp.status();
        let body = resp.bytes().await.map_err(reqwest::Error::without_url)?;
        // Error statuses still carry a JSON error payload worth surfacing.
        let data: Option<Value> = serde_json::from_slice(&body).ok();

        debug!(
            method,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "bitrix call"
        );

        if let Some(err) = data.as_ref().and_then(api_error) {
            return Err(err);
        }
        if status.is_client_error() || status.is_server_error() {
            return Err(Error::Status {
                status: status.as_u16(),
                method: method.to_string(),
            });
        }
        Ok(data.unwrap_or_else(|| Value::Object(Default::default())))
    }

    /// Collect pages of a list method until the portal stops returning a
    /// `next` cursor or `max_rows` rows are gathered.
    pub(crate) async fn paginate(
        &self,
        method: &str,
        max_rows: Option<usize>,
        payload: impl Fn(u64) -> Value,
    ) -> Result<Vec<Value>> {
        let mut rows = Vec::new();
        let mut start = 0u64;

        loop {
            let data = self.call(method, &payload(start)).await?;
            if let Some(Value::Array(page)) = data.get("result") {
                rows.extend(page.iter().cloned());
            }

            if let Some(max) = max_rows
                && rows.len() >= max
            {
                rows.truncate(max);
                return Ok(rows);
            }

            let Some(next) = data.get("next").and_then(crate::lenient::scalar_to_i64) else {
                break;
            };
            let next = u64::try_from(next).unwrap_or(0);
            if next <= start {
                warn!(method, start, next, "pagination cursor did not advance, stopping");
                break;
            }
            start = next;
        }

        Ok(rows)
    }

    /// `crm.activity.list`, all pages up to `query.max_rows`.
    pub async fn list_activities(&self, query: &ActivityQuery) -> Result<Vec<Activity>> {
        let rows = self
            .paginate("crm.activity.list", query.max_rows, |start| {
                query.payload(start)
            })
            .await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(Error::from))
            .collect()
    }

    /// Newest `limit` messages of an open-lines dialog.
    pub async fn last_dialog_messages(&self, dialog_id: &str, limit: u32) -> Result<DialogHistory> {
        let data = self
            .call(
                "im.dialog.messages.get",
                &serde_json::json!({
                    "DIALOG_ID": dialog_id,
                    "LIMIT": limit,
                    "SORT": "DESC",
                }),
            )
            .await?;
        match data.get("result") {
            Some(result @ Value::Object(_)) => serde_json::from_value(result.clone())
                .with_context(|| format!("malformed dialog history for {dialog_id}")),
            _ => Ok(DialogHistory::default()),
        }
    }

    /// The newest message of a dialog and the participants map, if any.
    pub async fn last_dialog_message(
        &self,
        dialog_id: &str,
    ) -> Result<Option<(DialogMessage, std::collections::HashMap<i64, DialogUser>)>> {
        let history = self.last_dialog_messages(dialog_id, 1).await?;
        let DialogHistory { messages, users } = history;
        Ok(messages.into_iter().next().map(|m| (m, users)))
    }
}

/// Extract an API error from a response body.
fn api_error(data: &Value) -> Option<Error> {
    let code = data.get("error")?;
    let description = data
        .get("error_description")
        .and_then(crate::lenient::scalar_to_string)
        .unwrap_or_default();
    Some(Error::Api {
        code: crate::lenient::scalar_to_string(code).unwrap_or_else(|| code.to_string()),
        description,
    })
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        mockito::Matcher,
        serde_json::json,
    };

    fn client_for(server: &mockito::ServerGuard, retry: u32) -> BitrixClient {
        BitrixClient::new(&BitrixConfig {
            webhook_url: Secret::new(format!("{}/rest/1/token/", server.url())),
            http_timeout_secs: 5.0,
            retry,
            retry_sleep_ms: 0,
        })
        .unwrap()
    }

    #[test]
    fn empty_webhook_is_rejected() {
        let err = BitrixClient::new(&BitrixConfig::default()).unwrap_err();
        assert!(matches!(err, Error::MissingWebhook));
    }

    #[test]
    fn debug_redacts_webhook() {
        let client = BitrixClient::new(&BitrixConfig {
            webhook_url: Secret::new("https://p.bitrix24.ru/rest/1/supersecret".into()),
            ..Default::default()
        })
        .unwrap();
        assert!(!format!("{client:?}").contains("supersecret"));
    }

    #[tokio::test]
    async fn call_posts_json_to_method_url() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/rest/1/token/profile.json")
            .match_body(Matcher::Json(json!({"a": 1})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"result": {"ID": "1"}}).to_string())
            .create_async()
            .await;

        let client = client_for(&server, 0);
        let data = client.call("profile", &json!({"a": 1})).await.unwrap();
        assert_eq!(data["result"]["ID"], "1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn api_error_in_success_body_is_retried_then_returned() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/rest/1/token/crm.activity.list.json")
            .with_status(200)
            .with_body(
                json!({"error": "QUERY_LIMIT_EXCEEDED", "error_description": "Too many requests"})
                    .to_string(),
            )
            .expect(3)
            .create_async()
            .await;

        let client = client_for(&server, 2);
        let err = client
            .call("crm.activity.list", &json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.api_code(), Some("QUERY_LIMIT_EXCEEDED"));
        assert_eq!(err.to_string(), "QUERY_LIMIT_EXCEEDED: Too many requests");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn http_error_without_json_reports_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/rest/1/token/crm.activity.list.json")
            .with_status(503)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let client = client_for(&server, 0);
        let err = client
            .call("crm.activity.list", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn http_error_with_json_reports_api_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/rest/1/token/voximplant.statistic.get.json")
            .with_status(400)
            .with_body(json!({"error": "ERROR_METHOD_NOT_FOUND"}).to_string())
            .create_async()
            .await;

        let client = client_for(&server, 0);
        let err = client
            .call("voximplant.statistic.get", &json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.api_code(), Some("ERROR_METHOD_NOT_FOUND"));
    }

    #[tokio::test]
    async fn list_activities_follows_next_cursor() {
        let mut server = mockito::Server::new_async().await;
        let page1 = server
            .mock("POST", "/rest/1/token/crm.activity.list.json")
            .match_body(Matcher::PartialJson(json!({"start": 0})))
            .with_status(200)
            .with_body(json!({"result": [{"ID": "1"}, {"ID": "2"}], "next": 2, "total": 3}).to_string())
            .create_async()
            .await;
        let page2 = server
            .mock("POST", "/rest/1/token/crm.activity.list.json")
            .match_body(Matcher::PartialJson(json!({"start": 2})))
            .with_status(200)
            .with_body(json!({"result": [{"ID": "3"}], "total": 3}).to_string())
            .create_async()
            .await;

        let client = client_for(&server, 0);
        let rows = client.list_activities(&ActivityQuery::new()).await.unwrap();
        let ids: Vec<_> = rows.iter().filter_map(|a| a.id.as_deref()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        page1.assert_async().await;
        page2.assert_async().await;
    }

    #[tokio::test]
    async fn list_activities_truncates_at_max_rows() {
        let mut server = mockito::Server::new_async().await;
        let page = server
            .mock("POST", "/rest/1/token/crm.activity.list.json")
            .with_status(200)
            .with_body(json!({"result": [{"ID": "1"}, {"ID": "2"}, {"ID": "3"}], "next": 3}).to_string())
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, 0);
        let rows = client
            .list_activities(&ActivityQuery::new().max_rows(2))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        page.assert_async().await;
    }

    #[tokio::test]
    async fn stalled_cursor_stops_paging() {
        let mut server = mockito::Server::new_async().await;
        let page = server
            .mock("POST", "/rest/1/token/crm.activity.list.json")
            .with_status(200)
            .with_body(json!({"result": [{"ID": "1"}], "next": 0}).to_string())
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, 0);
        let rows = client.list_activities(&ActivityQuery::new()).await.unwrap();
        assert_eq!(rows.len(), 1);
        page.assert_async().await;
    }

    #[tokio::test]
    async fn last_dialog_message_returns_newest_and_users() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/rest/1/token/im.dialog.messages.get.json")
            .match_body(Matcher::PartialJson(json!({
                "DIALOG_ID": "imol|wz_whatsapp|15|abc|35855",
                "LIMIT": 1,
                "SORT": "DESC"
            })))
            .with_status(200)
            .with_body(
                json!({"result": {
                    "messages": [{"id": 900, "author_id": 12, "text": "Hello"}],
                    "users": [{"id": 12, "name": "Anna", "bot": false}]
                }})
                .to_string(),
            )
            .create_async()
            .await;

        let client = client_for(&server, 0);
        let (message, users) = client
            .last_dialog_message("imol|wz_whatsapp|15|abc|35855")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.author_id, Some(12));
        assert_eq!(users[&12].name.as_deref(), Some("Anna"));
    }

    #[tokio::test]
    async fn empty_dialog_result_means_no_message() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/rest/1/token/im.dialog.messages.get.json")
            .with_status(200)
            .with_body(json!({"result": []}).to_string())
            .create_async()
            .await;

        let client = client_for(&server, 0);
        assert!(client.last_dialog_message("imol|x").await.unwrap().is_none());
    }
}
