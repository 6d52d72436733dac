use std::time::Duration;

use patrol_view_core::{MetricRecord, SessionRecord};
use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::{BoxFuture, ConnectionError, FetchError};

/// Request/response access to session state, used by fallback polling.
pub trait SessionStatusSource: Send + Sync {
    /// Looks up a session, returning `None` when it does not exist.
    fn find_by_id<'a>(
        &'a self,
        session_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<SessionRecord>, FetchError>>;

    /// Fetches up to `limit` of the most recent metric records of a session.
    fn get_metrics<'a>(
        &'a self,
        session_id: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<MetricRecord>, FetchError>>;
}

/// [`SessionStatusSource`] backed by the training service's HTTP API.
#[derive(Clone, Debug)]
pub struct HttpSessionStatusSource {
    client: Client,
    base_url: String,
}

impl HttpSessionStatusSource {
    /// Creates a source rooted at `base_url`, e.g. `http://localhost:8000`,
    /// whose requests give up after `request_timeout`.
    pub fn new(
        base_url: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, ConnectionError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(ConnectionError::HttpClient)?;
        Ok(Self::with_client(client, base_url))
    }

    /// Creates a source that issues requests through `client`.
    #[must_use]
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self { client, base_url }
    }

    fn session_url(&self, session_id: &str) -> String {
        format!("{}/api/sessions/{session_id}", self.base_url)
    }
}

impl SessionStatusSource for HttpSessionStatusSource {
    fn find_by_id<'a>(
        &'a self,
        session_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<SessionRecord>, FetchError>> {
        Box::pin(async move {
            let response = self.client.get(self.session_url(session_id)).send().await?;
            if response.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            let record = response.error_for_status()?.json::<SessionRecord>().await?;
            Ok(Some(record))
        })
    }

    fn get_metrics<'a>(
        &'a self,
        session_id: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<MetricRecord>, FetchError>> {
        Box::pin(async move {
            let url = format!("{}/metrics", self.session_url(session_id));
            let body: Value = self
                .client
                .get(url)
                .query(&[("limit", limit)])
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            decode_metrics(body)
        })
    }
}

/// Accepts a bare list of records or one wrapped in `metrics`/`data`.
fn decode_metrics(body: Value) -> Result<Vec<MetricRecord>, FetchError> {
    let records = match body {
        Value::Object(mut object) => object
            .remove("metrics")
            .or_else(|| object.remove("data"))
            .unwrap_or(Value::Array(Vec::new())),
        other => other,
    };
    Ok(serde_json::from_value(records)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn metrics_decode_from_list_or_wrapper() {
        let listed = decode_metrics(json!([{"episode": 1, "reward": 2.5}])).expect("list decodes");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].episode, Some(1));
        assert_eq!(listed[0].values.get("reward"), Some(&json!(2.5)));

        let wrapped = decode_metrics(json!({"metrics": [{"timestep": 4}]})).expect("wrapper decodes");
        assert_eq!(wrapped[0].timestep, Some(4));

        assert!(decode_metrics(json!("nope")).is_err());
    }

    #[test]
    fn urls_are_rooted_at_the_api_base() {
        let source = HttpSessionStatusSource::with_client(Client::new(), "http://api.test/");
        assert_eq!(source.session_url("s1"), "http://api.test/api/sessions/s1");
    }
}
