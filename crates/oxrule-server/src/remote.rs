//! HTTP adapters behind the evaluator's query and push seams.
//!
//! Both adapters tag every request with the tenant header, so downstream
//! multitenant backends can enforce isolation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oxrule_common::tenant;
use oxrule_eval::{Pusher, QueryFunc, Sample};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Instant queries against a Prometheus-compatible `/api/v1/query` API.
pub struct HttpQueryFunc {
    client: reqwest::Client,
    base: String,
}

impl HttpQueryFunc {
    pub fn new(base: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base: base.trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Deserialize)]
struct QueryResponse {
    status: String,
    data: QueryData,
}

#[derive(Deserialize)]
struct QueryData {
    #[serde(rename = "resultType")]
    result_type: String,
    result: Vec<VectorSample>,
}

#[derive(Deserialize)]
struct VectorSample {
    metric: BTreeMap<String, String>,
    value: (f64, String),
}

#[async_trait]
impl QueryFunc for HttpQueryFunc {
    async fn query(
        &self,
        tenant_id: &str,
        expr: &str,
        at: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Sample>> {
        let mut headers = http::HeaderMap::new();
        tenant::inject_http(tenant_id, &mut headers)?;

        let response = self
            .client
            .get(format!("{}/api/v1/query", self.base))
            .headers(headers)
            .query(&[("query", expr), ("time", &at.to_rfc3339())])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("query endpoint returned {status}");
        }

        let body: QueryResponse = response.json().await?;
        if body.status != "success" {
            anyhow::bail!("query failed with status {:?}", body.status);
        }
        if body.data.result_type != "vector" {
            anyhow::bail!(
                "unexpected result type {:?}, instant vector expected",
                body.data.result_type
            );
        }

        body.data
            .result
            .into_iter()
            .map(|s| {
                let value: f64 = s.value.1.parse()?;
                let timestamp = DateTime::from_timestamp_millis((s.value.0 * 1000.0) as i64)
                    .unwrap_or(at);
                Ok(Sample {
                    labels: s.metric,
                    value,
                    timestamp,
                })
            })
            .collect()
    }
}

#[derive(Serialize)]
struct WriteSample<'a> {
    labels: &'a BTreeMap<String, String>,
    value: f64,
    timestamp_ms: i64,
}

/// Tenant-tagged sample writes to the ingestion endpoint.
pub struct RemoteWritePusher {
    client: reqwest::Client,
    url: String,
}

impl RemoteWritePusher {
    pub fn new(url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl Pusher for RemoteWritePusher {
    async fn push(&self, tenant_id: &str, samples: Vec<Sample>) -> anyhow::Result<()> {
        let mut headers = http::HeaderMap::new();
        tenant::inject_http(tenant_id, &mut headers)?;

        let body: Vec<WriteSample> = samples
            .iter()
            .map(|s| WriteSample {
                labels: &s.labels,
                value: s.value,
                timestamp_ms: s.timestamp.timestamp_millis(),
            })
            .collect();

        let response = self
            .client
            .post(&self.url)
            .headers(headers)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("push endpoint returned {status}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_response_parses() {
        let body = r#"{
            "status": "success",
            "data": {
                "resultType": "vector",
                "result": [
                    {"metric": {"job": "api", "instance": "a"}, "value": [1712000000.123, "0.25"]}
                ]
            }
        }"#;
        let parsed: QueryResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.status, "success");
        assert_eq!(parsed.data.result_type, "vector");
        assert_eq!(parsed.data.result.len(), 1);
        assert_eq!(parsed.data.result[0].metric["job"], "api");
        assert_eq!(parsed.data.result[0].value.1, "0.25");
    }

    #[test]
    fn write_samples_serialize_with_millisecond_timestamps() {
        let sample = Sample {
            labels: BTreeMap::from([("__name__".to_string(), "job:up:sum".to_string())]),
            value: 3.0,
            timestamp: DateTime::from_timestamp_millis(1_712_000_000_123).unwrap(),
        };
        let wire = serde_json::to_value([WriteSample {
            labels: &sample.labels,
            value: sample.value,
            timestamp_ms: sample.timestamp.timestamp_millis(),
        }])
        .unwrap();
        assert_eq!(wire[0]["timestamp_ms"], 1_712_000_000_123i64);
        assert_eq!(wire[0]["labels"]["__name__"], "job:up:sum");
    }
}
