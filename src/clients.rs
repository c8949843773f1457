//! reqwest-backed collaborators speaking the directory and metrics gateway JSON APIs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::fetcher::{BackendError, MetricDataResult, MetricsBackend};
use crate::query::{Dimension, MetricQuery, ScanBy, Statistic};
use crate::resolver::{DirectoryError, Filter, InstanceDirectory, Reservation};
use crate::{MonitorError, Result};

pub const REGION_HEADER: &str = "x-region";

fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| MonitorError::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Reads a non-2xx body so the rejection carries the upstream's own message.
async fn rejection(response: reqwest::Response) -> (u16, String) {
    let status = response.status().as_u16();
    let message = response
        .text()
        .await
        .unwrap_or_else(|e| format!("<unreadable body: {}>", e));
    (status, message)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeInstancesRequest<'a> {
    filters: &'a [Filter],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeInstancesResponse {
    #[serde(default)]
    reservations: Vec<Reservation>,
}

#[derive(Clone)]
pub struct HttpInstanceDirectory {
    url: String,
    region: String,
    client: reqwest::Client,
}

impl HttpInstanceDirectory {
    pub fn new(base_url: &str, region: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            url: format!("{}/describe-instances", base_url.trim_end_matches('/')),
            region: region.to_string(),
            client: build_client(timeout)?,
        })
    }
}

#[async_trait]
impl InstanceDirectory for HttpInstanceDirectory {
    async fn describe_instances(
        &self,
        filters: &[Filter],
    ) -> std::result::Result<Vec<Reservation>, DirectoryError> {
        let response = self
            .client
            .post(&self.url)
            .header(REGION_HEADER, &self.region)
            .json(&DescribeInstancesRequest { filters })
            .send()
            .await
            .map_err(|e| DirectoryError::Unreachable(e.to_string()))?;

        if !response.status().is_success() {
            let (status, message) = rejection(response).await;
            return Err(DirectoryError::Rejected { status, message });
        }

        let body: DescribeInstancesResponse = response
            .json()
            .await
            .map_err(|e| DirectoryError::Unreachable(format!("invalid response: {}", e)))?;
        Ok(body.reservations)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct Metric<'a> {
    namespace: &'a str,
    metric_name: &'a str,
    dimensions: [&'a Dimension; 1],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct MetricStat<'a> {
    metric: Metric<'a>,
    period: u32,
    stat: Statistic,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct MetricDataQuery<'a> {
    id: &'a str,
    metric_stat: MetricStat<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetMetricDataRequest<'a> {
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    metric_data_queries: [MetricDataQuery<'a>; 1],
    scan_by: ScanBy,
}

impl<'a> From<&'a MetricQuery> for GetMetricDataRequest<'a> {
    fn from(query: &'a MetricQuery) -> Self {
        Self {
            start_time: query.window.start,
            end_time: query.window.end,
            metric_data_queries: [MetricDataQuery {
                id: &query.id,
                metric_stat: MetricStat {
                    metric: Metric {
                        namespace: &query.namespace,
                        metric_name: &query.metric_name,
                        dimensions: [&query.dimension],
                    },
                    period: query.period_seconds,
                    stat: query.stat,
                },
            }],
            scan_by: query.scan_by,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetMetricDataResponse {
    #[serde(default)]
    metric_data_results: Vec<MetricDataResult>,
}

#[derive(Clone)]
pub struct HttpMetricsBackend {
    url: String,
    region: String,
    client: reqwest::Client,
}

impl HttpMetricsBackend {
    pub fn new(base_url: &str, region: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            url: format!("{}/get-metric-data", base_url.trim_end_matches('/')),
            region: region.to_string(),
            client: build_client(timeout)?,
        })
    }
}

#[async_trait]
impl MetricsBackend for HttpMetricsBackend {
    async fn get_metric_data(
        &self,
        query: &MetricQuery,
    ) -> std::result::Result<Vec<MetricDataResult>, BackendError> {
        let response = self
            .client
            .post(&self.url)
            .header(REGION_HEADER, &self.region)
            .json(&GetMetricDataRequest::from(query))
            .send()
            .await
            .map_err(|e| BackendError::Unreachable(e.to_string()))?;

        if !response.status().is_success() {
            let (status, message) = rejection(response).await;
            return Err(BackendError::Rejected { status, message });
        }

        let body: GetMetricDataResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Unreachable(format!("invalid response: {}", e)))?;
        Ok(body.metric_data_results)
    }
}
