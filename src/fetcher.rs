use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error};

use crate::query::MetricQuery;
use crate::{MonitorError, Result, Upstream};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum StatusCode {
    #[default]
    Complete,
    PartialData,
    InternalError,
    Forbidden,
}

/// One named result as returned by the metrics backend.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricDataResult {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub timestamps: Vec<DateTime<Utc>>,
    #[serde(default)]
    pub values: Vec<f64>,
    #[serde(default)]
    pub status_code: StatusCode,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("metrics backend unreachable: {0}")]
    Unreachable(String),

    #[error("metrics backend rejected request with status {status}: {message}")]
    Rejected { status: u16, message: String },
}

impl BackendError {
    /// Throttling (429) is worth another attempt; other client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Unreachable(_) => true,
            BackendError::Rejected { status, .. } => {
                *status == 429 || !(400..500).contains(status)
            }
        }
    }
}

/// Time-series backend executing windowed, aggregated queries.
#[async_trait]
pub trait MetricsBackend: Send + Sync {
    async fn get_metric_data(
        &self,
        query: &MetricQuery,
    ) -> std::result::Result<Vec<MetricDataResult>, BackendError>;
}

/// Timestamp and value arrays exactly as the backend returned them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSeries {
    pub timestamps: Vec<DateTime<Utc>>,
    pub values: Vec<f64>,
}

pub struct MetricFetcher {
    backend: Arc<dyn MetricsBackend>,
}

impl MetricFetcher {
    pub fn new(backend: Arc<dyn MetricsBackend>) -> Self {
        Self { backend }
    }

    /// Runs one query and extracts its single result.
    ///
    /// Array alignment is not checked here; the shaper truncates mismatches.
    pub async fn fetch(&self, query: &MetricQuery) -> Result<RawSeries> {
        debug!(
            "Fetching {} for {} from {} to {} every {}s",
            query.metric_name,
            query.instance_id(),
            query.window.start,
            query.window.end,
            query.period_seconds
        );

        let results = self.backend.get_metric_data(query).await.map_err(|e| {
            error!("Error fetching data from metrics backend: {}", e);
            MonitorError::upstream(Upstream::Metrics, e.to_string())
        })?;

        let result = results
            .into_iter()
            .find(|r| r.id == query.id)
            .ok_or_else(|| {
                MonitorError::upstream(
                    Upstream::Metrics,
                    format!("no result for query '{}'", query.id),
                )
            })?;

        if result.status_code != StatusCode::Complete {
            return Err(MonitorError::upstream(
                Upstream::Metrics,
                format!("query '{}' finished with {:?}", query.id, result.status_code),
            ));
        }

        Ok(RawSeries {
            timestamps: result.timestamps,
            values: result.values,
        })
    }
}
