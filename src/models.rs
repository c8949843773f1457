use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of `POST /cpu-usage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuUsageRequest {
    pub ip_address: String,
    #[serde(default = "default_time_period")]
    pub time_period: String,
    #[serde(default = "default_interval")]
    pub interval: String,
}

fn default_time_period() -> String {
    "6h".to_string()
}

fn default_interval() -> String {
    "5m".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuUsageResponse {
    pub timestamps: Vec<DateTime<Utc>>,
    pub cpu_usages: Vec<f64>,
    pub labels: Vec<String>,
}

impl CpuUsageResponse {
    pub fn with_capacity(len: usize) -> Self {
        Self {
            timestamps: Vec::with_capacity(len),
            cpu_usages: Vec::with_capacity(len),
            labels: Vec::with_capacity(len),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
