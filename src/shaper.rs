use chrono::{DateTime, FixedOffset, Offset, Utc};
use crate::models::CpuUsageResponse;

/// Axis label format: two-digit 12-hour clock, e.g. `03:05 PM`.
pub const LABEL_FORMAT: &str = "%I:%M %p";

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub label: String,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderableSeries {
    pub points: Vec<SeriesPoint>,
}

impl RenderableSeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn into_response(self) -> CpuUsageResponse {
        let mut response = CpuUsageResponse::with_capacity(self.points.len());
        for point in self.points {
            response.timestamps.push(point.timestamp);
            response.labels.push(point.label);
            response.cpu_usages.push(point.value);
        }
        response
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SeriesShaper {
    display_offset: FixedOffset,
}

impl Default for SeriesShaper {
    fn default() -> Self {
        Self::new(Utc.fix())
    }
}

impl SeriesShaper {
    pub fn new(display_offset: FixedOffset) -> Self {
        Self { display_offset }
    }

    pub fn label(&self, timestamp: &DateTime<Utc>) -> String {
        timestamp
            .with_timezone(&self.display_offset)
            .format(LABEL_FORMAT)
            .to_string()
    }

    /// Pairs timestamps with values by position, stopping at the shorter input.
    pub fn shape(&self, timestamps: &[DateTime<Utc>], values: &[f64]) -> RenderableSeries {
        if timestamps.len() != values.len() {
            tracing::warn!(
                "Backend returned {} timestamps but {} values, truncating",
                timestamps.len(),
                values.len()
            );
        }

        let points = timestamps
            .iter()
            .zip(values)
            .map(|(timestamp, value)| SeriesPoint {
                timestamp: *timestamp,
                label: self.label(timestamp),
                value: *value,
            })
            .collect();

        RenderableSeries { points }
    }
}
